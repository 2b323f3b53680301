//! Plugin commands working on a single index: list-plugins, get-url,
//! download-plugin and install. `add` installs from the configured
//! repositories through the manager.

use std::path::Path;

use anyhow::Context;
use pecs_registry::installer::{download_plugin, find_matching_artifact};
use pecs_registry::plugins_config::update_plugins_config;
use pecs_registry::registry::load_index;
use pecs_registry::{IndexSource, Installer, Platform, PluginConfig, PluginDesc, PluginInstaller};

use crate::cli_config::CliConfig;
use crate::commands::{build_manager, fetched_registry, index_source};
use crate::output;
use crate::Commands;

pub(crate) async fn handle_plugin_command(
    cmd: Commands,
    cli_config: &CliConfig,
) -> anyhow::Result<()> {
    let source = index_source(cli_config);
    match cmd {
        Commands::ListPlugins { index } => list_plugins(&source, &index).await,
        Commands::GetUrl {
            index,
            plugin,
            platform,
        } => get_url(&source, &index, &plugin, &platform.resolve()).await,
        Commands::DownloadPlugin {
            index,
            plugin,
            dst,
            platform,
        } => download(&source, &index, &plugin, dst.as_deref(), &platform.resolve()).await,
        Commands::Install {
            index,
            plugin,
            target,
            config,
            platform,
        } => {
            let target = target.unwrap_or_else(|| cli_config.install_target());
            let config = config.unwrap_or_else(|| cli_config.plugins_config());
            let installer = PluginInstaller::new(target)
                .with_platform(platform.resolve())
                .with_source(source.clone());
            install(&source, &index, &plugin, &installer, &config).await
        }
        other => anyhow::bail!("unexpected command for plugin handler: {other:?}"),
    }
}

/// Load and validate `index` and return the plugin called `name`.
async fn plugin_from_index(
    source: &IndexSource,
    index: &str,
    name: &str,
) -> anyhow::Result<PluginDesc> {
    let index = load_index(source, index).await?;
    index
        .plugins
        .into_iter()
        .find(|p| p.name == name)
        .ok_or_else(|| anyhow::anyhow!("failed to find plugin {name:?} in index"))
}

async fn list_plugins(source: &IndexSource, index: &str) -> anyhow::Result<()> {
    let index = load_index(source, index).await?;

    if index.plugins.is_empty() {
        output::warning("The index does not contain any plugins.");
        return Ok(());
    }

    if !index.meta.description.is_empty() {
        output::header(&index.meta.description);
        output::blank();
    }
    for plg in &index.plugins {
        output::plugin(&plg.name, &plg.version, &plg.description, &plg.author);
    }
    Ok(())
}

async fn get_url(
    source: &IndexSource,
    index: &str,
    name: &str,
    platform: &Platform,
) -> anyhow::Result<()> {
    let plugin = plugin_from_index(source, index, name).await?;
    let location = find_matching_artifact(&plugin, platform)?;
    output::plain(location.url);
    Ok(())
}

async fn download(
    source: &IndexSource,
    index: &str,
    name: &str,
    dst: Option<&Path>,
    platform: &Platform,
) -> anyhow::Result<()> {
    let plugin = plugin_from_index(source, index, name).await?;
    if let Some(dir) = dst {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let path = download_plugin(source, &plugin, dst, platform)
        .await
        .context("failed to download plugin")?;
    output::plain(path.display());
    Ok(())
}

async fn install(
    source: &IndexSource,
    index: &str,
    name: &str,
    installer: &PluginInstaller,
    plugins_config: &Path,
) -> anyhow::Result<()> {
    let plugin = plugin_from_index(source, index, name).await?;

    let path = installer
        .install_plugin(&plugin)
        .await
        .context("failed to install plugin")?;

    update_plugins_config(plugins_config, &PluginConfig::for_plugin(&plugin, false))
        .context("failed to configure plugin")?;

    output::success(format!("Installed {} {}", plugin.name, plugin.version));
    output::label("Path", path.display());
    output::label("Config", plugins_config.display());
    Ok(())
}

/// Install `name` from the configured repositories through the manager, so
/// it is recorded in the state file and checked for updates.
pub(crate) async fn handle_add_command(name: &str, cli_config: &CliConfig) -> anyhow::Result<()> {
    let manager = build_manager(cli_config, fetched_registry(cli_config).await?);
    manager.load_state().await?;

    let path = manager.install_plugin(name).await?;

    output::success(format!("Installed {name}"));
    output::label("Path", path.display());
    output::label("State file", manager.state_file().display());
    output::hint("Autostart is disabled; enable the plugin in the Portmaster to run it.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"
meta:
  version: v1.0.0
plugins:
  - name: demo
    version: 1.0.0
    artifacts:
      - os: linux
        amd64: https://example.com/demo-linux-amd64
"#;

    #[tokio::test]
    async fn test_plugin_from_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.yaml");
        std::fs::write(&path, INDEX).unwrap();
        let location = path.to_str().unwrap();
        let source = IndexSource::new();

        let plugin = plugin_from_index(&source, location, "demo").await.unwrap();
        assert_eq!(plugin.version, "1.0.0");

        let err = plugin_from_index(&source, location, "missing")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "failed to find plugin \"missing\" in index");
    }
}
