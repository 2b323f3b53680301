//! Command handlers for the pecs-ctl CLI.
//!
//! Each module handles one command group and delegates to `pecs-registry`.
//! Handlers return `anyhow::Result`; `main` prints the error and exits 1.

pub(crate) mod daemon;
pub(crate) mod docs;
pub(crate) mod plugin;
pub(crate) mod repo;
pub(crate) mod search;
pub(crate) mod updates;
pub(crate) mod verify;

pub(crate) use daemon::handle_daemon_command;
pub(crate) use docs::handle_docs_command;
pub(crate) use plugin::{handle_add_command, handle_plugin_command};
pub(crate) use repo::handle_repo_command;
pub(crate) use search::handle_search_command;
pub(crate) use updates::handle_updates_command;
pub(crate) use verify::{handle_verify_command, handle_verify_index_command};

use std::sync::Arc;

use anyhow::Context;
use pecs_registry::plugins_config::PluginsJsonHost;
use pecs_registry::repositories::load_repositories;
use pecs_registry::{IndexCache, IndexSource, Manager, PluginInstaller, Registry};

use crate::cli_config::CliConfig;

/// Index source with the offline cache when a cache directory is available.
pub(crate) fn index_source(cli_config: &CliConfig) -> IndexSource {
    match IndexCache::from_env(cli_config.cache_max_age_hours) {
        Ok(cache) => IndexSource::new().with_cache(cache),
        Err(e) => {
            tracing::warn!(error = %e, "Index cache unavailable, fetching without offline fallback");
            IndexSource::new()
        }
    }
}

/// Registry populated with the repositories from the repositories file.
/// Repositories are added but not fetched.
pub(crate) async fn configured_registry(cli_config: &CliConfig) -> anyhow::Result<Registry> {
    let path = cli_config.repositories_file();
    let repos = load_repositories(&path)
        .with_context(|| format!("failed to load repositories from {}", path.display()))?;

    let registry = Registry::with_source(index_source(cli_config));
    for repo in repos {
        let name = repo.name.clone();
        if let Err(e) = registry.add_repository(repo).await {
            tracing::warn!(repository = %name, error = %e, "Skipping repository");
        }
    }
    Ok(registry)
}

/// Configured registry with all repositories fetched.
pub(crate) async fn fetched_registry(cli_config: &CliConfig) -> anyhow::Result<Registry> {
    let registry = configured_registry(cli_config).await?;
    registry
        .fetch()
        .await
        .context("failed to fetch plugin repositories")?;
    Ok(registry)
}

/// Manager over the configured state file, install target and plugins.json.
pub(crate) fn build_manager(cli_config: &CliConfig, registry: Registry) -> Manager {
    let installer =
        PluginInstaller::new(cli_config.install_target()).with_source(index_source(cli_config));
    Manager::new(
        cli_config.state_file(),
        Arc::new(installer),
        Arc::new(registry),
        Arc::new(PluginsJsonHost::new(cli_config.plugins_config())),
    )
    .with_fetch_interval(cli_config.fetch_interval())
}
