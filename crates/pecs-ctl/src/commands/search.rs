//! Search the configured repositories.

use pecs_registry::{PluginDesc, PluginType};

use crate::cli_config::CliConfig;
use crate::commands::fetched_registry;
use crate::output;

/// Filters are combined; without any filter all plugins are listed.
pub(crate) async fn handle_search_command(
    name: Option<String>,
    tag: Option<String>,
    plugin_type: Option<PluginType>,
    cli_config: &CliConfig,
) -> anyhow::Result<()> {
    let registry = fetched_registry(cli_config).await?;

    let mut results = match &name {
        Some(name) => registry.search_by_name(name).await,
        None => registry.list_plugins().await,
    };
    retain_matching(&mut results, tag.as_deref(), plugin_type);

    if results.is_empty() {
        output::warning("No matching plugins found.");
        return Ok(());
    }

    output::header(format!("{} matching plugins:", results.len()));
    output::blank();
    for plg in &results {
        output::plugin(&plg.name, &plg.version, &plg.description, &plg.author);
        output::dim(format!("   from {}", plg.repository));
    }
    Ok(())
}

fn retain_matching(plugins: &mut Vec<PluginDesc>, tag: Option<&str>, plugin_type: Option<PluginType>) {
    plugins.retain(|p| {
        tag.is_none_or(|tag| p.tags.iter().any(|t| t == tag))
            && plugin_type.is_none_or(|ty| p.plugin_types.contains(&ty))
    });
}
