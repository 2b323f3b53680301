//! Show available updates for the plugins recorded in the state file.

use crate::cli_config::CliConfig;
use crate::commands::{build_manager, fetched_registry};
use crate::output;

pub(crate) async fn handle_updates_command(cli_config: &CliConfig) -> anyhow::Result<()> {
    let manager = build_manager(cli_config, fetched_registry(cli_config).await?);
    manager.load_state().await?;

    let installed = manager.installed_plugins().await;
    if installed.is_empty() {
        output::warning("No plugins installed.");
        output::hint("Install one with `pecs-ctl add <plugin>`.");
        return Ok(());
    }

    let updates = manager.available_updates().await;
    if updates.is_empty() {
        output::success(format!("All {} installed plugins are up to date.", installed.len()));
        return Ok(());
    }

    output::header("Updates available:");
    for update in &updates {
        output::item(format!(
            "{}: {} → {}",
            update.name, update.current_version, update.new_version
        ));
    }
    output::blank();
    output::hint("Run `pecs-ctl add <plugin>` to install the new version.");
    Ok(())
}
