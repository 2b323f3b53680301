//! Run the plugin manager in the foreground.

use std::sync::Arc;

use pecs_registry::notification::{LogNotifier, NotificationHandler};
use tokio_util::sync::CancellationToken;

use crate::cli_config::CliConfig;
use crate::commands::{build_manager, configured_registry};

pub(crate) async fn handle_daemon_command(cli_config: &CliConfig) -> anyhow::Result<()> {
    let registry = configured_registry(cli_config).await?;
    let manager = Arc::new(build_manager(cli_config, registry));

    NotificationHandler::attach(&manager, Arc::new(LogNotifier)).await;

    let cancel = CancellationToken::new();
    manager.start(cancel.clone()).await?;

    tracing::info!(
        state_file = %manager.state_file().display(),
        interval_secs = cli_config.fetch_interval().as_secs(),
        "Plugin manager running"
    );

    shutdown_signal().await;
    cancel.cancel();
    tracing::info!("Plugin manager stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C"),
        () = terminate => tracing::info!("Received SIGTERM"),
    }
}
