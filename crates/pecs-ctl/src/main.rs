//! pecs-ctl: command-line utility for the Portmaster plugin registry.
//!
//! Verifies repository indexes, installs plugins and runs the background
//! manager that keeps installed plugins up to date.

mod cli_config;
mod commands;
mod output;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use pecs_registry::{Platform, PluginType};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pecs-ctl", version, about, styles = output::clap_styles())]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Decode and validate local index files
    Verify {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Fetch, decode and validate index files from paths or URLs
    VerifyIndex {
        #[arg(required = true)]
        locations: Vec<String>,
    },
    /// List all plugins of an index
    ListPlugins { index: String },
    /// Print the download URL of a plugin for this system
    GetUrl {
        index: String,
        plugin: String,
        #[command(flatten)]
        platform: PlatformArgs,
    },
    /// Download the plugin binary for this system and print its path
    DownloadPlugin {
        index: String,
        plugin: String,
        /// Directory to download into. Defaults to a new temporary directory.
        #[arg(long)]
        dst: Option<PathBuf>,
        #[command(flatten)]
        platform: PlatformArgs,
    },
    /// Install a plugin from an index and add it to plugins.json
    Install {
        index: String,
        plugin: String,
        /// Directory for the plugin binary (default: install-target from config)
        #[arg(long)]
        target: Option<PathBuf>,
        /// Path of the Portmaster plugins.json (default: plugins-config from config)
        #[arg(long)]
        config: Option<PathBuf>,
        #[command(flatten)]
        platform: PlatformArgs,
    },
    /// Install a plugin from the configured repositories and track it for updates
    Add { plugin: String },
    /// Search plugins in the configured repositories
    Search {
        /// Case-insensitive substring of the plugin name
        #[arg(long)]
        name: Option<String>,
        /// Exact tag
        #[arg(long)]
        tag: Option<String>,
        /// Plugin type (decider, resolver, reporter)
        #[arg(long = "type")]
        plugin_type: Option<PluginType>,
    },
    /// Show available updates for installed plugins
    Updates,
    /// Run the plugin manager until interrupted
    Daemon,
    /// Documentation site configuration
    #[command(subcommand)]
    Docs(DocsCommands),
    /// Manage plugin repositories
    #[command(subcommand)]
    Repo(RepoCommands),
}

/// Target platform overrides. Both default to the running system.
#[derive(Debug, Clone, Default, Args)]
pub(crate) struct PlatformArgs {
    /// Operating system (linux, windows, darwin)
    #[arg(long)]
    os: Option<String>,
    /// Architecture (amd64, arm64, arm, i386)
    #[arg(long)]
    arch: Option<String>,
}

impl PlatformArgs {
    pub(crate) fn resolve(self) -> Platform {
        let current = Platform::current();
        Platform::new(
            self.os.unwrap_or(current.os),
            self.arch.unwrap_or(current.arch),
        )
    }
}

#[derive(Debug, Subcommand)]
pub(crate) enum DocsCommands {
    /// Render the VuePress configuration
    Config {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Site configuration file (TOML). Built-in defaults when omitted.
        #[arg(long)]
        site: Option<PathBuf>,
    },
    /// Validate the site configuration
    Check {
        #[arg(long)]
        site: Option<PathBuf>,
    },
}

#[derive(Debug, Subcommand)]
pub(crate) enum RepoCommands {
    /// List configured repositories with their cache status
    List,
    /// Add a repository to the repositories file
    Add {
        name: String,
        url: String,
        /// Lower values win when plugins share a name
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        priority: i64,
    },
    /// Remove a repository from the repositories file
    Remove { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("pecs_ctl=info".parse()?)
                .add_directive("pecs_registry=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cli_config = cli_config::load_cli_config();

    let result = match cli.command {
        Commands::Verify { paths } => commands::handle_verify_command(&paths),
        Commands::VerifyIndex { locations } => {
            commands::handle_verify_index_command(&locations, &cli_config).await
        }
        Commands::Docs(cmd) => commands::handle_docs_command(cmd),
        Commands::Repo(cmd) => commands::handle_repo_command(cmd, &cli_config),
        Commands::Search {
            name,
            tag,
            plugin_type,
        } => commands::handle_search_command(name, tag, plugin_type, &cli_config).await,
        Commands::Updates => commands::handle_updates_command(&cli_config).await,
        Commands::Daemon => commands::handle_daemon_command(&cli_config).await,
        Commands::Add { plugin } => commands::handle_add_command(&plugin, &cli_config).await,
        cmd => commands::handle_plugin_command(cmd, &cli_config).await,
    };

    if let Err(e) = result {
        output::error(format!("{e:#}"));
        std::process::exit(1);
    }

    Ok(())
}
