//! CLI configuration: where the registry keeps its files.
//!
//! All paths default to locations below `base-dir`, which matches the
//! Portmaster installation directory.

pub(crate) mod loader;

pub(crate) use loader::load_cli_config;

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use loader::expand_path;

const DEFAULT_BASE_DIR: &str = "/opt/safing/portmaster";

/// CLI-specific configuration loaded from `.pecs-ctl.toml`.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "kebab-case", default)]
pub(crate) struct CliConfig {
    /// Portmaster base directory. Default: `/opt/safing/portmaster`.
    pub base_dir: String,

    /// Repository list. Default: `<base-dir>/repositories.toml`.
    pub repositories_file: Option<String>,

    /// Installed plugins state. Default: `<base-dir>/registry.state.toml`.
    pub state_file: Option<String>,

    /// Directory for installed plugin binaries. Default: `<base-dir>/plugins`.
    pub install_target: Option<String>,

    /// Portmaster plugin configuration. Default: `<base-dir>/plugins.json`.
    pub plugins_config: Option<String>,

    /// Maximum age in hours before a cached index is considered stale. Default: 24.
    pub cache_max_age_hours: u64,

    /// Minutes between two repository fetches of the daemon. Default: 10.
    pub fetch_interval_minutes: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            base_dir: DEFAULT_BASE_DIR.to_string(),
            repositories_file: None,
            state_file: None,
            install_target: None,
            plugins_config: None,
            cache_max_age_hours: pecs_registry::source::DEFAULT_CACHE_MAX_AGE_HOURS,
            fetch_interval_minutes: 10,
        }
    }
}

impl CliConfig {
    fn resolve(&self, configured: Option<&str>, default_name: &str) -> PathBuf {
        match configured {
            Some(path) => expand_path(path),
            None => expand_path(&self.base_dir).join(default_name),
        }
    }

    pub(crate) fn repositories_file(&self) -> PathBuf {
        self.resolve(self.repositories_file.as_deref(), "repositories.toml")
    }

    pub(crate) fn state_file(&self) -> PathBuf {
        self.resolve(self.state_file.as_deref(), "registry.state.toml")
    }

    pub(crate) fn install_target(&self) -> PathBuf {
        self.resolve(self.install_target.as_deref(), "plugins")
    }

    pub(crate) fn plugins_config(&self) -> PathBuf {
        self.resolve(self.plugins_config.as_deref(), "plugins.json")
    }

    pub(crate) fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_minutes.max(1) * 60)
    }
}
