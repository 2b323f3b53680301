//! Maintenance of the Portmaster `plugins.json`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::fsutil;
use crate::manager::{HostError, PluginHost};
use crate::types::PluginConfig;

/// Default location of the Portmaster plugin configuration.
pub const DEFAULT_PLUGINS_CONFIG: &str = "/opt/safing/portmaster/plugins.json";

#[derive(Debug, Error)]
pub enum PluginsConfigError {
    #[error("failed to read plugins.json '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse plugins.json '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to marshal JSON configuration file: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to write plugins.json '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Add or replace the entry for `config.name` in the plugins.json at `path`.
///
/// The new entry is placed first. Other entries are kept as they are,
/// including fields this crate does not know about.
pub fn update_plugins_config(path: &Path, config: &PluginConfig) -> Result<(), PluginsConfigError> {
    let mut entries: Vec<Value> = match std::fs::read(path) {
        Ok(blob) if blob.iter().all(u8::is_ascii_whitespace) => Vec::new(),
        Ok(blob) => serde_json::from_slice(&blob).map_err(|source| PluginsConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(source) => {
            return Err(PluginsConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if let Some(idx) = entries
        .iter()
        .position(|e| e.get("name").and_then(Value::as_str) == Some(config.name.as_str()))
    {
        entries.remove(idx);
    }
    entries.insert(0, serde_json::to_value(config)?);

    let mut blob = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut blob, formatter);
    entries.serialize(&mut ser)?;

    fsutil::write_atomic(path, &blob, 0o644).map_err(|source| PluginsConfigError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!(plugin = %config.name, path = %path.display(), "Updated plugins.json");
    Ok(())
}

/// [`PluginHost`] that registers plugins by updating a plugins.json file.
#[derive(Debug, Clone)]
pub struct PluginsJsonHost {
    path: PathBuf,
}

impl PluginsJsonHost {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PluginHost for PluginsJsonHost {
    async fn register_plugin(&self, config: PluginConfig) -> Result<(), HostError> {
        update_plugins_config(&self.path, &config)?;
        Ok(())
    }
}
