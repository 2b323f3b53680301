//! Plugin registry: merges the indexes of all configured repositories.
//!
//! Repositories are fetched in ascending priority order. The first repository
//! that lists a plugin name provides it; later listings are shadowed.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;
use tokio::sync::RwLock;

use crate::index::{decode_index, validate_index, IndexError};
use crate::source::{IndexSource, SourceError};
use crate::types::{parse_version, PluginDesc, PluginType, Repository, RepositoryIndex};

/// Errors from registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("repository {0:?} is already defined")]
    RepoDefined(String),

    #[error("unknown plugin name {0:?}")]
    UnknownPlugin(String),

    #[error("failed to fetch index '{location}': {source}")]
    Fetch {
        location: String,
        source: SourceError,
    },

    #[error("invalid index '{location}': {source}")]
    Index {
        location: String,
        source: IndexError,
    },

    #[error("failed to parse {which} version {version:?}: {source}")]
    Version {
        which: &'static str,
        version: String,
        source: semver::Error,
    },
}

impl RegistryError {
    fn index(location: &str, source: impl Into<IndexError>) -> Self {
        Self::Index {
            location: location.to_string(),
            source: source.into(),
        }
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Fetch, decode and validate the index at `location`.
pub async fn load_index(source: &IndexSource, location: &str) -> RegistryResult<RepositoryIndex> {
    let fetched = source
        .fetch(location)
        .await
        .map_err(|source| RegistryError::Fetch {
            location: location.to_string(),
            source,
        })?;

    let index =
        decode_index(&fetched.name, &fetched.bytes).map_err(|e| RegistryError::index(location, e))?;
    validate_index(&index).map_err(|e| RegistryError::index(location, e))?;

    Ok(index)
}

/// Manages plugin repositories and the merged list of available plugins.
///
/// All methods take `&self`; share the registry through an `Arc`.
#[derive(Debug, Default)]
pub struct Registry {
    source: IndexSource,
    repos: RwLock<HashMap<String, Repository>>,
    plugins: RwLock<BTreeMap<String, PluginDesc>>,
}

impl Registry {
    /// Create an empty registry. Add repositories and call [`Registry::fetch`].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(source: IndexSource) -> Self {
        Self {
            source,
            ..Self::default()
        }
    }

    pub async fn add_repository(&self, repo: Repository) -> RegistryResult<()> {
        let mut repos = self.repos.write().await;
        if repos.contains_key(&repo.name) {
            return Err(RegistryError::RepoDefined(repo.name));
        }

        tracing::debug!(repository = %repo.name, url = %repo.url, priority = repo.priority, "Added repository");
        repos.insert(repo.name.clone(), repo);
        Ok(())
    }

    /// Configured repositories, highest priority (lowest value) first.
    pub async fn repositories(&self) -> Vec<Repository> {
        let mut list: Vec<Repository> = self.repos.read().await.values().cloned().collect();
        list.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        list
    }

    /// Fetch all repository indexes and replace the list of available plugins.
    ///
    /// On any failure the previous plugin list is kept.
    pub async fn fetch(&self) -> RegistryResult<()> {
        let mut merged: BTreeMap<String, PluginDesc> = BTreeMap::new();

        for repo in self.repositories().await {
            let index = load_index(&self.source, &repo.url).await?;
            let count = index.plugins.len();

            for mut plg in index.plugins {
                if merged.contains_key(&plg.name) {
                    // Already provided by a higher-priority repository.
                    continue;
                }
                plg.repository = repo.name.clone();
                merged.insert(plg.name.clone(), plg);
            }

            tracing::debug!(repository = %repo.name, plugins = count, "Fetched repository index");
        }

        tracing::info!(plugins = merged.len(), "Registry updated");
        *self.plugins.write().await = merged;
        Ok(())
    }

    /// All available plugins, sorted by name.
    pub async fn list_plugins(&self) -> Vec<PluginDesc> {
        self.plugins.read().await.values().cloned().collect()
    }

    pub async fn by_name(&self, name: &str) -> Option<PluginDesc> {
        self.plugins.read().await.get(name).cloned()
    }

    /// Plugins carrying exactly `tag`.
    pub async fn search_by_tag(&self, tag: &str) -> Vec<PluginDesc> {
        self.filter(|plg| plg.tags.iter().any(|t| t == tag)).await
    }

    /// Plugins implementing `plugin_type`.
    pub async fn search_by_type(&self, plugin_type: PluginType) -> Vec<PluginDesc> {
        self.filter(|plg| plg.plugin_types.contains(&plugin_type))
            .await
    }

    /// Plugins whose name contains `name`, ignoring case.
    pub async fn search_by_name(&self, name: &str) -> Vec<PluginDesc> {
        let needle = name.to_lowercase();
        self.filter(|plg| plg.name.to_lowercase().contains(&needle))
            .await
    }

    async fn filter(&self, pred: impl Fn(&PluginDesc) -> bool) -> Vec<PluginDesc> {
        self.plugins
            .read()
            .await
            .values()
            .filter(|plg| pred(plg))
            .cloned()
            .collect()
    }

    /// Returns the available version of `name` if it is newer than `current`.
    pub async fn update_available(&self, name: &str, current: &str) -> RegistryResult<Option<String>> {
        let plg = self
            .by_name(name)
            .await
            .ok_or_else(|| RegistryError::UnknownPlugin(name.to_string()))?;

        let current_version = parse_version(current).map_err(|source| RegistryError::Version {
            which: "current",
            version: current.to_string(),
            source,
        })?;
        let available_version =
            parse_version(&plg.version).map_err(|source| RegistryError::Version {
                which: "available",
                version: plg.version.clone(),
                source,
            })?;

        Ok((available_version > current_version).then_some(plg.version))
    }
}
