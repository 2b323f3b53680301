//! The list of configured plugin repositories.
//!
//! ```toml
//! [[repository]]
//! name = "main"
//! url = "https://raw.githubusercontent.com/ppacher/portmaster-plugin-registry/main/repository.hcl"
//! priority = 0
//! ```
//!
//! Files ending in `.hcl` use labeled blocks instead
//! (`repository "main" { url = "..." }`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hclfile::{self, HclError, REPOSITORIES_RULES};
use crate::types::Repository;

pub const DEFAULT_REPOSITORY_NAME: &str = "main";
pub const DEFAULT_REPOSITORY_URL: &str =
    "https://raw.githubusercontent.com/ppacher/portmaster-plugin-registry/main/repository.hcl";

#[derive(Debug, Error)]
pub enum RepositoriesError {
    #[error("failed to read repositories file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse repositories file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to parse repositories file '{}': {source}", path.display())]
    ParseHcl { path: PathBuf, source: HclError },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RepositoriesFile {
    #[serde(default, rename = "repository")]
    repositories: Vec<Repository>,
}

/// The repository used when none is configured.
pub fn default_repositories() -> Vec<Repository> {
    vec![Repository {
        name: DEFAULT_REPOSITORY_NAME.to_string(),
        url: DEFAULT_REPOSITORY_URL.to_string(),
        priority: 0,
    }]
}

/// Load repositories from `path`. A missing file or a file without any
/// repository yields [`default_repositories`].
pub fn load_repositories(path: &Path) -> Result<Vec<Repository>, RepositoriesError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No repositories file, using defaults");
            return Ok(default_repositories());
        }
        Err(source) => {
            return Err(RepositoriesError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let is_hcl = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("hcl"));
    let file: RepositoriesFile = if is_hcl {
        hclfile::from_str(&content, REPOSITORIES_RULES).map_err(|source| {
            RepositoriesError::ParseHcl {
                path: path.to_path_buf(),
                source,
            }
        })?
    } else {
        toml::from_str(&content).map_err(|source| RepositoriesError::Parse {
            path: path.to_path_buf(),
            source,
        })?
    };

    if file.repositories.is_empty() {
        return Ok(default_repositories());
    }
    Ok(file.repositories)
}
