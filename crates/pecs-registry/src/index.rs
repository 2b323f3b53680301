//! Repository index decoding and validation.
//!
//! The encoding of an index is chosen from the file extension of its path:
//! `.hcl`, `.yaml`/`.yml`, `.json` and `.toml` are supported.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use thiserror::Error;

use crate::fsutil::{is_contained_relative, is_plain_file_name};
use crate::hclfile::{self, HclError, INDEX_RULES};
use crate::types::{parse_version, RepositoryIndex};
use crate::FORMAT_VERSION;

/// Errors from decoding an index file.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("unsupported repository index format {0:?}")]
    UnsupportedFormat(String),

    #[error("failed to decode HCL index: {0}")]
    Hcl(#[from] HclError),

    #[error("failed to decode YAML index: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to decode JSON index: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to decode TOML index: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Invalid(#[from] ValidationErrors),
}

/// All problems found while validating an index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
pub struct ValidationErrors {
    errors: Vec<String>,
}

impl ValidationErrors {
    fn push(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// The individual error messages, in the order they were found.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [single] => write!(f, "{single}"),
            errors => {
                write!(f, "{} errors occurred:", errors.len())?;
                for err in errors {
                    write!(f, "\n\t* {err}")?;
                }
                Ok(())
            }
        }
    }
}

/// Decode a repository index. `path` is only used to detect the encoding.
pub fn decode_index(path: impl AsRef<Path>, bytes: &[u8]) -> Result<RepositoryIndex, IndexError> {
    let ext = path
        .as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let mut index: RepositoryIndex = match ext.as_str() {
        "hcl" => hclfile::from_str(&String::from_utf8_lossy(bytes), INDEX_RULES)?,
        "yaml" | "yml" => serde_yaml::from_slice(bytes)?,
        "json" => serde_json::from_slice(bytes)?,
        "toml" => {
            let text = String::from_utf8_lossy(bytes);
            toml::from_str(&text)?
        }
        _ => return Err(IndexError::UnsupportedFormat(format!(".{ext}"))),
    };

    // The supplying repository is assigned by the registry, never by the index.
    for plugin in &mut index.plugins {
        plugin.repository.clear();
    }

    Ok(index)
}

/// Validate all plugin descriptions in `index`.
///
/// Returns every problem found. An unsupported index version is reported on
/// its own since the rest of the file cannot be interpreted.
pub fn validate_index(index: &RepositoryIndex) -> Result<(), ValidationErrors> {
    let mut errs = ValidationErrors::default();

    if index.meta.version != FORMAT_VERSION {
        errs.push(format!(
            "unsupported index version {:?}",
            index.meta.version
        ));
        return Err(errs);
    }

    let mut seen = HashSet::new();

    for plg in &index.plugins {
        if plg.name.is_empty() {
            errs.push("plugin name must be specified");
            continue;
        }
        if !is_plain_file_name(&plg.name) {
            errs.push(format!(
                "plugin {:?}: name must not contain path separators or be '..'",
                plg.name
            ));
            continue;
        }

        let mut problems: Vec<String> = Vec::new();

        if !seen.insert(plg.name.as_str()) {
            problems.push("duplicated plugin name".to_string());
        }

        let mut has_artifact = !plg.artifact_template.is_empty();
        for artifact in &plg.artifacts {
            let mut valid = true;

            if artifact.os.is_empty() {
                problems.push("artifact OS must be specified".to_string());
                valid = false;
            }

            if !artifact.has_download_url() {
                problems.push(format!(
                    "artifact {:?}: no download URL defined",
                    artifact.os
                ));
                valid = false;
            }

            has_artifact |= valid;
        }

        let archive_files = std::iter::once(&plg.archive_file)
            .chain(plg.artifacts.iter().map(|a| &a.archive_file))
            .filter(|f| !f.is_empty());
        for archive_file in archive_files {
            if !is_contained_relative(archive_file) {
                problems.push(format!(
                    "archive file {archive_file:?} must be a relative path inside the artifact"
                ));
            }
        }

        if !has_artifact {
            if plg.artifacts.is_empty() {
                problems.push("no artifacts defined".to_string());
            } else {
                problems.push("no valid artifacts defined".to_string());
            }
        }

        if plg.version.is_empty() {
            problems.push("version not specified".to_string());
        } else if let Err(err) = parse_version(&plg.version) {
            problems.push(format!("invalid semver version: {err}"));
        }

        for problem in problems {
            errs.push(format!("plugin {}: {problem}", plg.name));
        }
    }

    if errs.is_empty() {
        Ok(())
    } else {
        Err(errs)
    }
}
