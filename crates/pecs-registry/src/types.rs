//! Repository, index and plugin description types.
//!
//! Index files use camelCase keys (`pluginTypes`, `artifactTemplate`) so that
//! the same structures decode from HCL, YAML, JSON and TOML.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A repository that publishes an index of available plugins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Human-friendly name, unique within a registry.
    pub name: String,

    /// Location of the repository index file (`.hcl`, `.yaml`, `.json` or `.toml`).
    pub url: String,

    /// Lower values win when a plugin is listed by multiple repositories.
    #[serde(default)]
    pub priority: i64,
}

/// Meta data of an index file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    /// Index format version. Must be `v1.0.0`.
    pub version: String,

    /// Optional human readable description of the repository.
    #[serde(default)]
    pub description: String,
}

/// Download locations of a plugin for one operating system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Operating system name (`linux`, `windows`, `darwin`).
    #[serde(default)]
    pub os: String,

    #[serde(default)]
    pub amd64: String,
    #[serde(default)]
    pub arm: String,
    #[serde(default)]
    pub arm64: String,
    #[serde(default)]
    pub i386: String,

    /// Name of the plugin binary inside the downloaded archive.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub archive_file: String,
}

impl Artifact {
    /// Download URL for the given architecture, if any is defined.
    pub fn url_for_arch(&self, arch: &str) -> Option<&str> {
        let url = match arch {
            "amd64" => &self.amd64,
            "arm" => &self.arm,
            "arm64" => &self.arm64,
            "i386" => &self.i386,
            _ => return None,
        };
        (!url.is_empty()).then_some(url.as_str())
    }

    /// Whether at least one architecture has a download URL.
    pub fn has_download_url(&self) -> bool {
        [&self.amd64, &self.arm, &self.arm64, &self.i386]
            .iter()
            .any(|url| !url.is_empty())
    }
}

/// Plugin types understood by the Portmaster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    Decider,
    Reporter,
    Resolver,
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decider => write!(f, "decider"),
            Self::Reporter => write!(f, "reporter"),
            Self::Resolver => write!(f, "resolver"),
        }
    }
}

impl FromStr for PluginType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "decider" => Ok(Self::Decider),
            "reporter" => Ok(Self::Reporter),
            "resolver" => Ok(Self::Resolver),
            other => Err(format!("unsupported plugin type: {other}")),
        }
    }
}

/// Description of a plugin as published in a repository index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDesc {
    /// Unique name of the plugin within a repository.
    #[serde(default)]
    pub name: String,

    /// Source code repository of the plugin.
    #[serde(default, rename = "source")]
    pub source_url: String,

    /// Current version (semver, optional leading `v`).
    #[serde(default)]
    pub version: String,

    /// Per-OS download URLs.
    #[serde(default)]
    pub artifacts: Vec<Artifact>,

    /// URL template used when no artifact matches the current OS.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub artifact_template: String,

    /// Default name of the plugin binary inside downloaded archives.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub archive_file: String,

    /// Plugin types implemented by the plugin.
    #[serde(default)]
    pub plugin_types: Vec<PluginType>,

    /// Whether the plugin requires privileged access.
    #[serde(default)]
    pub privileged: bool,

    #[serde(default)]
    pub author: String,

    /// License identifier.
    #[serde(default)]
    pub license: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Name of the repository that supplied this plugin. Set by the registry.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repository: String,
}

impl PluginDesc {
    /// Version without a leading `v`.
    pub fn stripped_version(&self) -> &str {
        self.version.strip_prefix('v').unwrap_or(&self.version)
    }
}

/// Contents of a repository index file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryIndex {
    pub meta: IndexMeta,

    #[serde(default)]
    pub plugins: Vec<PluginDesc>,
}

/// A plugin installed by the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPlugin {
    #[serde(flatten)]
    pub plugin: PluginDesc,

    /// Path of the installed plugin binary.
    pub path: PathBuf,
}

/// An update for an installed plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableUpdate {
    pub name: String,
    pub current_version: String,
    pub new_version: String,
}

/// Persisted manager state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPluginsFile {
    pub version: String,

    #[serde(default)]
    pub plugins: Vec<InstalledPlugin>,
}

/// A plugin entry of the Portmaster `plugins.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfig {
    pub name: String,

    #[serde(default)]
    pub types: Vec<PluginType>,

    #[serde(default)]
    pub privileged: bool,

    #[serde(default)]
    pub disable_autostart: bool,
}

impl PluginConfig {
    /// Build the Portmaster configuration entry for a plugin description.
    pub fn for_plugin(plugin: &PluginDesc, disable_autostart: bool) -> Self {
        Self {
            name: plugin.name.clone(),
            types: plugin.plugin_types.clone(),
            privileged: plugin.privileged,
            disable_autostart,
        }
    }
}

/// Parse a plugin version, accepting an optional leading `v`.
///
/// One to three numeric segments are accepted; missing minor and patch
/// numbers are zero, so `v1.2` equals `1.2.0`.
pub fn parse_version(version: &str) -> Result<semver::Version, semver::Error> {
    let trimmed = version.trim();
    let unprefixed = trimmed.strip_prefix('v').unwrap_or(trimmed);

    let core_end = unprefixed.find(['-', '+']).unwrap_or(unprefixed.len());
    let (core, suffix) = unprefixed.split_at(core_end);
    let padding = match core.matches('.').count() {
        0 => ".0.0",
        1 => ".0",
        _ => "",
    };
    semver::Version::parse(&format!("{core}{padding}{suffix}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_url_for_arch() {
        let artifact = Artifact {
            os: "linux".to_string(),
            amd64: "https://example.com/amd64".to_string(),
            ..Default::default()
        };
        assert_eq!(
            artifact.url_for_arch("amd64"),
            Some("https://example.com/amd64")
        );
        assert_eq!(artifact.url_for_arch("arm64"), None);
        assert_eq!(artifact.url_for_arch("mips"), None);
        assert!(artifact.has_download_url());
        assert!(!Artifact::default().has_download_url());
    }

    #[test]
    fn test_plugin_type_parse_and_display() {
        assert_eq!("Decider".parse::<PluginType>(), Ok(PluginType::Decider));
        assert_eq!(PluginType::Resolver.to_string(), "resolver");
        assert!("firewall".parse::<PluginType>().is_err());
    }

    #[test]
    fn test_parse_version_accepts_v_prefix() {
        assert_eq!(parse_version("v1.2.3").unwrap(), semver::Version::new(1, 2, 3));
        assert_eq!(parse_version("0.4.0").unwrap(), semver::Version::new(0, 4, 0));
        assert!(parse_version("latest").is_err());
    }

    #[test]
    fn test_parse_version_pads_missing_segments() {
        assert_eq!(parse_version("v1.2").unwrap(), parse_version("1.2.0").unwrap());
        assert_eq!(parse_version("1").unwrap(), semver::Version::new(1, 0, 0));
        assert_eq!(
            parse_version("v2.1-beta.1").unwrap(),
            semver::Version::parse("2.1.0-beta.1").unwrap()
        );
        assert!(parse_version("").is_err());
        assert!(parse_version("1.2.3.4").is_err());
    }

    #[test]
    fn test_plugin_desc_json_keys() {
        let json = r#"{
            "name": "ipinfo",
            "source": "https://github.com/example/ipinfo",
            "version": "v0.1.0",
            "pluginTypes": ["decider", "reporter"],
            "artifactTemplate": "https://example.com/{{ os }}",
            "repository": "ignored-later"
        }"#;
        let plg: PluginDesc = serde_json::from_str(json).unwrap();
        assert_eq!(plg.source_url, "https://github.com/example/ipinfo");
        assert_eq!(
            plg.plugin_types,
            vec![PluginType::Decider, PluginType::Reporter]
        );
        assert_eq!(plg.artifact_template, "https://example.com/{{ os }}");
        assert_eq!(plg.stripped_version(), "0.1.0");
    }

    #[test]
    fn test_unknown_plugin_type_rejected() {
        let json = r#"{"name": "x", "version": "1.0.0", "pluginTypes": ["firewall"]}"#;
        assert!(serde_json::from_str::<PluginDesc>(json).is_err());
    }

    #[test]
    fn test_plugin_config_json_shape() {
        let plg = PluginDesc {
            name: "ipinfo".to_string(),
            plugin_types: vec![PluginType::Resolver],
            privileged: true,
            ..Default::default()
        };
        let cfg = PluginConfig::for_plugin(&plg, true);
        let value = serde_json::to_value(&cfg).unwrap();
        assert_eq!(value["disableAutostart"], true);
        assert_eq!(value["types"][0], "resolver");
        assert_eq!(value["privileged"], true);
    }
}
