//! Plugin registry for the Portmaster ("PECS").
//!
//! This crate provides everything needed to publish, discover and install
//! third-party Portmaster plugins. It is consumed by the `pecs-ctl` binary,
//! both for one-shot registry utility commands and for the long-running
//! update manager.
//!
//! # Modules
//!
//! - [`types`]: Repository, index and plugin description types
//! - [`index`]: Index file decoding (HCL, YAML, JSON, TOML) and validation
//! - [`hclfile`]: Labeled-block HCL decoding shared by indexes and repository lists
//! - [`source`]: Fetching indexes and artifacts over HTTP(S) or from disk, with an offline cache
//! - [`registry`]: Priority-ordered merge of repository indexes, search and update detection
//! - [`installer`]: Artifact selection, download, unpacking and atomic installation
//! - [`manager`]: Installed plugin state, periodic refresh and update callbacks
//! - [`notification`]: User notifications for fetch failures and available updates
//! - [`plugins_config`]: Portmaster `plugins.json` maintenance
//! - [`repositories`]: Repository list configuration
//! - [`docs`]: Documentation site configuration for the PECS docs

mod fsutil;

pub mod docs;
pub mod hclfile;
pub mod index;
pub mod installer;
pub mod manager;
pub mod notification;
pub mod plugins_config;
pub mod registry;
pub mod repositories;
pub mod source;
pub mod types;

pub use index::{decode_index, validate_index, IndexError, ValidationErrors};
pub use installer::{Installer, PluginInstaller, Platform};
pub use manager::{Manager, PluginHost, PluginProvider};
pub use registry::{Registry, RegistryError, RegistryResult};
pub use source::{IndexCache, IndexSource};
pub use types::{
    AvailableUpdate, InstalledPlugin, PluginConfig, PluginDesc, PluginType, Repository,
    RepositoryIndex,
};

/// Version string written to and expected in index and state files.
pub const FORMAT_VERSION: &str = "v1.0.0";
