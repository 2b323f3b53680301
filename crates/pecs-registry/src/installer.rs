//! Plugin artifact selection, download and installation.
//!
//! An artifact is chosen for the current [`Platform`], downloaded into a
//! working directory and unpacked according to its file name: tar archives
//! (plain, gzip, bzip2 or xz compressed), zip archives and single
//! gzip/bzip2/xz compressed files. The plugin binary is then atomically moved
//! to `<target>/<name>-<version>`.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use thiserror::Error;
use xz2::read::XzDecoder;

use crate::fsutil;
use crate::source::{IndexSource, SourceError};
use crate::types::PluginDesc;

/// File mode of installed plugin binaries.
const PLUGIN_FILE_MODE: u32 = 0o555;

/// Errors from downloading or installing plugins.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("no artifact matches the current system")]
    NoMatchingArtifact,

    #[error("your system architecture ({0}) is not yet supported")]
    UnsupportedArch(String),

    #[error("failed to render artifact template: {0}")]
    Template(#[from] tera::Error),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("failed to unpack artifact '{}': {source}", path.display())]
    Unpack { path: PathBuf, source: io::Error },

    #[error("unsupported artifact archive format {0:?}")]
    UnsupportedArchive(String),

    #[error("invalid plugin name {0:?}: must be a plain file name")]
    InvalidPluginName(String),

    #[error("archive file {0:?} must be a relative path inside the artifact")]
    InvalidArchiveFile(String),

    #[error("plugin not found in artifact '{}'", .0.display())]
    PluginNotFound(PathBuf),

    #[error("failed to install plugin at '{}': {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl InstallError {
    fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type InstallResult<T> = Result<T, InstallError>;

/// Operating system and architecture, using the names found in indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// `linux`, `windows`, `darwin`, ...
    pub os: String,
    /// `amd64`, `arm64`, `arm` or `i386`.
    pub arch: String,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// The platform this binary was built for.
    pub fn current() -> Self {
        let os = match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            "x86" => "i386",
            other => other,
        };
        Self::new(os, arch)
    }

    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::current()
    }
}

/// Where to download a plugin from and which file inside the artifact is the plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation {
    pub url: String,
    /// Empty when not specified.
    pub archive_file: String,
}

/// Select the download location of `plugin` for `platform`.
pub fn find_matching_artifact(
    plugin: &PluginDesc,
    platform: &Platform,
) -> InstallResult<ArtifactLocation> {
    let Some(artifact) = plugin.artifacts.iter().find(|a| a.os == platform.os) else {
        if plugin.artifact_template.is_empty() {
            return Err(InstallError::NoMatchingArtifact);
        }
        return Ok(ArtifactLocation {
            url: render_artifact_template(plugin, platform)?,
            archive_file: plugin.archive_file.clone(),
        });
    };

    let archive_file = if artifact.archive_file.is_empty() {
        plugin.archive_file.clone()
    } else {
        artifact.archive_file.clone()
    };

    if !matches!(platform.arch.as_str(), "amd64" | "arm" | "arm64" | "i386") {
        return Err(InstallError::UnsupportedArch(platform.arch.clone()));
    }

    let url = artifact
        .url_for_arch(&platform.arch)
        .ok_or(InstallError::NoMatchingArtifact)?;

    Ok(ArtifactLocation {
        url: url.to_string(),
        archive_file,
    })
}

/// Render an `artifactTemplate` with Tera.
///
/// Placeholders such as `{{ os }}` that name an unknown variable render as an
/// empty string instead of failing. The template is full Tera syntax, so a
/// literal `{%` or `{#` in a URL must be escaped with `{% raw %}`.
fn render_artifact_template(plugin: &PluginDesc, platform: &Platform) -> InstallResult<String> {
    let mut ctx = tera::Context::new();
    ctx.insert("os", &platform.os);
    ctx.insert("arch", &platform.arch);
    ctx.insert("version", &plugin.version);
    ctx.insert("stripped_version", plugin.stripped_version());
    ctx.insert("plugin_name", &plugin.name);
    ctx.insert("source", &plugin.source_url);
    ctx.insert("archive_file", &plugin.archive_file);

    for name in placeholder_names(&plugin.artifact_template) {
        if !ctx.contains_key(name) {
            tracing::debug!(plugin = %plugin.name, variable = name, "Unknown artifact template variable");
            ctx.insert(name, "");
        }
    }

    Ok(tera::Tera::one_off(&plugin.artifact_template, &ctx, false)?)
}

/// Variable names used as plain `{{ name }}` placeholders in `template`.
fn placeholder_names(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            break;
        };
        let name = after[..end].trim();
        if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            names.push(name);
        }
        rest = &after[end + 2..];
    }
    names
}

/// Download the artifact of `plugin` into `dst` and return the path of the
/// plugin binary.
///
/// When `dst` is `None` a new temporary directory is created and kept; the
/// caller owns its cleanup.
pub async fn download_plugin(
    source: &IndexSource,
    plugin: &PluginDesc,
    dst: Option<&Path>,
    platform: &Platform,
) -> InstallResult<PathBuf> {
    if !fsutil::is_plain_file_name(&plugin.name) {
        return Err(InstallError::InvalidPluginName(plugin.name.clone()));
    }
    let location = find_matching_artifact(plugin, platform)?;

    let dst = match dst {
        Some(dir) => dir.to_path_buf(),
        None => tempfile::Builder::new()
            .prefix(&format!("{}-", plugin.name))
            .tempdir()
            .map_err(|e| InstallError::io(std::env::temp_dir(), e))?
            .keep(),
    };

    tracing::info!(plugin = %plugin.name, url = %location.url, dst = %dst.display(), "Downloading artifact");

    let downloaded = source.download_to(&location.url, &dst).await?;
    let artifact = unpack_artifact(&downloaded)?;

    plugin_file_from_artifact(&plugin.name, &artifact, &location.archive_file, platform)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    Tar,
    TarGz,
    TarBz2,
    TarXz,
    Zip,
    Gz,
    Bz2,
    Xz,
}

/// Artifact suffixes that are unpacked, longest first.
const ARCHIVE_SUFFIXES: &[(&str, ArchiveKind)] = &[
    (".tar.gz", ArchiveKind::TarGz),
    (".tar.bz2", ArchiveKind::TarBz2),
    (".tar.xz", ArchiveKind::TarXz),
    (".tgz", ArchiveKind::TarGz),
    (".tbz2", ArchiveKind::TarBz2),
    (".txz", ArchiveKind::TarXz),
    (".tar", ArchiveKind::Tar),
    (".zip", ArchiveKind::Zip),
    (".gz", ArchiveKind::Gz),
    (".bz2", ArchiveKind::Bz2),
    (".xz", ArchiveKind::Xz),
];

/// Archive suffixes that are recognized but cannot be unpacked.
const UNSUPPORTED_SUFFIXES: &[&str] = &[".tar.zst", ".tzst", ".zst", ".7z", ".rar"];

/// Unpack a downloaded file in place and return the resulting path.
///
/// Files without a known archive suffix are returned unchanged.
fn unpack_artifact(path: &Path) -> InstallResult<PathBuf> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    let lower = name.to_ascii_lowercase();

    if let Some(suffix) = UNSUPPORTED_SUFFIXES.iter().find(|s| lower.ends_with(*s)) {
        return Err(InstallError::UnsupportedArchive(suffix.to_string()));
    }
    let Some(&(suffix, kind)) = ARCHIVE_SUFFIXES.iter().find(|(s, _)| lower.ends_with(s)) else {
        return Ok(path.to_path_buf());
    };

    let stem = match &name[..name.len() - suffix.len()] {
        "" => "artifact",
        stem => stem,
    };
    let out = path.with_file_name(stem);
    let unpack_err = |source| InstallError::Unpack {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(unpack_err)?;
    match kind {
        ArchiveKind::Tar => unpack_tar(file, &out),
        ArchiveKind::TarGz => unpack_tar(GzDecoder::new(file), &out),
        ArchiveKind::TarBz2 => unpack_tar(BzDecoder::new(file), &out),
        ArchiveKind::TarXz => unpack_tar(XzDecoder::new(file), &out),
        ArchiveKind::Zip => unpack_zip(file, &out),
        ArchiveKind::Gz => decompress(GzDecoder::new(file), &out),
        ArchiveKind::Bz2 => decompress(BzDecoder::new(file), &out),
        ArchiveKind::Xz => decompress(XzDecoder::new(file), &out),
    }
    .map_err(unpack_err)?;
    std::fs::remove_file(path).map_err(unpack_err)?;

    tracing::debug!(artifact = %name, kind = ?kind, out = %out.display(), "Unpacked artifact");
    Ok(out)
}

fn unpack_tar(reader: impl Read, out_dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(out_dir)?;
    tar::Archive::new(reader).unpack(out_dir)
}

fn unpack_zip(file: File, out_dir: &Path) -> io::Result<()> {
    let mut archive = zip::ZipArchive::new(file).map_err(io::Error::other)?;
    std::fs::create_dir_all(out_dir)?;
    archive.extract(out_dir).map_err(io::Error::other)
}

fn decompress(mut reader: impl Read, out_file: &Path) -> io::Result<()> {
    let mut out = File::create(out_file)?;
    io::copy(&mut reader, &mut out)?;
    Ok(())
}

/// Locate the plugin binary inside an unpacked artifact.
fn plugin_file_from_artifact(
    plugin_name: &str,
    artifact: &Path,
    archive_file: &str,
    platform: &Platform,
) -> InstallResult<PathBuf> {
    let meta = std::fs::metadata(artifact).map_err(|e| InstallError::io(artifact, e))?;
    if !meta.is_dir() {
        return Ok(artifact.to_path_buf());
    }

    if !archive_file.is_empty() {
        if !fsutil::is_contained_relative(archive_file) {
            return Err(InstallError::InvalidArchiveFile(archive_file.to_string()));
        }
        let file = artifact.join(archive_file);
        return if file.is_file() {
            Ok(file)
        } else {
            Err(InstallError::PluginNotFound(artifact.to_path_buf()))
        };
    }

    let entries = std::fs::read_dir(artifact)
        .map_err(|e| InstallError::io(artifact, e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| InstallError::io(artifact, e))?;

    if let [single] = entries.as_slice() {
        let path = single.path();
        return if path.is_file() {
            Ok(path)
        } else {
            Err(InstallError::PluginNotFound(artifact.to_path_buf()))
        };
    }

    let exe_name = format!("{plugin_name}.exe");
    entries
        .iter()
        .find(|entry| {
            let name = entry.file_name();
            name == plugin_name || (platform.is_windows() && name == exe_name.as_str())
        })
        .map(|entry| entry.path())
        .ok_or_else(|| InstallError::PluginNotFound(artifact.to_path_buf()))
}

/// Installs plugins on the local host.
#[async_trait]
pub trait Installer: Send + Sync + std::fmt::Debug {
    /// Install `plugin` and return the path of the installed binary.
    async fn install_plugin(&self, plugin: &PluginDesc) -> InstallResult<PathBuf>;
}

/// Downloads plugin binaries and installs them into a target directory.
#[derive(Debug, Clone)]
pub struct PluginInstaller {
    pub target_directory: PathBuf,
    pub platform: Platform,
    source: IndexSource,
}

impl PluginInstaller {
    pub fn new(target_directory: impl Into<PathBuf>) -> Self {
        Self {
            target_directory: target_directory.into(),
            platform: Platform::current(),
            source: IndexSource::new(),
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_source(mut self, source: IndexSource) -> Self {
        self.source = source;
        self
    }

    /// Install location of `plugin`.
    pub fn target_path(&self, plugin: &PluginDesc) -> PathBuf {
        self.target_directory.join(self.target_file_name(plugin))
    }

    fn target_file_name(&self, plugin: &PluginDesc) -> String {
        let mut file_name = format!("{}-{}", plugin.name, plugin.version);
        if self.platform.is_windows() {
            file_name.push_str(".exe");
        }
        file_name
    }
}

#[async_trait]
impl Installer for PluginInstaller {
    async fn install_plugin(&self, plugin: &PluginDesc) -> InstallResult<PathBuf> {
        let file_name = self.target_file_name(plugin);
        if !fsutil::is_plain_file_name(&plugin.name) || !fsutil::is_plain_file_name(&file_name) {
            return Err(InstallError::InvalidPluginName(file_name));
        }

        let work_dir = tempfile::Builder::new()
            .prefix(&format!("{}-", plugin.name))
            .tempdir()
            .map_err(|e| InstallError::io(std::env::temp_dir(), e))?;

        let plugin_file =
            download_plugin(&self.source, plugin, Some(work_dir.path()), &self.platform).await?;
        tracing::info!(plugin = %plugin.name, plugin_file = %plugin_file.display(), "Artifact downloaded");

        let target = self.target_path(plugin);
        let mut file = File::open(&plugin_file).map_err(|e| InstallError::io(&plugin_file, e))?;
        fsutil::replace_file(&target, &mut file, PLUGIN_FILE_MODE)
            .map_err(|e| InstallError::io(&target, e))?;

        tracing::info!(plugin = %plugin.name, target = %target.display(), "Plugin installed");
        Ok(target)
    }
}
