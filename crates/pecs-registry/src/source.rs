//! Fetching repository indexes and plugin artifacts.
//!
//! Locations are either `http(s)://` URLs, `file://` URLs or plain filesystem
//! paths. Remote index downloads can be mirrored into an [`IndexCache`] at
//! `~/.cache/pecs/indexes/<hash>/` so a registry keeps working offline.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use thiserror::Error;

const CACHE_DIR_NAME: &str = "pecs";
const INDEXES_DIR_NAME: &str = "indexes";
const LAST_FETCH_FILE: &str = ".pecs-last-fetch";

/// Default age after which a cached index is reported as stale.
pub const DEFAULT_CACHE_MAX_AGE_HOURS: u64 = 24;

/// Errors from fetching indexes or artifacts.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to download '{url}': {source}")]
    Http {
        url: String,
        source: reqwest::Error,
    },

    #[error("failed to access '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid location '{0}'")]
    InvalidLocation(String),

    #[error("cache directory error: {0}")]
    Cache(String),
}

impl SourceError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type SourceResult<T> = Result<T, SourceError>;

/// A fetched file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    /// Last path segment of the location (query and fragment stripped).
    pub name: String,
    pub bytes: Vec<u8>,
    /// Whether the content was served from the offline cache.
    pub from_cache: bool,
}

#[derive(Debug)]
enum Location<'a> {
    Remote(&'a str),
    Local(PathBuf),
}

impl<'a> Location<'a> {
    fn classify(location: &'a str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            Self::Remote(location)
        } else if let Some(path) = location.strip_prefix("file://") {
            Self::Local(PathBuf::from(path))
        } else {
            Self::Local(PathBuf::from(location))
        }
    }
}

fn remote_file_name(location: &str) -> SourceResult<String> {
    let url =
        url::Url::parse(location).map_err(|_| SourceError::InvalidLocation(location.to_string()))?;
    url.path_segments()
        .and_then(|segments| segments.last())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SourceError::InvalidLocation(location.to_string()))
}

fn local_file_name(path: &Path) -> SourceResult<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| SourceError::InvalidLocation(path.display().to_string()))
}

/// Fetches index files and artifacts from remote or local locations.
#[derive(Debug, Clone, Default)]
pub struct IndexSource {
    client: reqwest::Client,
    cache: Option<IndexCache>,
}

impl IndexSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror successful remote index downloads into `cache` and fall back to
    /// it when a download fails.
    pub fn with_cache(mut self, cache: IndexCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache(&self) -> Option<&IndexCache> {
        self.cache.as_ref()
    }

    /// Fetch an index file.
    pub async fn fetch(&self, location: &str) -> SourceResult<FetchedFile> {
        match Location::classify(location) {
            Location::Local(path) => {
                let name = local_file_name(&path)?;
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|e| SourceError::io(&path, e))?;
                Ok(FetchedFile {
                    name,
                    bytes,
                    from_cache: false,
                })
            }
            Location::Remote(url) => {
                let name = remote_file_name(url)?;
                match self.download(url).await {
                    Ok(bytes) => {
                        if let Some(cache) = &self.cache {
                            if let Err(err) = cache.store(url, &name, &bytes) {
                                tracing::warn!(url, error = %err, "Failed to update index cache");
                            }
                        }
                        Ok(FetchedFile {
                            name,
                            bytes,
                            from_cache: false,
                        })
                    }
                    Err(err) => self.fallback(url, err),
                }
            }
        }
    }

    fn fallback(&self, url: &str, err: SourceError) -> SourceResult<FetchedFile> {
        let Some(cache) = &self.cache else {
            return Err(err);
        };
        let Some(cached) = cache.load(url) else {
            return Err(err);
        };

        tracing::warn!(url, error = %err, "Download failed, using cached index (offline mode)");
        if cache.is_stale(url) {
            tracing::warn!(
                url,
                "Cached index is stale (older than {}h)",
                cache.max_age_hours()
            );
        }
        Ok(cached)
    }

    /// Download or copy the file at `location` into `dir` and return its path.
    pub async fn download_to(&self, location: &str, dir: &Path) -> SourceResult<PathBuf> {
        let (name, bytes) = match Location::classify(location) {
            Location::Local(path) => {
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|e| SourceError::io(&path, e))?;
                (local_file_name(&path)?, bytes)
            }
            Location::Remote(url) => (remote_file_name(url)?, self.download(url).await?),
        };

        let target = dir.join(name);
        tokio::fs::write(&target, &bytes)
            .await
            .map_err(|e| SourceError::io(&target, e))?;

        tracing::debug!(location, path = %target.display(), size = bytes.len(), "Downloaded file");
        Ok(target)
    }

    async fn download(&self, url: &str) -> SourceResult<Vec<u8>> {
        let http_err = |source| SourceError::Http {
            url: url.to_string(),
            source,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(http_err)?;

        let bytes = response.bytes().await.map_err(http_err)?;
        Ok(bytes.to_vec())
    }
}

/// Offline copies of remote index files.
///
/// Each URL is hashed to a directory holding the downloaded file and a
/// `.pecs-last-fetch` timestamp. Stale copies still work but produce warnings.
#[derive(Debug, Clone)]
pub struct IndexCache {
    base: PathBuf,
    max_age_hours: u64,
}

impl IndexCache {
    pub fn new(base: impl Into<PathBuf>, max_age_hours: u64) -> Self {
        Self {
            base: base.into(),
            max_age_hours,
        }
    }

    /// Cache rooted at `$XDG_CACHE_HOME/pecs/indexes` (fallback `$HOME/.cache`).
    pub fn from_env(max_age_hours: u64) -> SourceResult<Self> {
        let cache_dir = if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
            PathBuf::from(xdg)
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home).join(".cache")
        } else {
            return Err(SourceError::Cache(
                "Cannot determine cache directory: neither XDG_CACHE_HOME nor HOME is set"
                    .to_string(),
            ));
        };

        Ok(Self::new(
            cache_dir.join(CACHE_DIR_NAME).join(INDEXES_DIR_NAME),
            max_age_hours,
        ))
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn max_age_hours(&self) -> u64 {
        self.max_age_hours
    }

    /// Cache directory for a URL.
    pub fn entry_dir(&self, url: &str) -> PathBuf {
        let mut hasher = DefaultHasher::new();
        url.hash(&mut hasher);
        self.base.join(format!("_url_{:016x}", hasher.finish()))
    }

    /// Replace the cached copy of `url`.
    pub fn store(&self, url: &str, name: &str, bytes: &[u8]) -> SourceResult<()> {
        let dir = self.entry_dir(url);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| SourceError::io(&dir, e))?;
        }
        std::fs::create_dir_all(&dir).map_err(|e| SourceError::io(&dir, e))?;

        let file = dir.join(name);
        std::fs::write(&file, bytes).map_err(|e| SourceError::io(&file, e))?;

        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let timestamp_file = dir.join(LAST_FETCH_FILE);
        std::fs::write(&timestamp_file, now.to_string())
            .map_err(|e| SourceError::io(&timestamp_file, e))?;
        Ok(())
    }

    /// Load the cached copy of `url`, if any.
    pub fn load(&self, url: &str) -> Option<FetchedFile> {
        let dir = self.entry_dir(url);
        let entry = std::fs::read_dir(&dir)
            .ok()?
            .filter_map(Result::ok)
            .find(|e| e.file_name() != LAST_FETCH_FILE)?;

        let name = entry.file_name().to_str()?.to_string();
        let bytes = std::fs::read(entry.path()).ok()?;
        Some(FetchedFile {
            name,
            bytes,
            from_cache: true,
        })
    }

    /// When `url` was last stored, if it is cached.
    pub fn last_fetch_time(&self, url: &str) -> Option<SystemTime> {
        let contents = std::fs::read_to_string(self.entry_dir(url).join(LAST_FETCH_FILE)).ok()?;
        let ts: u64 = contents.trim().parse().ok()?;
        Some(SystemTime::UNIX_EPOCH + Duration::from_secs(ts))
    }

    /// Whether the cached copy of `url` is older than the configured max age.
    /// A missing timestamp counts as stale.
    pub fn is_stale(&self, url: &str) -> bool {
        match self.last_fetch_time(url) {
            Some(fetch_time) => {
                let age = SystemTime::now()
                    .duration_since(fetch_time)
                    .unwrap_or(Duration::MAX);
                age > Duration::from_secs(self.max_age_hours.saturating_mul(3600))
            }
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_file_name_strips_query() {
        assert_eq!(
            remote_file_name("https://example.com/repo/index.yaml?token=abc#top").unwrap(),
            "index.yaml"
        );
        assert!(remote_file_name("https://example.com/").is_err());
    }

    #[test]
    fn test_classify_locations() {
        assert!(matches!(
            Location::classify("https://example.com/a.json"),
            Location::Remote(_)
        ));
        match Location::classify("file:///srv/index.toml") {
            Location::Local(path) => assert_eq!(path, PathBuf::from("/srv/index.toml")),
            Location::Remote(_) => panic!("expected local path"),
        }
        assert!(matches!(
            Location::classify("./index.yaml"),
            Location::Local(_)
        ));
    }

    #[tokio::test]
    async fn test_fetch_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.yaml");
        std::fs::write(&path, "meta: {}").unwrap();

        let source = IndexSource::new();
        let fetched = source.fetch(path.to_str().unwrap()).await.unwrap();
        assert_eq!(fetched.name, "index.yaml");
        assert_eq!(fetched.bytes, b"meta: {}");
        assert!(!fetched.from_cache);

        let url = format!("file://{}", path.display());
        assert_eq!(source.fetch(&url).await.unwrap().name, "index.yaml");
    }

    #[tokio::test]
    async fn test_fetch_missing_local_file() {
        let err = IndexSource::new()
            .fetch("/definitely/not/here/index.json")
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Io { .. }));
    }

    #[tokio::test]
    async fn test_download_to_copies_local_file() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let path = src.path().join("plugin.bin");
        std::fs::write(&path, b"binary").unwrap();

        let out = IndexSource::new()
            .download_to(path.to_str().unwrap(), dst.path())
            .await
            .unwrap();
        assert_eq!(out, dst.path().join("plugin.bin"));
        assert_eq!(std::fs::read(out).unwrap(), b"binary");
    }

    #[test]
    fn test_cache_store_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(dir.path(), 24);
        let url = "https://example.com/index.yaml";

        assert!(cache.load(url).is_none());
        assert!(cache.is_stale(url));

        cache.store(url, "index.yaml", b"first").unwrap();
        cache.store(url, "index.yaml", b"second").unwrap();

        let cached = cache.load(url).unwrap();
        assert_eq!(cached.name, "index.yaml");
        assert_eq!(cached.bytes, b"second");
        assert!(cached.from_cache);
        assert!(!cache.is_stale(url));
        assert!(cache.last_fetch_time(url).is_some());
    }

    #[test]
    fn test_cache_zero_max_age_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(dir.path(), 0);
        let url = "https://example.com/index.json";
        cache.store(url, "index.json", b"{}").unwrap();

        // Backdate the timestamp
        std::fs::write(cache.entry_dir(url).join(LAST_FETCH_FILE), "0").unwrap();
        assert!(cache.is_stale(url));
    }

    #[test]
    fn test_cache_huge_max_age_never_stale() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(dir.path(), u64::MAX);
        let url = "https://example.com/index.json";
        cache.store(url, "index.json", b"{}").unwrap();

        std::fs::write(cache.entry_dir(url).join(LAST_FETCH_FILE), "0").unwrap();
        assert!(!cache.is_stale(url));
    }

    #[test]
    fn test_cache_dirs_are_deterministic() {
        let cache = IndexCache::new("/tmp/cache", 24);
        assert_eq!(
            cache.entry_dir("https://a.example/index.yaml"),
            cache.entry_dir("https://a.example/index.yaml")
        );
        assert_ne!(
            cache.entry_dir("https://a.example/index.yaml"),
            cache.entry_dir("https://b.example/index.yaml")
        );
    }

    #[tokio::test]
    async fn test_fetch_falls_back_to_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(dir.path(), 24);
        // Port 9 (discard) on localhost refuses connections.
        let url = "http://127.0.0.1:9/index.yaml";
        cache.store(url, "index.yaml", b"cached").unwrap();

        let source = IndexSource::new().with_cache(cache);
        let fetched = source.fetch(url).await.unwrap();
        assert!(fetched.from_cache);
        assert_eq!(fetched.bytes, b"cached");
    }

    #[serial_test::serial]
    #[test]
    fn test_cache_from_env_uses_xdg() {
        let dir = tempfile::tempdir().unwrap();
        let previous = std::env::var_os("XDG_CACHE_HOME");
        std::env::set_var("XDG_CACHE_HOME", dir.path());

        let cache = IndexCache::from_env(12).unwrap();
        assert_eq!(cache.base(), dir.path().join("pecs").join("indexes"));
        assert_eq!(cache.max_age_hours(), 12);

        match previous {
            Some(value) => std::env::set_var("XDG_CACHE_HOME", value),
            None => std::env::remove_var("XDG_CACHE_HOME"),
        }
    }
}
