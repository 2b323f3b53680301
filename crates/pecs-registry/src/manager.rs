//! Installed plugin management.
//!
//! The [`Manager`] keeps track of installed plugins in a TOML state file,
//! registers them with the Portmaster and periodically refetches the plugin
//! repositories to detect available updates.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::fsutil;
use crate::installer::{InstallError, Installer};
use crate::registry::{Registry, RegistryError};
use crate::types::{AvailableUpdate, InstalledPlugin, InstalledPluginsFile, PluginConfig, PluginDesc};
use crate::FORMAT_VERSION;

/// Default interval between two repository fetches.
pub const DEFAULT_FETCH_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// File mode of the state file.
const STATE_FILE_MODE: u32 = 0o444;

/// Error returned by a [`PluginHost`].
pub type HostError = Box<dyn std::error::Error + Send + Sync>;

/// Errors from manager operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("unknown plugin {0:?}")]
    UnknownPlugin(String),

    #[error("failed to install: {0}")]
    Install(#[from] InstallError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("failed to read state file '{}': {source}", path.display())]
    StateRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse state file '{}': {source}", path.display())]
    StateParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("unsupported installed plugins file format {0:?}")]
    UnsupportedStateVersion(String),

    #[error("failed to update state file '{}': {source}", path.display())]
    StateWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to encode state file: {0}")]
    StateEncode(#[from] toml::ser::Error),

    #[error("failed to register plugin {plugin} in Portmaster: {source}")]
    Host { plugin: String, source: HostError },

    #[error("failed to register plugins: {}", .0.join("; "))]
    Registration(Vec<String>),
}

pub type ManagerResult<T> = Result<T, ManagerError>;

/// Source of available plugins. Implemented by [`Registry`].
#[async_trait]
pub trait PluginProvider: Send + Sync + fmt::Debug {
    async fn fetch(&self) -> Result<(), RegistryError>;

    async fn by_name(&self, name: &str) -> Option<PluginDesc>;

    async fn update_available(&self, name: &str, current: &str)
        -> Result<Option<String>, RegistryError>;
}

#[async_trait]
impl PluginProvider for Registry {
    async fn fetch(&self) -> Result<(), RegistryError> {
        Registry::fetch(self).await
    }

    async fn by_name(&self, name: &str) -> Option<PluginDesc> {
        Registry::by_name(self, name).await
    }

    async fn update_available(
        &self,
        name: &str,
        current: &str,
    ) -> Result<Option<String>, RegistryError> {
        Registry::update_available(self, name, current).await
    }
}

/// The Portmaster side of plugin registration.
#[async_trait]
pub trait PluginHost: Send + Sync + fmt::Debug {
    async fn register_plugin(&self, config: PluginConfig) -> Result<(), HostError>;
}

type FetchDoneFn = Arc<dyn Fn(Option<&RegistryError>) + Send + Sync>;
type UpdateAvailableFn = Arc<dyn Fn(&[AvailableUpdate]) + Send + Sync>;

#[derive(Default)]
struct ManagerState {
    started: bool,
    installed: Vec<InstalledPlugin>,
    on_fetch_done: Vec<FetchDoneFn>,
    on_update_available: Vec<UpdateAvailableFn>,
}

/// Manages installed plugins.
pub struct Manager {
    state_file: PathBuf,
    installer: Arc<dyn Installer>,
    provider: Arc<dyn PluginProvider>,
    host: Arc<dyn PluginHost>,
    fetch_interval: Duration,
    state: RwLock<ManagerState>,
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("state_file", &self.state_file)
            .field("installer", &self.installer)
            .field("provider", &self.provider)
            .field("host", &self.host)
            .field("fetch_interval", &self.fetch_interval)
            .finish_non_exhaustive()
    }
}

impl Manager {
    pub fn new(
        state_file: impl Into<PathBuf>,
        installer: Arc<dyn Installer>,
        provider: Arc<dyn PluginProvider>,
        host: Arc<dyn PluginHost>,
    ) -> Self {
        Self {
            state_file: state_file.into(),
            installer,
            provider,
            host,
            fetch_interval: DEFAULT_FETCH_INTERVAL,
            state: RwLock::new(ManagerState::default()),
        }
    }

    pub fn with_fetch_interval(mut self, interval: Duration) -> Self {
        self.fetch_interval = interval;
        self
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    /// Register a callback invoked after every repository fetch with the
    /// fetch error, if any.
    pub async fn on_fetch_done(&self, f: impl Fn(Option<&RegistryError>) + Send + Sync + 'static) {
        self.state.write().await.on_fetch_done.push(Arc::new(f));
    }

    /// Register a callback invoked when updates are available. Only fired
    /// after a successful fetch.
    pub async fn on_update_available(&self, f: impl Fn(&[AvailableUpdate]) + Send + Sync + 'static) {
        self.state.write().await.on_update_available.push(Arc::new(f));
    }

    /// Load the state file without registering plugins or fetching.
    /// One-shot operations call this before [`Manager::install_plugin`] so
    /// existing entries are kept.
    pub async fn load_state(&self) -> ManagerResult<()> {
        let installed = load_state_file(&self.state_file)?;
        self.state.write().await.installed = installed;
        Ok(())
    }

    pub async fn installed_plugins(&self) -> Vec<InstalledPlugin> {
        self.state.read().await.installed.clone()
    }

    /// Start the manager.
    ///
    /// Loads the state file, registers all installed plugins with the host
    /// and fetches the repositories. A background task then refetches every
    /// fetch interval until `cancel` fires. Calling `start` again is a no-op.
    pub async fn start(self: &Arc<Self>, cancel: CancellationToken) -> ManagerResult<()> {
        {
            let mut state = self.state.write().await;
            if state.started {
                return Ok(());
            }
            state.started = true;

            state.installed = load_state_file(&self.state_file)?;
            tracing::info!(
                state_file = %self.state_file.display(),
                installed = state.installed.len(),
                "Loaded installed plugins"
            );

            self.register_all(&state.installed).await?;
        }

        self.provider.fetch().await?;

        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.run(cancel).await });

        Ok(())
    }

    async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.fetch_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; the initial fetch already happened.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!("Plugin manager stopped");
                    return;
                }
                _ = ticker.tick() => self.refresh().await,
            }
        }
    }

    async fn register_all(&self, installed: &[InstalledPlugin]) -> ManagerResult<()> {
        let mut errors = Vec::new();
        for plg in installed {
            let config = PluginConfig::for_plugin(&plg.plugin, true);
            if let Err(err) = self.host.register_plugin(config).await {
                errors.push(format!("plugin {}: failed to register: {err}", plg.plugin.name));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ManagerError::Registration(errors))
        }
    }

    /// Refetch the repositories and run the registered callbacks.
    pub async fn refresh(&self) {
        let result = self.provider.fetch().await;
        if let Err(err) = &result {
            tracing::warn!(error = %err, "Failed to fetch plugin repositories");
        }

        let (fetch_done, update_available) = {
            let state = self.state.read().await;
            (state.on_fetch_done.clone(), state.on_update_available.clone())
        };

        for cb in &fetch_done {
            cb(result.as_ref().err());
        }

        if result.is_err() {
            return;
        }

        let updates = self.available_updates().await;
        if !updates.is_empty() {
            tracing::info!(updates = updates.len(), "Plugin updates available");
            for cb in &update_available {
                cb(updates.as_slice());
            }
        }
    }

    /// Compare each installed plugin with the provider. Plugins that cannot
    /// be checked are logged and skipped.
    pub async fn available_updates(&self) -> Vec<AvailableUpdate> {
        let installed = self.installed_plugins().await;

        let mut updates = Vec::new();
        for plg in installed {
            let name = &plg.plugin.name;
            let current = &plg.plugin.version;
            match self.provider.update_available(name, current).await {
                Ok(Some(new_version)) => updates.push(AvailableUpdate {
                    name: name.clone(),
                    current_version: current.clone(),
                    new_version,
                }),
                Ok(None) => {}
                Err(err) => {
                    tracing::error!(plugin = %name, error = %err, "Failed to check for available updates");
                }
            }
        }
        updates
    }

    /// Install a plugin, record it in the state file and register it with
    /// the Portmaster. Returns the path of the installed binary.
    pub async fn install_plugin(&self, name: &str) -> ManagerResult<PathBuf> {
        let plugin = self
            .provider
            .by_name(name)
            .await
            .ok_or_else(|| ManagerError::UnknownPlugin(name.to_string()))?;

        let path = self.installer.install_plugin(&plugin).await?;

        {
            let mut state = self.state.write().await;
            state.installed.retain(|p| p.plugin.name != plugin.name);
            state.installed.push(InstalledPlugin {
                plugin: plugin.clone(),
                path: path.clone(),
            });
            save_state_file(&self.state_file, &state.installed)?;
        }

        self.host
            .register_plugin(PluginConfig::for_plugin(&plugin, true))
            .await
            .map_err(|source| ManagerError::Host {
                plugin: plugin.name.clone(),
                source,
            })?;

        tracing::info!(plugin = %plugin.name, version = %plugin.version, path = %path.display(), "Plugin installed and registered");
        Ok(path)
    }
}

/// Load installed plugins from a state file. A missing file yields an empty list.
pub fn load_state_file(path: &Path) -> ManagerResult<Vec<InstalledPlugin>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(ManagerError::StateRead {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let file: InstalledPluginsFile =
        toml::from_str(&content).map_err(|source| ManagerError::StateParse {
            path: path.to_path_buf(),
            source,
        })?;

    if file.version != FORMAT_VERSION {
        return Err(ManagerError::UnsupportedStateVersion(file.version));
    }

    Ok(file.plugins)
}

fn save_state_file(path: &Path, installed: &[InstalledPlugin]) -> ManagerResult<()> {
    let file = InstalledPluginsFile {
        version: FORMAT_VERSION.to_string(),
        plugins: installed.to_vec(),
    };
    let content = toml::to_string_pretty(&file)?;

    fsutil::write_atomic(path, content.as_bytes(), STATE_FILE_MODE).map_err(|source| {
        ManagerError::StateWrite {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installer::InstallResult;
    use crate::source::SourceError;
    use crate::types::PluginType;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct FakeProvider {
        plugins: Mutex<HashMap<String, PluginDesc>>,
        fetches: AtomicUsize,
        fail: AtomicBool,
    }

    impl FakeProvider {
        fn with_plugin(plugin: PluginDesc) -> Self {
            let provider = Self::default();
            provider
                .plugins
                .lock()
                .unwrap()
                .insert(plugin.name.clone(), plugin);
            provider
        }
    }

    #[async_trait]
    impl PluginProvider for FakeProvider {
        async fn fetch(&self) -> Result<(), RegistryError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(RegistryError::Fetch {
                    location: "https://example.com/index.yaml".to_string(),
                    source: SourceError::InvalidLocation("offline".to_string()),
                });
            }
            Ok(())
        }

        async fn by_name(&self, name: &str) -> Option<PluginDesc> {
            self.plugins.lock().unwrap().get(name).cloned()
        }

        async fn update_available(
            &self,
            name: &str,
            current: &str,
        ) -> Result<Option<String>, RegistryError> {
            let plg = self
                .by_name(name)
                .await
                .ok_or_else(|| RegistryError::UnknownPlugin(name.to_string()))?;
            let newer = crate::types::parse_version(&plg.version).unwrap()
                > crate::types::parse_version(current).unwrap();
            Ok(newer.then_some(plg.version))
        }
    }

    #[derive(Debug)]
    struct FakeInstaller {
        dir: PathBuf,
    }

    #[async_trait]
    impl Installer for FakeInstaller {
        async fn install_plugin(&self, plugin: &PluginDesc) -> InstallResult<PathBuf> {
            let path = self.dir.join(format!("{}-{}", plugin.name, plugin.version));
            std::fs::write(&path, "binary").unwrap();
            Ok(path)
        }
    }

    #[derive(Debug, Default)]
    struct RecordingHost {
        registered: Mutex<Vec<PluginConfig>>,
        reject: bool,
    }

    #[async_trait]
    impl PluginHost for RecordingHost {
        async fn register_plugin(&self, config: PluginConfig) -> Result<(), HostError> {
            if self.reject {
                return Err("portmaster unavailable".into());
            }
            self.registered.lock().unwrap().push(config);
            Ok(())
        }
    }

    fn plugin(name: &str, version: &str) -> PluginDesc {
        PluginDesc {
            name: name.to_string(),
            version: version.to_string(),
            plugin_types: vec![PluginType::Decider],
            privileged: true,
            ..Default::default()
        }
    }

    fn manager(
        dir: &Path,
        provider: Arc<FakeProvider>,
        host: Arc<RecordingHost>,
    ) -> Arc<Manager> {
        Arc::new(Manager::new(
            dir.join("state.toml"),
            Arc::new(FakeInstaller {
                dir: dir.to_path_buf(),
            }),
            provider,
            host,
        ))
    }

    #[tokio::test]
    async fn test_install_plugin_saves_state_and_registers() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::with_plugin(plugin("ipinfo", "v1.0.0")));
        let host = Arc::new(RecordingHost::default());
        let mng = manager(dir.path(), provider, host.clone());

        let path = mng.install_plugin("ipinfo").await.unwrap();
        assert_eq!(path, dir.path().join("ipinfo-v1.0.0"));

        let installed = mng.installed_plugins().await;
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].path, path);

        let registered = host.registered.lock().unwrap().clone();
        assert_eq!(registered.len(), 1);
        assert!(registered[0].disable_autostart);
        assert!(registered[0].privileged);

        let on_disk = load_state_file(&dir.path().join("state.toml")).unwrap();
        assert_eq!(on_disk, installed);
    }

    #[tokio::test]
    async fn test_reinstall_replaces_state_entry() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::with_plugin(plugin("ipinfo", "v1.0.0")));
        let host = Arc::new(RecordingHost::default());
        let mng = manager(dir.path(), provider.clone(), host);

        mng.install_plugin("ipinfo").await.unwrap();
        provider
            .plugins
            .lock()
            .unwrap()
            .insert("ipinfo".to_string(), plugin("ipinfo", "v1.1.0"));
        mng.install_plugin("ipinfo").await.unwrap();

        let installed = mng.installed_plugins().await;
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].plugin.version, "v1.1.0");
    }

    #[tokio::test]
    async fn test_load_state_keeps_existing_entries_on_install() {
        let dir = tempfile::tempdir().unwrap();
        let existing = vec![InstalledPlugin {
            plugin: plugin("blocklist", "1.0.0"),
            path: dir.path().join("blocklist-1.0.0"),
        }];
        save_state_file(&dir.path().join("state.toml"), &existing).unwrap();

        let host = Arc::new(RecordingHost::default());
        let mng = manager(
            dir.path(),
            Arc::new(FakeProvider::with_plugin(plugin("ipinfo", "1.0.0"))),
            host.clone(),
        );
        mng.load_state().await.unwrap();
        // Loading alone registers nothing.
        assert!(host.registered.lock().unwrap().is_empty());

        mng.install_plugin("ipinfo").await.unwrap();
        let on_disk = load_state_file(&dir.path().join("state.toml")).unwrap();
        let names: Vec<_> = on_disk.iter().map(|p| p.plugin.name.as_str()).collect();
        assert_eq!(names, vec!["blocklist", "ipinfo"]);
    }

    #[tokio::test]
    async fn test_install_unknown_plugin() {
        let dir = tempfile::tempdir().unwrap();
        let mng = manager(
            dir.path(),
            Arc::new(FakeProvider::default()),
            Arc::new(RecordingHost::default()),
        );
        assert!(matches!(
            mng.install_plugin("missing").await,
            Err(ManagerError::UnknownPlugin(ref name)) if name == "missing"
        ));
        assert!(!dir.path().join("state.toml").exists());
    }

    #[tokio::test]
    async fn test_install_reports_host_failure() {
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(RecordingHost {
            reject: true,
            ..Default::default()
        });
        let mng = manager(
            dir.path(),
            Arc::new(FakeProvider::with_plugin(plugin("ipinfo", "1.0.0"))),
            host,
        );
        let err = mng.install_plugin("ipinfo").await.unwrap_err();
        assert!(matches!(err, ManagerError::Host { .. }));
        // The plugin is installed and recorded even though registration failed.
        assert_eq!(mng.installed_plugins().await.len(), 1);
    }

    #[tokio::test]
    async fn test_start_loads_state_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let installed = vec![InstalledPlugin {
            plugin: plugin("ipinfo", "v1.0.0"),
            path: dir.path().join("ipinfo-v1.0.0"),
        }];
        save_state_file(&dir.path().join("state.toml"), &installed).unwrap();

        let provider = Arc::new(FakeProvider::with_plugin(plugin("ipinfo", "v1.0.0")));
        let host = Arc::new(RecordingHost::default());
        let mng = manager(dir.path(), provider.clone(), host.clone());

        let cancel = CancellationToken::new();
        mng.start(cancel.clone()).await.unwrap();
        mng.start(cancel.clone()).await.unwrap();
        cancel.cancel();

        assert_eq!(mng.installed_plugins().await, installed);
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(host.registered.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_start_rejects_unknown_state_version() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("state.toml"), "version = \"v0.9.0\"\n").unwrap();

        let mng = manager(
            dir.path(),
            Arc::new(FakeProvider::default()),
            Arc::new(RecordingHost::default()),
        );
        let err = mng.start(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ManagerError::UnsupportedStateVersion(ref v) if v == "v0.9.0"));
    }

    #[tokio::test]
    async fn test_start_collects_registration_errors() {
        let dir = tempfile::tempdir().unwrap();
        let installed = vec![
            InstalledPlugin {
                plugin: plugin("a", "1.0.0"),
                path: dir.path().join("a"),
            },
            InstalledPlugin {
                plugin: plugin("b", "1.0.0"),
                path: dir.path().join("b"),
            },
        ];
        save_state_file(&dir.path().join("state.toml"), &installed).unwrap();

        let host = Arc::new(RecordingHost {
            reject: true,
            ..Default::default()
        });
        let mng = manager(dir.path(), Arc::new(FakeProvider::default()), host);
        match mng.start(CancellationToken::new()).await {
            Err(ManagerError::Registration(errors)) => {
                assert_eq!(errors.len(), 2);
                assert!(errors[0].starts_with("plugin a: failed to register"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_refresh_runs_callbacks() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::with_plugin(plugin("ipinfo", "v1.0.0")));
        let mng = manager(dir.path(), provider.clone(), Arc::new(RecordingHost::default()));
        mng.install_plugin("ipinfo").await.unwrap();

        let fetch_results = Arc::new(Mutex::new(Vec::new()));
        let seen_updates = Arc::new(Mutex::new(Vec::new()));
        {
            let fetch_results = fetch_results.clone();
            mng.on_fetch_done(move |err| fetch_results.lock().unwrap().push(err.is_some()))
                .await;
            let seen_updates = seen_updates.clone();
            mng.on_update_available(move |updates| {
                seen_updates.lock().unwrap().extend_from_slice(updates)
            })
            .await;
        }

        // Nothing newer yet
        mng.refresh().await;
        assert!(seen_updates.lock().unwrap().is_empty());

        provider
            .plugins
            .lock()
            .unwrap()
            .insert("ipinfo".to_string(), plugin("ipinfo", "v1.2.0"));
        mng.refresh().await;
        assert_eq!(
            seen_updates.lock().unwrap().clone(),
            vec![AvailableUpdate {
                name: "ipinfo".to_string(),
                current_version: "v1.0.0".to_string(),
                new_version: "v1.2.0".to_string(),
            }]
        );

        provider.fail.store(true, Ordering::SeqCst);
        mng.refresh().await;
        assert_eq!(*fetch_results.lock().unwrap(), vec![false, false, true]);
        assert_eq!(seen_updates.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_background_refresh_keeps_ticking_until_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::default());
        let mng = Arc::new(
            Manager::new(
                dir.path().join("state.toml"),
                Arc::new(FakeInstaller {
                    dir: dir.path().to_path_buf(),
                }),
                provider.clone(),
                Arc::new(RecordingHost::default()),
            )
            .with_fetch_interval(Duration::from_millis(10)),
        );

        let cancel = CancellationToken::new();
        mng.start(cancel.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        let fetches = provider.fetches.load(Ordering::SeqCst);
        assert!(fetches >= 3, "expected repeated fetches, got {fetches}");

        tokio::time::sleep(Duration::from_millis(50)).await;
        let after_cancel = provider.fetches.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(provider.fetches.load(Ordering::SeqCst), after_cancel);
    }

    #[test]
    fn test_missing_state_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_state_file(&dir.path().join("none.toml"))
            .unwrap()
            .is_empty());
    }
}
