//! User notifications for the plugin manager.
//!
//! [`NotificationHandler`] turns manager callbacks into notifications: a
//! persistent "running" notice, a fetch-failure error that is cleared again
//! once fetching succeeds, and one notification per available update.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::manager::{HostError, Manager};
use crate::registry::RegistryError;
use crate::types::AvailableUpdate;

pub const PERSISTENT_EVENT_ID: &str = "plugin-registry:persistent-notification";
pub const FETCH_FAILED_EVENT_ID: &str = "plugin-registry:fetch-failed";
const UPDATE_EVENT_PREFIX: &str = "plugin-registry:update-";
const PROJECT_URL: &str = "https://github.com/ppacher/portmaster-plugin-registry";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Error,
}

/// A button attached to a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationAction {
    pub id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_url: Option<String>,
}

impl NotificationAction {
    fn new(id: &str, text: &str) -> Self {
        Self {
            id: id.to_string(),
            text: text.to_string(),
            open_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Notifications with the same event ID replace each other.
    pub event_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub show_on_system: bool,
    pub actions: Vec<NotificationAction>,
    /// An expiry in the past clears a previous notification with the same ID.
    pub expires: Option<DateTime<Utc>>,
}

impl Notification {
    /// Whether this notification clears an existing one.
    pub fn is_expired(&self) -> bool {
        self.expires.is_some_and(|at| at <= Utc::now())
    }

    /// Persistent notice that the registry plugin is running.
    pub fn running() -> Self {
        Self {
            event_id: PERSISTENT_EVENT_ID.to_string(),
            kind: NotificationKind::Info,
            title: "PECS".to_string(),
            message: "PECS is successfully installed and running".to_string(),
            show_on_system: false,
            actions: vec![NotificationAction {
                open_url: Some(PROJECT_URL.to_string()),
                ..NotificationAction::new("open", "Open")
            }],
            expires: None,
        }
    }

    pub fn fetch_failed(err: &RegistryError) -> Self {
        Self {
            event_id: FETCH_FAILED_EVENT_ID.to_string(),
            kind: NotificationKind::Error,
            title: "Failed to fetch plugin repositories".to_string(),
            message: err.to_string(),
            show_on_system: false,
            actions: vec![NotificationAction::new("go-away", "OK")],
            expires: None,
        }
    }

    /// Clears a previous [`Notification::fetch_failed`].
    pub fn fetch_recovered() -> Self {
        Self {
            event_id: FETCH_FAILED_EVENT_ID.to_string(),
            kind: NotificationKind::Error,
            title: String::new(),
            message: String::new(),
            show_on_system: false,
            actions: Vec::new(),
            expires: Some(Utc::now() - Duration::seconds(1)),
        }
    }

    pub fn update_available(update: &AvailableUpdate) -> Self {
        Self {
            event_id: format!("{UPDATE_EVENT_PREFIX}{}", update.name),
            kind: NotificationKind::Info,
            title: format!(
                "{}: new version {} is available",
                update.name, update.new_version
            ),
            message: format!(
                "A new version for the plugin {} is available. Update to {} now?",
                update.name, update.new_version
            ),
            show_on_system: false,
            actions: vec![
                NotificationAction::new("update-now", "Update Now"),
                NotificationAction::new("not-now", "Later"),
            ],
            expires: None,
        }
    }
}

/// Delivers notifications to the user.
pub trait Notifier: Send + Sync + fmt::Debug {
    fn notify(&self, notification: Notification) -> Result<(), HostError>;
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) -> Result<(), HostError> {
        if notification.is_expired() {
            tracing::debug!(event_id = %notification.event_id, "Notification cleared");
            return Ok(());
        }

        match notification.kind {
            NotificationKind::Info => tracing::info!(
                event_id = %notification.event_id,
                title = %notification.title,
                "{}",
                notification.message
            ),
            NotificationKind::Error => tracing::error!(
                event_id = %notification.event_id,
                title = %notification.title,
                "{}",
                notification.message
            ),
        }
        Ok(())
    }
}

/// Connects manager events to a [`Notifier`].
#[derive(Debug)]
pub struct NotificationHandler;

impl NotificationHandler {
    /// Post the persistent notification and register the manager callbacks.
    pub async fn attach(manager: &Manager, notifier: Arc<dyn Notifier>) {
        deliver(notifier.as_ref(), Notification::running());

        let on_fetch = Arc::clone(&notifier);
        manager
            .on_fetch_done(move |err| {
                let notification = match err {
                    Some(err) => Notification::fetch_failed(err),
                    None => Notification::fetch_recovered(),
                };
                deliver(on_fetch.as_ref(), notification);
            })
            .await;

        manager
            .on_update_available(move |updates| {
                for update in updates {
                    deliver(notifier.as_ref(), Notification::update_available(update));
                }
            })
            .await;
    }
}

fn deliver(notifier: &dyn Notifier, notification: Notification) {
    let event_id = notification.event_id.clone();
    if let Err(err) = notifier.notify(notification) {
        tracing::error!(event_id = %event_id, error = %err, "Failed to create notification");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installer::{InstallResult, Installer};
    use crate::manager::{PluginHost, PluginProvider};
    use crate::source::SourceError;
    use crate::types::{PluginConfig, PluginDesc};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<Notification>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notification: Notification) -> Result<(), HostError> {
            self.sent.lock().unwrap().push(notification);
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct FlakyProvider {
        fail: AtomicBool,
    }

    #[async_trait]
    impl PluginProvider for FlakyProvider {
        async fn fetch(&self) -> Result<(), RegistryError> {
            if self.fail.load(Ordering::SeqCst) {
                Err(RegistryError::Fetch {
                    location: "https://example.com/index.yaml".to_string(),
                    source: SourceError::InvalidLocation("offline".to_string()),
                })
            } else {
                Ok(())
            }
        }

        async fn by_name(&self, _name: &str) -> Option<PluginDesc> {
            None
        }

        async fn update_available(
            &self,
            _name: &str,
            _current: &str,
        ) -> Result<Option<String>, RegistryError> {
            Ok(None)
        }
    }

    #[derive(Debug)]
    struct NoInstaller;

    #[async_trait]
    impl Installer for NoInstaller {
        async fn install_plugin(&self, _plugin: &PluginDesc) -> InstallResult<PathBuf> {
            Err(crate::installer::InstallError::NoMatchingArtifact)
        }
    }

    #[derive(Debug)]
    struct NoHost;

    #[async_trait]
    impl PluginHost for NoHost {
        async fn register_plugin(&self, _config: PluginConfig) -> Result<(), HostError> {
            Ok(())
        }
    }

    #[test]
    fn test_update_notification() {
        let n = Notification::update_available(&AvailableUpdate {
            name: "ipinfo".to_string(),
            current_version: "v1.0.0".to_string(),
            new_version: "v1.1.0".to_string(),
        });
        assert_eq!(n.event_id, "plugin-registry:update-ipinfo");
        assert_eq!(n.title, "ipinfo: new version v1.1.0 is available");
        assert_eq!(n.actions.len(), 2);
        assert!(!n.is_expired());
    }

    #[test]
    fn test_fetch_recovered_is_expired() {
        let n = Notification::fetch_recovered();
        assert_eq!(n.event_id, FETCH_FAILED_EVENT_ID);
        assert!(n.is_expired());
    }

    #[test]
    fn test_log_notifier_accepts_everything() {
        assert!(LogNotifier.notify(Notification::running()).is_ok());
        assert!(LogNotifier.notify(Notification::fetch_recovered()).is_ok());
    }

    #[tokio::test]
    async fn test_handler_tracks_fetch_state() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FlakyProvider::default());
        let manager = Manager::new(
            dir.path().join("state.toml"),
            Arc::new(NoInstaller),
            provider.clone(),
            Arc::new(NoHost),
        );
        let notifier = Arc::new(RecordingNotifier::default());
        NotificationHandler::attach(&manager, notifier.clone()).await;

        provider.fail.store(true, Ordering::SeqCst);
        manager.refresh().await;
        provider.fail.store(false, Ordering::SeqCst);
        manager.refresh().await;

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].event_id, PERSISTENT_EVENT_ID);
        assert_eq!(sent[1].kind, NotificationKind::Error);
        assert!(sent[1].message.contains("offline"));
        assert!(!sent[1].is_expired());
        assert_eq!(sent[2].event_id, FETCH_FAILED_EVENT_ID);
        assert!(sent[2].is_expired());
    }
}
