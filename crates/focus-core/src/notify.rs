use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// User-facing event worth a push or local notification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    SessionStarted,
    SessionCompleted,
    SessionFailed,
    SessionCancelled,
    FailureLogged,
    /// The user used up their unlock attempts
    UnlockAttemptsExhausted,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SessionStarted => write!(f, "session_started"),
            Self::SessionCompleted => write!(f, "session_completed"),
            Self::SessionFailed => write!(f, "session_failed"),
            Self::SessionCancelled => write!(f, "session_cancelled"),
            Self::FailureLogged => write!(f, "failure_logged"),
            Self::UnlockAttemptsExhausted => write!(f, "unlock_attempts_exhausted"),
        }
    }
}

/// Fire-and-forget delivery; implementations must not block or fail the caller
pub trait Notifier: Send + Sync {
    fn notify(&self, user_id: &str, kind: NotificationKind, payload: serde_json::Value);
}

/// Writes notifications to the log, the default when no push service is wired up
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, user_id: &str, kind: NotificationKind, payload: serde_json::Value) {
        log::info!("notify {user_id} {kind}: {payload}");
    }
}

/// Notification captured by [`RecordingNotifier`]
#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub user_id: String,
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
}

/// Keeps every notification in memory
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// Kinds in delivery order
    #[must_use]
    pub fn kinds(&self) -> Vec<NotificationKind> {
        self.sent().into_iter().map(|n| n.kind).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, user_id: &str, kind: NotificationKind, payload: serde_json::Value) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentNotification {
                user_id: user_id.to_string(),
                kind,
                payload,
            });
        }
    }
}
