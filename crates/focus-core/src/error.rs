//! Error taxonomy surfaced across the core boundary.
//!
//! Every variant is recoverable. Transport and SQLite errors never escape
//! raw; they are folded into [`FocusError::Storage`] or [`FocusError::Lock`]
//! so callers can render a specific retry affordance.

use focus_storage::SessionStatus;
use thiserror::Error;
use uuid::Uuid;

pub type FocusResult<T> = Result<T, FocusError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FocusError {
    /// The user already has an active session
    #[error("user {user_id} already has an active session {session_id}")]
    Conflict { user_id: String, session_id: Uuid },

    #[error("focus session {0} not found")]
    NotFound(Uuid),

    /// The requested transition is not an edge of the state machine
    #[error("cannot {action} session {session_id} while it is {status}")]
    InvalidState {
        session_id: Uuid,
        status: SessionStatus,
        action: &'static str,
    },

    /// Focus time would go backwards
    #[error("progress for session {session_id} cannot go from {previous} to {requested} minutes")]
    InvalidProgress {
        session_id: Uuid,
        previous: u32,
        requested: u32,
    },

    /// The platform refused or failed to block the requested apps
    #[error("failed to lock apps: {0}")]
    Lock(String),

    /// Another session owns the user's lock
    #[error("lock for user {user_id} is held by session {holder}, not {requested}")]
    Ownership {
        user_id: String,
        holder: Uuid,
        requested: Uuid,
    },

    /// The session store failed or did not acknowledge a write in time
    #[error("session store error: {0}")]
    Storage(String),
}

impl FocusError {
    /// Stable discriminant for UI and logging
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Conflict { .. } => "conflict",
            Self::NotFound(_) => "not_found",
            Self::InvalidState { .. } => "invalid_state",
            Self::InvalidProgress { .. } => "invalid_progress",
            Self::Lock(_) => "lock",
            Self::Ownership { .. } => "ownership",
            Self::Storage(_) => "storage",
        }
    }

    /// Fold an application-layer store error into the taxonomy
    #[must_use]
    pub fn storage(err: &anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_discriminants() {
        let id = Uuid::new_v4();
        assert_eq!(FocusError::NotFound(id).kind(), "not_found");
        assert_eq!(FocusError::Lock("denied".into()).kind(), "lock");
        assert_eq!(
            FocusError::InvalidProgress {
                session_id: id,
                previous: 10,
                requested: 5
            }
            .kind(),
            "invalid_progress"
        );
    }

    #[test]
    fn test_storage_keeps_context_chain() {
        let err = anyhow::anyhow!("disk full").context("Failed to update session");
        let mapped = FocusError::storage(&err);
        assert_eq!(
            mapped,
            FocusError::Storage("Failed to update session: disk full".into())
        );
    }

    #[test]
    fn test_invalid_state_message() {
        let id = Uuid::nil();
        let err = FocusError::InvalidState {
            session_id: id,
            status: SessionStatus::Completed,
            action: "cancel",
        };
        assert_eq!(
            err.to_string(),
            format!("cannot cancel session {id} while it is completed")
        );
    }
}
