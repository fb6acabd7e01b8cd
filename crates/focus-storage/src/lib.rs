pub mod db;
pub mod migrations;
pub mod models;

pub use db::Database;
pub use models::{
    normalize_apps, word_count, FailureDetails, FailureKind, FailureLog, FocusSession,
    NewFocusSession, PatchOutcome, SessionPatch, SessionStatus,
};
