pub mod config;
pub mod controller;
pub mod enforcer;
pub mod error;
pub mod notify;
pub mod platform;
pub mod store;
pub mod user_locks;

pub use config::{get_data_dir, FocusConfig, PlatformKind};
pub use controller::{Outcome, ReconcileReport, SessionController};
pub use enforcer::{RestrictionEnforcer, RestrictionState};
pub use error::{FocusError, FocusResult};
pub use notify::{LogNotifier, NotificationKind, Notifier, RecordingNotifier};
pub use platform::{create_platform, PlatformRestriction};
pub use store::{MemorySessionStore, SessionStore, SqliteSessionStore};
