//! Wiring shared by every command: config, store, platform and controller.

use anyhow::{bail, Context, Result};
use focus_core::{
    create_platform, get_data_dir, FocusConfig, LogNotifier, PlatformRestriction,
    RestrictionEnforcer, SessionController, SqliteSessionStore,
};
use focus_storage::Database;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

pub struct AppContext {
    pub controller: SessionController,
    pub user_id: String,
}

impl AppContext {
    /// Build the controller and restore locks of sessions left active
    pub async fn open(user: Option<String>, config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => FocusConfig::load(path)?,
            None => FocusConfig::load_or_default()?,
        };
        Self::with_config(user, config, &get_data_dir()?).await
    }

    pub async fn with_config(user: Option<String>, config: FocusConfig, data_dir: &Path) -> Result<Self> {
        let db = Database::new(Some(config.database_path()?)).context("Failed to open database")?;
        let store = Arc::new(SqliteSessionStore::new(Arc::new(db)));
        let platform: Arc<dyn PlatformRestriction> = Arc::from(
            create_platform(&config, data_dir).context("Failed to set up app restrictions")?,
        );
        log::debug!("Using {} restriction backend", platform.name());

        let enforcer = Arc::new(RestrictionEnforcer::new(platform, &config));
        let controller = SessionController::new(store, enforcer, Arc::new(LogNotifier), config);

        let report = controller.reconcile().await?;
        if report.failed > 0 {
            log::warn!("{} active sessions could not be re-locked", report.failed);
        }

        Ok(Self {
            controller,
            user_id: resolve_user(user),
        })
    }

    /// Resolve a session argument: a full id, an id prefix, or the active session
    pub async fn resolve_session(&self, raw: Option<&str>) -> Result<Uuid> {
        let Some(raw) = raw else {
            return match self.controller.active_session(&self.user_id).await? {
                Some(session) => Ok(session.id),
                None => bail!("No active session for {}", self.user_id),
            };
        };

        if let Ok(id) = Uuid::parse_str(raw) {
            return Ok(id);
        }

        let matches: Vec<Uuid> = self
            .controller
            .history(&self.user_id, 500)
            .await?
            .into_iter()
            .map(|s| s.id)
            .filter(|id| id.to_string().starts_with(raw))
            .collect();
        match matches.as_slice() {
            [id] => Ok(*id),
            [] => bail!("No session matches '{raw}'"),
            _ => bail!("'{raw}' matches {} sessions, use a longer prefix", matches.len()),
        }
    }
}

/// `--user`, then `$FOCUS_USER`, then `$USER`
fn resolve_user(explicit: Option<String>) -> String {
    explicit
        .or_else(|| std::env::var("FOCUS_USER").ok())
        .or_else(|| std::env::var("USER").ok())
        .filter(|user| !user.trim().is_empty())
        .unwrap_or_else(|| "local".to_string())
}
