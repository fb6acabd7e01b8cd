//! Authoritative record of which apps each user has blocked.
//!
//! The enforcer owns intent, the [`PlatformRestriction`] backend owns
//! enforcement. A lock is only committed after the platform accepted it, so
//! the enforcer never reports a restriction that nothing is enforcing.
//!
//! The platform keeps one device-wide set. An app leaves it only when no
//! locked user still lists it, and every platform change runs under one
//! shared gate so two users never interleave their diffs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::config::FocusConfig;
use crate::error::{FocusError, FocusResult};
use crate::platform::PlatformRestriction;
use crate::user_locks::UserLocks;

/// Per-user restriction snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestrictionState {
    pub locked: bool,
    /// Non-empty only while locked
    pub blocked_apps: BTreeSet<String>,
    /// Owning session; set only while locked
    pub session_id: Option<Uuid>,
    pub lock_started_at: Option<DateTime<Utc>>,
    pub unlock_attempts: u32,
    pub max_unlock_attempts: u32,
}

impl RestrictionState {
    #[must_use]
    pub const fn unlocked(max_unlock_attempts: u32) -> Self {
        Self {
            locked: false,
            blocked_apps: BTreeSet::new(),
            session_id: None,
            lock_started_at: None,
            unlock_attempts: 0,
            max_unlock_attempts,
        }
    }

    #[must_use]
    pub const fn remaining_attempts(&self) -> u32 {
        self.max_unlock_attempts.saturating_sub(self.unlock_attempts)
    }

    #[must_use]
    pub fn is_blocked(&self, app: &str) -> bool {
        self.locked && self.blocked_apps.contains(app)
    }
}

pub struct RestrictionEnforcer {
    platform: Arc<dyn PlatformRestriction>,
    states: Mutex<HashMap<String, RestrictionState>>,
    gates: UserLocks,
    platform_gate: AsyncMutex<()>,
    max_unlock_attempts: u32,
    platform_timeout: Duration,
}

impl RestrictionEnforcer {
    #[must_use]
    pub fn new(platform: Arc<dyn PlatformRestriction>, config: &FocusConfig) -> Self {
        Self {
            platform,
            states: Mutex::new(HashMap::new()),
            gates: UserLocks::new(),
            platform_gate: AsyncMutex::new(()),
            max_unlock_attempts: config.max_unlock_attempts,
            platform_timeout: config.platform_timeout(),
        }
    }

    /// Block `apps` for `user_id` on behalf of `session_id`
    ///
    /// Re-locking by the owning session replaces the app set: newly listed apps
    /// are blocked, dropped ones unblocked. The unlock-attempt counter restarts.
    ///
    /// # Errors
    ///
    /// - [`FocusError::Ownership`] if another session holds the user's lock
    /// - [`FocusError::Lock`] if the platform refused or timed out; state is unchanged
    pub async fn lock(&self, user_id: &str, apps: &[String], session_id: Uuid) -> FocusResult<()> {
        let _gate = self.gates.acquire(user_id).await;
        let current = self.state(user_id);

        if let Some(holder) = current.session_id.filter(|holder| *holder != session_id) {
            return Err(FocusError::Ownership {
                user_id: user_id.to_string(),
                holder,
                requested: session_id,
            });
        }

        let requested: BTreeSet<String> = focus_storage::normalize_apps(apps).into_iter().collect();
        let _platform = self.platform_gate.lock().await;
        let held = self.held_by_others(user_id);
        let to_block: Vec<String> = requested.difference(&current.blocked_apps).cloned().collect();
        let to_unblock: Vec<String> = current
            .blocked_apps
            .difference(&requested)
            .filter(|app| !held.contains(*app))
            .cloned()
            .collect();

        if !to_block.is_empty() {
            self.platform_block(&to_block, &held).await?;
        }
        if !to_unblock.is_empty() {
            self.platform_unblock(user_id, &to_unblock).await;
        }

        let count = requested.len();
        let lock_started_at = if current.locked {
            current.lock_started_at
        } else {
            Some(Utc::now())
        };

        self.states().insert(
            user_id.to_string(),
            RestrictionState {
                locked: true,
                blocked_apps: requested,
                session_id: Some(session_id),
                lock_started_at,
                unlock_attempts: 0,
                max_unlock_attempts: self.max_unlock_attempts,
            },
        );

        log::info!(
            "Locked {count} apps for {user_id} (session {session_id}, via {})",
            self.platform.name()
        );
        Ok(())
    }

    /// Clear every restriction of `user_id`
    ///
    /// Always succeeds. Returns whether anything was locked. A platform failure
    /// while unblocking is logged; the recorded state is cleared regardless.
    pub async fn unlock(&self, user_id: &str) -> bool {
        let _gate = self.gates.acquire(user_id).await;
        let _platform = self.platform_gate.lock().await;
        let previous = self.states().remove(user_id);

        let Some(previous) = previous.filter(|state| state.locked) else {
            log::debug!("Unlock for {user_id}: nothing locked");
            return false;
        };

        let held = self.held_by_others(user_id);
        let released = previous.blocked_apps.len();
        let apps: Vec<String> = previous
            .blocked_apps
            .into_iter()
            .filter(|app| !held.contains(app))
            .collect();
        if !apps.is_empty() {
            self.platform_unblock(user_id, &apps).await;
        }

        log::info!(
            "Unlocked {released} apps for {user_id} (session {:?}, {} still held by others)",
            previous.session_id,
            released - apps.len()
        );
        true
    }

    /// True iff the user is locked and `app` is in the blocked set
    #[must_use]
    pub fn is_blocked(&self, user_id: &str, app: &str) -> bool {
        self.states()
            .get(user_id)
            .is_some_and(|state| state.is_blocked(app))
    }

    /// Count a bypass attempt and return how many remain
    ///
    /// Reaching zero is only reported; escalation is the caller's decision.
    pub fn record_unlock_attempt(&self, user_id: &str) -> u32 {
        let max = self.max_unlock_attempts;
        let mut states = self.states();
        let state = states
            .entry(user_id.to_string())
            .or_insert_with(|| RestrictionState::unlocked(max));
        state.unlock_attempts = state.unlock_attempts.saturating_add(1);
        let remaining = state.remaining_attempts();

        if remaining == 0 {
            log::warn!(
                "{user_id} has used all {max} unlock attempts ({} recorded)",
                state.unlock_attempts
            );
        } else {
            log::debug!("{user_id} unlock attempt, {remaining} left");
        }
        remaining
    }

    /// Zero the attempt counter without touching the lock
    pub fn reset_unlock_attempts(&self, user_id: &str) {
        self.restore_unlock_attempts(user_id, 0);
    }

    /// Put back an attempt count recorded before a restart
    ///
    /// Only applies while the user is locked.
    pub fn restore_unlock_attempts(&self, user_id: &str, attempts: u32) {
        if let Some(state) = self.states().get_mut(user_id).filter(|state| state.locked) {
            state.unlock_attempts = attempts;
        }
    }

    /// Current state of `user_id`; unlocked if never seen
    #[must_use]
    pub fn state(&self, user_id: &str) -> RestrictionState {
        self.states()
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| RestrictionState::unlocked(self.max_unlock_attempts))
    }

    /// Ask the platform directly, to spot drift from the recorded state
    ///
    /// # Errors
    ///
    /// Returns [`FocusError::Lock`] if the platform query fails
    pub async fn platform_is_blocked(&self, app: &str) -> FocusResult<bool> {
        self.platform
            .is_blocked(app)
            .await
            .map_err(|e| FocusError::Lock(format!("{e:#}")))
    }

    #[must_use]
    pub fn platform_name(&self) -> &'static str {
        self.platform.name()
    }

    fn states(&self) -> MutexGuard<'_, HashMap<String, RestrictionState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apps another locked user still needs
    fn held_by_others(&self, user_id: &str) -> BTreeSet<String> {
        self.states()
            .iter()
            .filter(|(user, state)| user.as_str() != user_id && state.locked)
            .flat_map(|(_, state)| state.blocked_apps.iter().cloned())
            .collect()
    }

    async fn platform_block(&self, apps: &[String], held: &BTreeSet<String>) -> FocusResult<()> {
        match tokio::time::timeout(self.platform_timeout, self.platform.block(apps)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(FocusError::Lock(format!("{e:#}"))),
            Err(_) => {
                // The call may have landed after we gave up
                let undo: Vec<String> =
                    apps.iter().filter(|app| !held.contains(*app)).cloned().collect();
                match tokio::time::timeout(self.platform_timeout, self.platform.unblock(&undo)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => log::warn!("Compensating unblock after timeout failed: {e:#}"),
                    Err(_) => log::warn!(
                        "Compensating unblock after timeout gave up after {:?}",
                        self.platform_timeout
                    ),
                }
                Err(FocusError::Lock(format!(
                    "{} did not confirm blocking within {:?}",
                    self.platform.name(),
                    self.platform_timeout
                )))
            }
        }
    }

    async fn platform_unblock(&self, user_id: &str, apps: &[String]) {
        match tokio::time::timeout(self.platform_timeout, self.platform.unblock(apps)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("Failed to unblock {apps:?} for {user_id}: {e:#}"),
            Err(_) => log::error!(
                "Unblocking {apps:?} for {user_id} timed out after {:?}",
                self.platform_timeout
            ),
        }
    }
}
