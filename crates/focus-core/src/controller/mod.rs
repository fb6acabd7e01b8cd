//! Focus session lifecycle.
//!
//! ```text
//! Scheduled --begin--> Active --end(success)--> Completed
//!     |                  |----end(failure)---> Failed
//!     '------cancel------'-------cancel------> Cancelled
//! ```
//!
//! The controller is the only writer of session status and timing. Every
//! mutation runs under the owner's [`UserLocks`] entry, and every write names
//! the status it was decided against, so the store rejects it when another
//! task or process moved the session first. The loser of such a race fails
//! with [`FocusError::InvalidState`].
//!
//! A write that outlives `store_timeout` is still awaited until the store
//! settles. Creations and `begin` that land late are cancelled again and
//! reported as storage failures; other late writes stand.

use chrono::{DateTime, Utc};
use focus_storage::{
    word_count, FailureDetails, FailureKind, FailureLog, FocusSession, NewFocusSession,
    PatchOutcome, SessionPatch, SessionStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::FocusConfig;
use crate::enforcer::{RestrictionEnforcer, RestrictionState};
use crate::error::{FocusError, FocusResult};
use crate::notify::{NotificationKind, Notifier};
use crate::store::SessionStore;
use crate::user_locks::UserLocks;


/// How an active session ended
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    const fn status(self) -> SessionStatus {
        match self {
            Self::Success => SessionStatus::Completed,
            Self::Failure => SessionStatus::Failed,
        }
    }
}

/// Result of rebuilding lock state from stored sessions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Locks re-created for active sessions
    pub restored: usize,
    /// Active sessions already matching the enforcer
    pub unchanged: usize,
    /// Sessions whose lock could not be restored
    pub failed: usize,
}

/// A settled store write, and whether it settled after `store_timeout`
enum Write<T> {
    Done(T),
    Late(T),
}

impl<T> Write<T> {
    const fn is_late(&self) -> bool {
        matches!(self, Self::Late(_))
    }

    fn into_inner(self) -> T {
        match self {
            Self::Done(value) | Self::Late(value) => value,
        }
    }
}

pub struct SessionController {
    store: Arc<dyn SessionStore>,
    enforcer: Arc<RestrictionEnforcer>,
    notifier: Arc<dyn Notifier>,
    users: UserLocks,
    config: FocusConfig,
}

impl SessionController {
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        enforcer: Arc<RestrictionEnforcer>,
        notifier: Arc<dyn Notifier>,
        config: FocusConfig,
    ) -> Self {
        Self {
            store,
            enforcer,
            notifier,
            users: UserLocks::new(),
            config,
        }
    }

    #[must_use]
    pub fn enforcer(&self) -> &RestrictionEnforcer {
        &self.enforcer
    }

    // ==================== Transitions ====================

    /// Create a session and start it right away
    ///
    /// Locks the session's apps before returning when app lock is enabled.
    ///
    /// # Errors
    ///
    /// - [`FocusError::Conflict`] if the user already has an active session
    /// - [`FocusError::Lock`] if the apps could not be locked; the session is
    ///   then cancelled so no active session exists without its lock
    /// - [`FocusError::Storage`] if the store fails or times out
    pub async fn start(&self, user_id: &str, request: NewFocusSession) -> FocusResult<FocusSession> {
        let _user = self.users.acquire(user_id).await;
        self.ensure_no_active(user_id).await?;

        let now = Utc::now();
        let written = self
            .store_write(
                "create session",
                self.store
                    .create_session(user_id, &request, SessionStatus::Active, Some(now)),
            )
            .await?;
        if written.is_late() {
            let session = written.into_inner();
            self.compensate_cancel(session.id, SessionStatus::Active).await;
            return Err(self.unacknowledged("create session"));
        }
        let session = written.into_inner();

        if session.wants_lock() {
            if let Err(err) = self
                .enforcer
                .lock(user_id, &session.app_restrictions, session.id)
                .await
            {
                log::warn!("Lock failed for new session {}, rolling back: {err}", session.id);
                self.compensate_cancel(session.id, SessionStatus::Active).await;
                return Err(as_lock_error(err));
            }
        }

        log::info!(
            "Started session {} for {user_id}: {} ({} min, {} apps locked)",
            session.id,
            session.title,
            session.duration_minutes,
            if session.wants_lock() { session.app_restrictions.len() } else { 0 }
        );
        self.notify_session(NotificationKind::SessionStarted, &session);
        Ok(session)
    }

    /// Create a session to be started later with [`Self::begin`]
    ///
    /// # Errors
    ///
    /// Returns [`FocusError::Storage`] if the store fails or times out
    pub async fn schedule(&self, user_id: &str, request: NewFocusSession) -> FocusResult<FocusSession> {
        let written = self
            .store_write(
                "schedule session",
                self.store
                    .create_session(user_id, &request, SessionStatus::Scheduled, None),
            )
            .await?;
        if written.is_late() {
            let session = written.into_inner();
            self.compensate_cancel(session.id, SessionStatus::Scheduled).await;
            return Err(self.unacknowledged("schedule session"));
        }
        let session = written.into_inner();
        log::info!(
            "Scheduled session {} for {user_id} at {:?}",
            session.id,
            session.scheduled_at
        );
        Ok(session)
    }

    /// Start a scheduled session
    ///
    /// # Errors
    ///
    /// - [`FocusError::NotFound`] / [`FocusError::InvalidState`] unless the session is scheduled
    /// - [`FocusError::Conflict`] if the owner already has an active session
    /// - [`FocusError::Lock`] if the apps could not be locked; the session stays scheduled
    /// - [`FocusError::Storage`] if the store fails or answers late; any lock
    ///   taken is released and a late activation is cancelled
    pub async fn begin(&self, session_id: Uuid) -> FocusResult<FocusSession> {
        let user_id = self.owner(session_id).await?;
        let _user = self.users.acquire(&user_id).await;

        let session = self.load(session_id).await?;
        require(&session, SessionStatus::Active, "begin")?;
        self.ensure_no_active(&user_id).await?;

        if session.wants_lock() {
            self.enforcer
                .lock(&user_id, &session.app_restrictions, session.id)
                .await
                .map_err(as_lock_error)?;
        }

        let patch = SessionPatch {
            status: Some(SessionStatus::Active),
            started_at: Some(Utc::now()),
            ..SessionPatch::default()
        };
        let written = match self.patch_session(&session, &patch, "begin").await {
            Ok(written) => written,
            Err(err) => {
                if session.wants_lock() {
                    self.enforcer.unlock(&user_id).await;
                }
                return Err(err);
            }
        };
        if written.is_late() {
            self.compensate_cancel(session_id, SessionStatus::Active).await;
            if session.wants_lock() {
                self.enforcer.unlock(&user_id).await;
            }
            return Err(self.unacknowledged("begin session"));
        }
        let session = written.into_inner();

        log::info!("Began scheduled session {session_id} for {user_id}");
        self.notify_session(NotificationKind::SessionStarted, &session);
        Ok(session)
    }

    /// Finish an active session and release its lock
    ///
    /// # Errors
    ///
    /// - [`FocusError::NotFound`] if the session does not exist
    /// - [`FocusError::InvalidState`] if it is not active, including when a
    ///   concurrent `end`/`cancel` got there first
    /// - [`FocusError::Storage`] if the store fails; the session stays active and locked.
    ///   A write acknowledged after `store_timeout` still counts as ended.
    pub async fn end(&self, session_id: Uuid, outcome: Outcome) -> FocusResult<FocusSession> {
        let user_id = self.owner(session_id).await?;
        let _user = self.users.acquire(&user_id).await;

        let session = self.load(session_id).await?;
        require(&session, outcome.status(), "end")?;
        self.finish_active(&session, outcome).await
    }

    /// Withdraw a scheduled or active session
    ///
    /// # Errors
    ///
    /// - [`FocusError::NotFound`] if the session does not exist
    /// - [`FocusError::InvalidState`] if it already reached a terminal status
    /// - [`FocusError::Storage`] if the store fails
    pub async fn cancel(&self, session_id: Uuid) -> FocusResult<FocusSession> {
        let user_id = self.owner(session_id).await?;
        let _user = self.users.acquire(&user_id).await;

        let session = self.load(session_id).await?;
        require(&session, SessionStatus::Cancelled, "cancel")?;
        let was_active = session.status == SessionStatus::Active;

        let now = Utc::now();
        let mut patch = SessionPatch::finish(SessionStatus::Cancelled, now);
        close_pause(&session, now, &mut patch);
        let session = self
            .patch_session(&session, &patch, "cancel")
            .await?
            .into_inner();

        if was_active {
            self.enforcer.unlock(&user_id).await;
        }

        log::info!("Cancelled session {session_id} for {user_id} (was active: {was_active})");
        self.notify_session(NotificationKind::SessionCancelled, &session);
        Ok(session)
    }

    /// Record accumulated focus time; it can only grow
    ///
    /// # Errors
    ///
    /// - [`FocusError::InvalidProgress`] if `focus_minutes` is below the recorded value
    /// - [`FocusError::NotFound`] / [`FocusError::InvalidState`] unless the session is active
    /// - [`FocusError::Storage`] if the store fails
    pub async fn update_progress(&self, session_id: Uuid, focus_minutes: u32) -> FocusResult<FocusSession> {
        let user_id = self.owner(session_id).await?;
        let _user = self.users.acquire(&user_id).await;

        let session = self.load(session_id).await?;
        require_active(&session, "update progress of")?;

        if focus_minutes < session.total_focus_minutes {
            return Err(FocusError::InvalidProgress {
                session_id,
                previous: session.total_focus_minutes,
                requested: focus_minutes,
            });
        }
        if focus_minutes == session.total_focus_minutes {
            return Ok(session);
        }

        let patch = SessionPatch::progress(focus_minutes);
        let session = self
            .patch_session(&session, &patch, "update progress of")
            .await?
            .into_inner();
        log::debug!("Session {session_id} progress: {focus_minutes} min");
        Ok(session)
    }

    /// Append a failure log; the session status is left alone
    ///
    /// # Errors
    ///
    /// - [`FocusError::NotFound`] if the session does not exist
    /// - [`FocusError::Storage`] if the store fails
    pub async fn record_failure(
        &self,
        session_id: Uuid,
        kind: FailureKind,
        details: FailureDetails,
    ) -> FocusResult<FailureLog> {
        let session = self.load(session_id).await?;
        let entry = details.into_log(&session.user_id, Some(session_id), kind);
        self.append_failure(&entry).await?;
        Ok(entry)
    }

    /// Pause an active session; apps stay locked
    ///
    /// # Errors
    ///
    /// - [`FocusError::InvalidState`] if the session is not active or already paused
    /// - [`FocusError::NotFound`] / [`FocusError::Storage`] as usual
    pub async fn pause(&self, session_id: Uuid) -> FocusResult<FocusSession> {
        let user_id = self.owner(session_id).await?;
        let _user = self.users.acquire(&user_id).await;

        let session = self.load(session_id).await?;
        require_active(&session, "pause")?;
        if session.is_paused() {
            return Err(invalid_state(&session, "pause"));
        }

        let patch = SessionPatch {
            paused_at: Some(Some(Utc::now())),
            ..SessionPatch::default()
        };
        let session = self.patch_session(&session, &patch, "pause").await?.into_inner();
        log::info!("Paused session {session_id}");
        Ok(session)
    }

    /// Resume a paused session, adding the pause to `paused_minutes`
    ///
    /// # Errors
    ///
    /// - [`FocusError::InvalidState`] if the session is not active or not paused
    /// - [`FocusError::NotFound`] / [`FocusError::Storage`] as usual
    pub async fn resume(&self, session_id: Uuid) -> FocusResult<FocusSession> {
        let user_id = self.owner(session_id).await?;
        let _user = self.users.acquire(&user_id).await;

        let session = self.load(session_id).await?;
        require_active(&session, "resume")?;
        if !session.is_paused() {
            return Err(invalid_state(&session, "resume"));
        }

        let mut patch = SessionPatch::default();
        close_pause(&session, Utc::now(), &mut patch);
        let session = self.patch_session(&session, &patch, "resume").await?.into_inner();
        log::info!(
            "Resumed session {session_id} ({} min paused in total)",
            session.paused_minutes
        );
        Ok(session)
    }

    /// Store the justification essay of an active session
    ///
    /// # Errors
    ///
    /// - [`FocusError::NotFound`] / [`FocusError::InvalidState`] unless the session is active
    /// - [`FocusError::Storage`] if the store fails
    pub async fn submit_essay(&self, session_id: Uuid, text: &str) -> FocusResult<FocusSession> {
        let user_id = self.owner(session_id).await?;
        let _user = self.users.acquire(&user_id).await;

        let session = self.load(session_id).await?;
        require_active(&session, "submit an essay for")?;

        let patch = SessionPatch {
            essay_content: Some(text.trim().to_string()),
            essay_word_count: Some(word_count(text)),
            ..SessionPatch::default()
        };
        let session = self
            .patch_session(&session, &patch, "submit an essay for")
            .await?
            .into_inner();
        log::debug!(
            "Essay for session {session_id}: {} words",
            session.essay_word_count
        );
        Ok(session)
    }

    /// Give up on an active session
    ///
    /// Ends it as failed and logs `session_abandoned`. When the session requires
    /// an essay and the submitted one is shorter than `min_essay_words`, an
    /// `essay_skipped` failure is logged as well.
    ///
    /// # Errors
    ///
    /// Same as [`Self::end`]. The session is already ended when a failure log
    /// write fails.
    pub async fn abandon(&self, session_id: Uuid) -> FocusResult<FocusSession> {
        let user_id = self.owner(session_id).await?;
        let _user = self.users.acquire(&user_id).await;

        let session = self.load(session_id).await?;
        require_active(&session, "abandon")?;

        let essay_skipped =
            session.essay_required && session.essay_word_count < self.config.min_essay_words;
        let focus_minutes = session.total_focus_minutes;
        let ended = self.finish_active(&session, Outcome::Failure).await?;

        let mut abandoned = FailureLog::new(&user_id, Some(session_id), FailureKind::SessionAbandoned);
        abandoned.metadata = json!({ "focus_minutes": focus_minutes });
        self.append_failure(&abandoned).await?;

        if essay_skipped {
            let mut skipped = FailureLog::new(&user_id, Some(session_id), FailureKind::EssaySkipped);
            skipped.metadata = json!({
                "word_count": ended.essay_word_count,
                "required_words": self.config.min_essay_words,
            });
            self.append_failure(&skipped).await?;
        }

        Ok(ended)
    }

    // ==================== Restrictions ====================

    /// Count a bypass attempt; notifies once attempts run out
    ///
    /// The count is saved with the owning session, so it survives a restart
    /// once [`Self::reconcile`] restores the lock.
    ///
    /// # Errors
    ///
    /// Returns [`FocusError::Storage`] if the count could not be saved; it
    /// still counts in memory
    pub async fn record_unlock_attempt(&self, user_id: &str) -> FocusResult<u32> {
        let _user = self.users.acquire(user_id).await;
        let remaining = self.enforcer.record_unlock_attempt(user_id);
        let state = self.enforcer.state(user_id);
        self.save_unlock_attempts(&state).await?;

        if remaining == 0 {
            self.notifier.notify(
                user_id,
                NotificationKind::UnlockAttemptsExhausted,
                json!({
                    "session_id": state.session_id,
                    "attempts": state.unlock_attempts,
                }),
            );
        }
        Ok(remaining)
    }

    /// # Errors
    ///
    /// Returns [`FocusError::Storage`] if the cleared count could not be saved
    pub async fn reset_unlock_attempts(&self, user_id: &str) -> FocusResult<()> {
        let _user = self.users.acquire(user_id).await;
        self.enforcer.reset_unlock_attempts(user_id);
        self.save_unlock_attempts(&self.enforcer.state(user_id)).await
    }

    #[must_use]
    pub fn is_blocked(&self, user_id: &str, app: &str) -> bool {
        self.enforcer.is_blocked(user_id, app)
    }

    #[must_use]
    pub fn restriction_state(&self, user_id: &str) -> RestrictionState {
        self.enforcer.state(user_id)
    }

    /// Rebuild lock state from stored active sessions after a restart
    ///
    /// # Errors
    ///
    /// Returns [`FocusError::Storage`] if active sessions cannot be listed.
    /// Individual lock failures are counted in the report.
    pub async fn reconcile(&self) -> FocusResult<ReconcileReport> {
        let sessions = self
            .store_call("list active sessions", self.store.list_active_sessions())
            .await?;
        let mut report = ReconcileReport::default();

        for session in sessions.into_iter().filter(FocusSession::wants_lock) {
            let _user = self.users.acquire(&session.user_id).await;
            let state = self.enforcer.state(&session.user_id);
            let expected: BTreeSet<String> =
                session.app_restrictions.iter().cloned().collect();
            if state.session_id == Some(session.id) && state.blocked_apps == expected {
                report.unchanged += 1;
                continue;
            }

            match self
                .enforcer
                .lock(&session.user_id, &session.app_restrictions, session.id)
                .await
            {
                Ok(()) => {
                    self.enforcer
                        .restore_unlock_attempts(&session.user_id, session.unlock_attempts);
                    log::info!(
                        "Restored lock of active session {} for {} ({} unlock attempts used)",
                        session.id,
                        session.user_id,
                        session.unlock_attempts
                    );
                    report.restored += 1;
                }
                Err(err) => {
                    log::error!("Could not restore lock of session {}: {err}", session.id);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    // ==================== Queries ====================

    /// # Errors
    ///
    /// Returns [`FocusError::NotFound`] or [`FocusError::Storage`]
    pub async fn session(&self, session_id: Uuid) -> FocusResult<FocusSession> {
        self.load(session_id).await
    }

    /// # Errors
    ///
    /// Returns [`FocusError::Storage`] if the store fails
    pub async fn active_session(&self, user_id: &str) -> FocusResult<Option<FocusSession>> {
        self.store_call("get active session", self.store.get_active_session(user_id))
            .await
    }

    /// # Errors
    ///
    /// Returns [`FocusError::Storage`] if the store fails
    pub async fn history(&self, user_id: &str, limit: usize) -> FocusResult<Vec<FocusSession>> {
        self.store_call("list sessions", self.store.list_sessions(user_id, limit))
            .await
    }

    /// # Errors
    ///
    /// Returns [`FocusError::Storage`] if the store fails
    pub async fn failure_logs(
        &self,
        user_id: &str,
        session_id: Option<Uuid>,
    ) -> FocusResult<Vec<FailureLog>> {
        self.store_call(
            "list failure logs",
            self.store.list_failure_logs(user_id, session_id),
        )
        .await
    }

    // ==================== Internals ====================

    /// Terminal write plus unlock; the caller holds the user lock and has
    /// checked that the session is active
    async fn finish_active(&self, session: &FocusSession, outcome: Outcome) -> FocusResult<FocusSession> {
        let status = outcome.status();
        let now = Utc::now();
        let mut patch = SessionPatch::finish(status, now);
        close_pause(session, now, &mut patch);

        let session = self.patch_session(session, &patch, "end").await?.into_inner();

        self.enforcer.unlock(&session.user_id).await;

        log::info!(
            "Ended session {} for {} as {status} after {} min",
            session.id,
            session.user_id,
            session.total_focus_minutes
        );
        let kind = match outcome {
            Outcome::Success => NotificationKind::SessionCompleted,
            Outcome::Failure => NotificationKind::SessionFailed,
        };
        self.notify_session(kind, &session);
        Ok(session)
    }

    /// Write `patch` if the session still has the status it was loaded with
    async fn patch_session(
        &self,
        session: &FocusSession,
        patch: &SessionPatch,
        action: &'static str,
    ) -> FocusResult<Write<FocusSession>> {
        let written = self
            .store_write(
                action,
                self.store.update_session(session.id, session.status, patch),
            )
            .await?;
        let late = written.is_late();
        let stored = match written.into_inner() {
            PatchOutcome::Applied(stored) => stored,
            PatchOutcome::Missing => return Err(FocusError::NotFound(session.id)),
            PatchOutcome::StatusMismatch { actual } => {
                return Err(FocusError::InvalidState {
                    session_id: session.id,
                    status: actual,
                    action,
                });
            }
        };
        Ok(if late { Write::Late(stored) } else { Write::Done(stored) })
    }

    /// Cancel a session this call should not have left behind
    async fn compensate_cancel(&self, session_id: Uuid, expected: SessionStatus) {
        let patch = SessionPatch::finish(SessionStatus::Cancelled, Utc::now());
        let written = self
            .store_write(
                "roll back session",
                self.store.update_session(session_id, expected, &patch),
            )
            .await;
        match written.map(Write::into_inner) {
            Ok(PatchOutcome::Applied(_)) => log::warn!("Rolled back session {session_id}"),
            Ok(other) => log::error!("Rollback of session {session_id} found {other:?}"),
            Err(err) => log::error!("Session {session_id} left {expected} after a failed rollback: {err}"),
        }
    }

    async fn save_unlock_attempts(&self, state: &RestrictionState) -> FocusResult<()> {
        let Some(session_id) = state.session_id else {
            return Ok(());
        };
        let patch = SessionPatch {
            unlock_attempts: Some(state.unlock_attempts),
            ..SessionPatch::default()
        };
        let outcome = self
            .store_write(
                "save unlock attempts",
                self.store
                    .update_session(session_id, SessionStatus::Active, &patch),
            )
            .await?
            .into_inner();
        if !matches!(outcome, PatchOutcome::Applied(_)) {
            log::warn!("Unlock attempts not saved, session {session_id} is {outcome:?}");
        }
        Ok(())
    }

    async fn append_failure(&self, entry: &FailureLog) -> FocusResult<()> {
        self.store_write("append failure log", self.store.append_failure_log(entry))
            .await?;
        log::info!(
            "Failure logged for {}: {} (session {:?})",
            entry.user_id,
            entry.kind,
            entry.session_id
        );
        self.notifier.notify(
            &entry.user_id,
            NotificationKind::FailureLogged,
            json!({
                "session_id": entry.session_id,
                "kind": entry.kind,
                "app_bundle_id": entry.app_bundle_id,
            }),
        );
        Ok(())
    }

    async fn ensure_no_active(&self, user_id: &str) -> FocusResult<()> {
        let active = self
            .store_call("get active session", self.store.get_active_session(user_id))
            .await?;
        match active {
            Some(existing) => Err(FocusError::Conflict {
                user_id: user_id.to_string(),
                session_id: existing.id,
            }),
            None => Ok(()),
        }
    }

    async fn load(&self, session_id: Uuid) -> FocusResult<FocusSession> {
        self.store_call("get session", self.store.get_session(session_id))
            .await?
            .ok_or(FocusError::NotFound(session_id))
    }

    async fn owner(&self, session_id: Uuid) -> FocusResult<String> {
        Ok(self.load(session_id).await?.user_id)
    }

    /// Bound a store read by `store_timeout`
    async fn store_call<T, F>(&self, what: &'static str, call: F) -> FocusResult<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match tokio::time::timeout(self.config.store_timeout(), call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(FocusError::storage(&err.context(what))),
            Err(_) => Err(self.unacknowledged(what)),
        }
    }

    /// Run a store write to completion
    ///
    /// Dropping a write does not stop a blocking task that already started
    /// it, so past `store_timeout` the call is still awaited and its result
    /// comes back as [`Write::Late`] for the caller to keep or undo.
    async fn store_write<T, F>(&self, what: &'static str, call: F) -> FocusResult<Write<T>>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        tokio::pin!(call);
        match tokio::time::timeout(self.config.store_timeout(), &mut call).await {
            Ok(result) => result
                .map(Write::Done)
                .map_err(|err| FocusError::storage(&err.context(what))),
            Err(_) => {
                log::warn!(
                    "{what}: no acknowledgement within {:?}, waiting for the store to settle",
                    self.config.store_timeout()
                );
                call.await
                    .map(Write::Late)
                    .map_err(|err| FocusError::storage(&err.context(what)))
            }
        }
    }

    fn unacknowledged(&self, what: &str) -> FocusError {
        FocusError::Storage(format!(
            "{what}: no acknowledgement within {:?}",
            self.config.store_timeout()
        ))
    }

    fn notify_session(&self, kind: NotificationKind, session: &FocusSession) {
        self.notifier.notify(
            &session.user_id,
            kind,
            json!({
                "session_id": session.id,
                "title": session.title,
                "status": session.status,
                "total_focus_minutes": session.total_focus_minutes,
            }),
        );
    }
}

fn invalid_state(session: &FocusSession, action: &'static str) -> FocusError {
    FocusError::InvalidState {
        session_id: session.id,
        status: session.status,
        action,
    }
}

/// Check that `session.status -> next` is a legal edge
fn require(session: &FocusSession, next: SessionStatus, action: &'static str) -> FocusResult<()> {
    if session.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(invalid_state(session, action))
    }
}

fn require_active(session: &FocusSession, action: &'static str) -> FocusResult<()> {
    if session.status == SessionStatus::Active {
        Ok(())
    } else {
        Err(invalid_state(session, action))
    }
}

/// Fold an open pause into `paused_minutes` and clear the marker
fn close_pause(session: &FocusSession, now: DateTime<Utc>, patch: &mut SessionPatch) {
    if let Some(paused_at) = session.paused_at {
        let paused = u32::try_from((now - paused_at).num_minutes().max(0)).unwrap_or(u32::MAX);
        patch.paused_at = Some(None);
        patch.paused_minutes = Some(session.paused_minutes.saturating_add(paused));
    }
}

fn as_lock_error(err: FocusError) -> FocusError {
    match err {
        FocusError::Lock(_) => err,
        other => FocusError::Lock(other.to_string()),
    }
}
