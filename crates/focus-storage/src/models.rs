use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Focus sessions
// ============================================================================

/// Lifecycle status of a focus session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created ahead of time, not yet started
    Scheduled,
    /// Running; restrictions may be enforced
    Active,
    /// Ended successfully
    Completed,
    /// Ended unsuccessfully (gave up, broke the lock)
    Failed,
    /// Withdrawn before completion
    Cancelled,
}

impl SessionStatus {
    /// Terminal statuses never change again
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `self -> next` is an edge of the session state machine
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Scheduled, Self::Active | Self::Cancelled)
                | (Self::Active, Self::Completed | Self::Failed | Self::Cancelled)
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scheduled" => Ok(Self::Scheduled),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown session status: {s}")),
        }
    }
}

/// A timed commitment to stay away from a set of applications
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FocusSession {
    pub id: Uuid,
    /// Owner; never changes after creation
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub duration_minutes: u32,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    /// Set if and only if the status is terminal
    pub ended_at: Option<DateTime<Utc>>,
    /// Accumulated focus time, never decreases while active
    pub total_focus_minutes: u32,
    pub status: SessionStatus,
    /// Bundle ids to block while active
    pub app_restrictions: Vec<String>,
    pub app_lock_enabled: bool,
    pub essay_required: bool,
    pub essay_content: Option<String>,
    pub essay_word_count: u32,
    pub paused_at: Option<DateTime<Utc>>,
    pub paused_minutes: u32,
    /// Bypass attempts counted against this session's lock
    pub unlock_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FocusSession {
    /// Build a fresh session record from a creation request
    #[must_use]
    pub fn from_request(
        user_id: &str,
        request: &NewFocusSession,
        status: SessionStatus,
        started_at: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            title: request.title.clone(),
            description: request.description.clone(),
            duration_minutes: request.duration_minutes,
            scheduled_at: request.scheduled_at,
            started_at,
            ended_at: None,
            total_focus_minutes: 0,
            status,
            app_restrictions: normalize_apps(&request.app_restrictions),
            app_lock_enabled: request.app_lock_enabled,
            essay_required: request.essay_required,
            essay_content: None,
            essay_word_count: 0,
            paused_at: None,
            paused_minutes: 0,
            unlock_attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether starting this session should lock its restriction list
    #[must_use]
    pub fn wants_lock(&self) -> bool {
        self.app_lock_enabled && !self.app_restrictions.is_empty()
    }

    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    /// Apply a patch in place, bumping `updated_at`
    pub fn apply(&mut self, patch: &SessionPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(started_at) = patch.started_at {
            self.started_at = Some(started_at);
        }
        if let Some(ended_at) = patch.ended_at {
            self.ended_at = Some(ended_at);
        }
        if let Some(minutes) = patch.total_focus_minutes {
            self.total_focus_minutes = minutes;
        }
        if let Some(paused_at) = patch.paused_at {
            self.paused_at = paused_at;
        }
        if let Some(minutes) = patch.paused_minutes {
            self.paused_minutes = minutes;
        }
        if let Some(attempts) = patch.unlock_attempts {
            self.unlock_attempts = attempts;
        }
        if let Some(content) = &patch.essay_content {
            self.essay_content = Some(content.clone());
        }
        if let Some(count) = patch.essay_word_count {
            self.essay_word_count = count;
        }
        self.updated_at = Utc::now();
    }
}

/// Request to create a focus session, either started immediately or scheduled
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewFocusSession {
    pub title: String,
    pub description: Option<String>,
    pub duration_minutes: u32,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub app_restrictions: Vec<String>,
    pub app_lock_enabled: bool,
    pub essay_required: bool,
}

impl NewFocusSession {
    #[must_use]
    pub fn new(title: impl Into<String>, duration_minutes: u32) -> Self {
        Self {
            title: title.into(),
            duration_minutes,
            ..Self::default()
        }
    }

    /// Block `apps` for the duration of the session
    #[must_use]
    pub fn with_restrictions<I, S>(mut self, apps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.app_restrictions = apps.into_iter().map(Into::into).collect();
        self.app_lock_enabled = true;
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_schedule(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    #[must_use]
    pub fn with_essay(mut self) -> Self {
        self.essay_required = true;
        self
    }

    #[must_use]
    pub fn wants_lock(&self) -> bool {
        self.app_lock_enabled && !normalize_apps(&self.app_restrictions).is_empty()
    }
}

/// Partial update of a stored session; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPatch {
    pub status: Option<SessionStatus>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub total_focus_minutes: Option<u32>,
    /// `Some(None)` clears the pause marker
    pub paused_at: Option<Option<DateTime<Utc>>>,
    pub paused_minutes: Option<u32>,
    pub essay_content: Option<String>,
    pub essay_word_count: Option<u32>,
    pub unlock_attempts: Option<u32>,
}

/// Result of a conditional session update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The patch was written; carries the stored session
    Applied(FocusSession),
    Missing,
    /// The stored status was not the expected one; nothing was written
    StatusMismatch { actual: SessionStatus },
}

impl SessionPatch {
    /// Move to a terminal status and stamp the end time
    #[must_use]
    pub fn finish(status: SessionStatus, at: DateTime<Utc>) -> Self {
        Self {
            status: Some(status),
            ended_at: Some(at),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn progress(minutes: u32) -> Self {
        Self {
            total_focus_minutes: Some(minutes),
            ..Self::default()
        }
    }
}

/// Trim, drop blanks and de-duplicate app ids, keeping first-seen order
#[must_use]
pub fn normalize_apps<S: AsRef<str>>(apps: &[S]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    apps.iter()
        .map(|app| app.as_ref().trim())
        .filter(|app| !app.is_empty())
        .filter(|app| seen.insert((*app).to_string()))
        .map(ToString::to_string)
        .collect()
}

/// Whitespace-delimited word count used by the essay gate
#[must_use]
pub fn word_count(text: &str) -> u32 {
    u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX)
}

// ============================================================================
// Failure logs
// ============================================================================

/// Why a focus commitment was broken
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A blocked app was opened anyway
    AppOpened,
    /// The session was given up early
    SessionAbandoned,
    /// The essay gate was bypassed
    EssaySkipped,
    /// Usage went past the allowed time
    TimeLimitExceeded,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AppOpened => write!(f, "app_opened"),
            Self::SessionAbandoned => write!(f, "session_abandoned"),
            Self::EssaySkipped => write!(f, "essay_skipped"),
            Self::TimeLimitExceeded => write!(f, "time_limit_exceeded"),
        }
    }
}

impl std::str::FromStr for FailureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "app_opened" => Ok(Self::AppOpened),
            "session_abandoned" => Ok(Self::SessionAbandoned),
            "essay_skipped" => Ok(Self::EssaySkipped),
            "time_limit_exceeded" => Ok(Self::TimeLimitExceeded),
            _ => Err(format!("Unknown failure kind: {s}")),
        }
    }
}

/// Append-only record of a broken commitment, used for analytics and nudges
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureLog {
    pub id: Uuid,
    pub user_id: String,
    pub session_id: Option<Uuid>,
    pub kind: FailureKind,
    pub app_bundle_id: Option<String>,
    pub app_name: Option<String>,
    pub reason: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl FailureLog {
    #[must_use]
    pub fn new(user_id: &str, session_id: Option<Uuid>, kind: FailureKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            session_id,
            kind,
            app_bundle_id: None,
            app_name: None,
            reason: None,
            metadata: serde_json::Value::Object(serde_json::Map::new()),
            created_at: Utc::now(),
        }
    }
}

/// Optional context attached to a failure report
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FailureDetails {
    pub app_bundle_id: Option<String>,
    pub app_name: Option<String>,
    pub reason: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl FailureDetails {
    #[must_use]
    pub fn app(bundle_id: impl Into<String>) -> Self {
        Self {
            app_bundle_id: Some(bundle_id.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Turn the details into a log entry for `user_id`
    #[must_use]
    pub fn into_log(self, user_id: &str, session_id: Option<Uuid>, kind: FailureKind) -> FailureLog {
        let mut log = FailureLog::new(user_id, session_id, kind);
        log.app_bundle_id = self.app_bundle_id;
        log.app_name = self.app_name;
        log.reason = self.reason;
        if let Some(metadata) = self.metadata {
            log.metadata = metadata;
        }
        log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use SessionStatus::{Active, Cancelled, Completed, Failed, Scheduled};

        assert!(Scheduled.can_transition_to(Active));
        assert!(Scheduled.can_transition_to(Cancelled));
        assert!(!Scheduled.can_transition_to(Completed));
        assert!(!Scheduled.can_transition_to(Failed));

        assert!(Active.can_transition_to(Completed));
        assert!(Active.can_transition_to(Failed));
        assert!(Active.can_transition_to(Cancelled));
        assert!(!Active.can_transition_to(Scheduled));

        for terminal in [Completed, Failed, Cancelled] {
            assert!(terminal.is_terminal());
            for next in [Scheduled, Active, Completed, Failed, Cancelled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_status_wire_form() {
        assert_eq!(SessionStatus::Cancelled.to_string(), "cancelled");
        assert_eq!("ACTIVE".parse::<SessionStatus>(), Ok(SessionStatus::Active));
        assert!("paused".parse::<SessionStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&SessionStatus::Scheduled).unwrap(),
            "\"scheduled\""
        );
    }

    #[test]
    fn test_failure_kind_wire_form() {
        assert_eq!(FailureKind::TimeLimitExceeded.to_string(), "time_limit_exceeded");
        assert_eq!(
            "essay_skipped".parse::<FailureKind>(),
            Ok(FailureKind::EssaySkipped)
        );
    }

    #[test]
    fn test_normalize_apps_dedupes_and_trims() {
        let apps = normalize_apps(&[" com.a ", "com.b", "", "com.a", "com.c"]);
        assert_eq!(apps, vec!["com.a", "com.b", "com.c"]);
    }

    #[test]
    fn test_wants_lock_requires_enabled_and_apps() {
        let plain = NewFocusSession::new("Deep work", 25);
        assert!(!plain.wants_lock());

        let locked = NewFocusSession::new("Deep work", 25).with_restrictions(["com.x"]);
        assert!(locked.wants_lock());

        let empty = NewFocusSession::new("Deep work", 25).with_restrictions(Vec::<String>::new());
        assert!(!empty.wants_lock());
    }

    #[test]
    fn test_apply_patch() {
        let request = NewFocusSession::new("Read", 30);
        let mut session = FocusSession::from_request("u1", &request, SessionStatus::Active, Some(Utc::now()));
        let paused = Utc::now();

        session.apply(&SessionPatch {
            paused_at: Some(Some(paused)),
            total_focus_minutes: Some(5),
            ..SessionPatch::default()
        });
        assert_eq!(session.paused_at, Some(paused));
        assert_eq!(session.total_focus_minutes, 5);

        session.apply(&SessionPatch {
            paused_at: Some(None),
            ..SessionPatch::default()
        });
        assert!(!session.is_paused());
        assert_eq!(session.total_focus_minutes, 5);
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("  I really   need to\nleave now "), 6);
        assert_eq!(word_count(""), 0);
    }
}
