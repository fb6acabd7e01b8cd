//! Focus session commands

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use focus_core::Outcome;
use focus_storage::{FailureDetails, FailureKind, FocusSession, NewFocusSession};

use super::context::AppContext;
use super::helpers::{format_minutes, format_time, short_id};

#[derive(Args, Debug)]
pub struct SessionArgs {
    /// What the session is for
    title: String,
    /// Planned length in minutes
    #[arg(short, long, default_value = "25")]
    minutes: u32,
    /// Bundle ids to lock, comma separated
    #[arg(short, long, value_delimiter = ',')]
    block: Vec<String>,
    /// Require a justification essay before giving up
    #[arg(long)]
    essay: bool,
    #[arg(short, long)]
    description: Option<String>,
}

impl SessionArgs {
    fn into_request(self) -> NewFocusSession {
        let mut request = NewFocusSession::new(self.title, self.minutes);
        if !self.block.is_empty() {
            request = request.with_restrictions(self.block);
        }
        if self.essay {
            request = request.with_essay();
        }
        if let Some(description) = self.description {
            request = request.with_description(description);
        }
        request
    }
}

#[derive(Subcommand, Debug)]
pub enum SessionAction {
    /// Start a session now
    Start {
        #[command(flatten)]
        args: SessionArgs,
    },
    /// Plan a session to begin later
    Schedule {
        #[command(flatten)]
        args: SessionArgs,
        /// Planned start (RFC 3339, e.g. 2026-10-16T14:00:00+09:00)
        #[arg(long)]
        at: Option<String>,
    },
    /// Start a scheduled session
    Begin {
        /// Session id or prefix
        id: String,
    },
    /// Finish a session (defaults to the active one)
    End {
        id: Option<String>,
        /// Record the session as failed instead of completed
        #[arg(long)]
        failed: bool,
    },
    /// Cancel a scheduled or active session
    Cancel { id: String },
    /// Record accumulated focus minutes
    Progress {
        minutes: u32,
        #[arg(long)]
        id: Option<String>,
    },
    Pause { id: Option<String> },
    Resume { id: Option<String> },
    /// Submit the justification essay
    Essay {
        text: String,
        #[arg(long)]
        id: Option<String>,
    },
    /// Give up on the active session
    Abandon { id: Option<String> },
    /// Log a broken commitment
    Fail {
        /// `app_opened`, `session_abandoned`, `essay_skipped` or `time_limit_exceeded`
        kind: FailureKind,
        #[arg(long)]
        app: Option<String>,
        #[arg(long)]
        reason: Option<String>,
        #[arg(long)]
        id: Option<String>,
    },
    /// Show one session
    Show { id: Option<String> },
}

/// Handle session commands
pub async fn handle_session_command(ctx: &AppContext, action: SessionAction) -> Result<()> {
    let controller = &ctx.controller;
    match action {
        SessionAction::Start { args } => {
            let session = controller.start(&ctx.user_id, args.into_request()).await?;
            println!("Started session {}: {}", short_id(session.id), session.title);
            print_lock(&session);
        }
        SessionAction::Schedule { args, at } => {
            let mut request = args.into_request();
            if let Some(at) = at {
                request = request.with_schedule(parse_time(&at)?);
            }
            let session = controller.schedule(&ctx.user_id, request).await?;
            println!(
                "Scheduled session {} for {}",
                short_id(session.id),
                format_time(session.scheduled_at)
            );
        }
        SessionAction::Begin { id } => {
            let id = ctx.resolve_session(Some(&id)).await?;
            let session = controller.begin(id).await?;
            println!("Began session {}: {}", short_id(session.id), session.title);
            print_lock(&session);
        }
        SessionAction::End { id, failed } => {
            let id = ctx.resolve_session(id.as_deref()).await?;
            let outcome = if failed { Outcome::Failure } else { Outcome::Success };
            let session = controller.end(id, outcome).await?;
            println!(
                "Session {} {} after {}",
                short_id(session.id),
                session.status,
                format_minutes(session.total_focus_minutes)
            );
        }
        SessionAction::Cancel { id } => {
            let id = ctx.resolve_session(Some(&id)).await?;
            let session = controller.cancel(id).await?;
            println!("Cancelled session {}", short_id(session.id));
        }
        SessionAction::Progress { minutes, id } => {
            let id = ctx.resolve_session(id.as_deref()).await?;
            let session = controller.update_progress(id, minutes).await?;
            println!(
                "Focused {} of {}",
                format_minutes(session.total_focus_minutes),
                format_minutes(session.duration_minutes)
            );
        }
        SessionAction::Pause { id } => {
            let id = ctx.resolve_session(id.as_deref()).await?;
            controller.pause(id).await?;
            println!("Paused session {} (apps stay locked)", short_id(id));
        }
        SessionAction::Resume { id } => {
            let id = ctx.resolve_session(id.as_deref()).await?;
            let session = controller.resume(id).await?;
            println!(
                "Resumed session {} ({} paused so far)",
                short_id(id),
                format_minutes(session.paused_minutes)
            );
        }
        SessionAction::Essay { text, id } => {
            let id = ctx.resolve_session(id.as_deref()).await?;
            let session = controller.submit_essay(id, &text).await?;
            println!("Saved essay ({} words)", session.essay_word_count);
        }
        SessionAction::Abandon { id } => {
            let id = ctx.resolve_session(id.as_deref()).await?;
            let session = controller.abandon(id).await?;
            println!(
                "Abandoned session {} after {}",
                short_id(session.id),
                format_minutes(session.total_focus_minutes)
            );
        }
        SessionAction::Fail {
            kind,
            app,
            reason,
            id,
        } => {
            let id = ctx.resolve_session(id.as_deref()).await?;
            let details = FailureDetails {
                app_bundle_id: app,
                reason,
                ..FailureDetails::default()
            };
            let entry = controller.record_failure(id, kind, details).await?;
            println!("Logged {} for session {}", entry.kind, short_id(id));
        }
        SessionAction::Show { id } => {
            let id = ctx.resolve_session(id.as_deref()).await?;
            print_details(&controller.session(id).await?);
        }
    }
    Ok(())
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid time '{raw}', expected RFC 3339"))?
        .with_timezone(&Utc))
}

fn print_lock(session: &FocusSession) {
    if session.wants_lock() {
        println!("Locked: {}", session.app_restrictions.join(", "));
    }
}

fn print_details(session: &FocusSession) {
    println!("Session Details\n");
    println!("ID:          {}", session.id);
    println!("Title:       {}", session.title);
    if let Some(description) = &session.description {
        println!("Description: {description}");
    }
    println!("Status:      {}", session.status);
    println!("Planned:     {}", format_minutes(session.duration_minutes));
    println!("Focused:     {}", format_minutes(session.total_focus_minutes));
    if session.is_paused() {
        println!("Paused:      since {}", format_time(session.paused_at));
    }
    println!("Scheduled:   {}", format_time(session.scheduled_at));
    println!("Started:     {}", format_time(session.started_at));
    println!("Ended:       {}", format_time(session.ended_at));
    if session.wants_lock() {
        println!("Locks:       {}", session.app_restrictions.join(", "));
    }
    if session.essay_required {
        println!("Essay:       {} words", session.essay_word_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_build_locked_request() {
        let args = SessionArgs {
            title: "Write".into(),
            minutes: 50,
            block: vec!["com.tiktok".into()],
            essay: true,
            description: None,
        };
        let request = args.into_request();
        assert!(request.wants_lock());
        assert!(request.essay_required);
        assert_eq!(request.duration_minutes, 50);
    }

    #[test]
    fn test_args_without_block_do_not_lock() {
        let args = SessionArgs {
            title: "Read".into(),
            minutes: 25,
            block: vec![],
            essay: false,
            description: Some("chapter 3".into()),
        };
        let request = args.into_request();
        assert!(!request.wants_lock());
        assert_eq!(request.description.as_deref(), Some("chapter 3"));
    }

    #[test]
    fn test_parse_time() {
        let at = parse_time("2026-10-16T14:00:00+09:00").unwrap();
        assert_eq!(at.to_rfc3339(), "2026-10-16T05:00:00+00:00");
        assert!(parse_time("tomorrow").is_err());
    }
}
