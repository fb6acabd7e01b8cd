//! Read-only views: status, session history and failure logs

use anyhow::Result;
use focus_storage::{FailureLog, FocusSession};
use tabled::{Table, Tabled};

use super::context::AppContext;
use super::helpers::{format_minutes, format_time, short_id, truncate_str};

#[derive(Tabled)]
struct SessionRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Focused")]
    focused: String,
    #[tabled(rename = "Started")]
    started: String,
    #[tabled(rename = "Locks")]
    locks: usize,
}

impl From<&FocusSession> for SessionRow {
    fn from(session: &FocusSession) -> Self {
        Self {
            id: short_id(session.id),
            title: truncate_str(&session.title, 30),
            status: session.status.to_string(),
            focused: format!(
                "{} / {}",
                format_minutes(session.total_focus_minutes),
                format_minutes(session.duration_minutes)
            ),
            started: format_time(session.started_at.or(session.scheduled_at)),
            locks: if session.wants_lock() {
                session.app_restrictions.len()
            } else {
                0
            },
        }
    }
}

#[derive(Tabled)]
struct FailureRow {
    #[tabled(rename = "When")]
    when: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Session")]
    session: String,
    #[tabled(rename = "App")]
    app: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

impl From<&FailureLog> for FailureRow {
    fn from(entry: &FailureLog) -> Self {
        Self {
            when: format_time(Some(entry.created_at)),
            kind: entry.kind.to_string(),
            session: entry.session_id.map_or_else(|| "-".to_string(), short_id),
            app: entry
                .app_name
                .clone()
                .or_else(|| entry.app_bundle_id.clone())
                .unwrap_or_else(|| "-".to_string()),
            reason: entry
                .reason
                .as_deref()
                .map_or_else(|| "-".to_string(), |r| truncate_str(r, 40)),
        }
    }
}

pub async fn show_status(ctx: &AppContext) -> Result<()> {
    let controller = &ctx.controller;
    match controller.active_session(&ctx.user_id).await? {
        Some(session) => {
            println!("Active session for {}\n", ctx.user_id);
            println!("{}", Table::new([SessionRow::from(&session)]));
            if session.is_paused() {
                println!("Paused since {}", format_time(session.paused_at));
            }
        }
        None => println!("No active session for {}", ctx.user_id),
    }

    let state = controller.restriction_state(&ctx.user_id);
    if state.locked {
        println!(
            "\nLocked since {}: {}",
            format_time(state.lock_started_at),
            state.blocked_apps.iter().cloned().collect::<Vec<_>>().join(", ")
        );
        println!(
            "Unlock attempts: {} of {} used",
            state.unlock_attempts, state.max_unlock_attempts
        );
    } else {
        println!("\nNo apps locked");
    }
    Ok(())
}

pub async fn show_history(ctx: &AppContext, limit: usize) -> Result<()> {
    let sessions = ctx.controller.history(&ctx.user_id, limit).await?;
    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    let rows: Vec<SessionRow> = sessions.iter().map(SessionRow::from).collect();
    println!("{}", Table::new(rows));

    let focused: u32 = sessions.iter().map(|s| s.total_focus_minutes).sum();
    println!(
        "\nTotal: {} sessions, {} focused",
        sessions.len(),
        format_minutes(focused)
    );
    Ok(())
}

pub async fn show_failures(ctx: &AppContext, session: Option<&str>) -> Result<()> {
    let session_id = match session {
        Some(raw) => Some(ctx.resolve_session(Some(raw)).await?),
        None => None,
    };
    let logs = ctx.controller.failure_logs(&ctx.user_id, session_id).await?;
    if logs.is_empty() {
        println!("No failures logged.");
        return Ok(());
    }

    let rows: Vec<FailureRow> = logs.iter().map(FailureRow::from).collect();
    println!("{}", Table::new(rows));
    Ok(())
}
