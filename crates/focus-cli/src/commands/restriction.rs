//! App restriction commands, used by the OS hook and for debugging

use anyhow::Result;
use clap::Subcommand;
use focus_storage::{FailureDetails, FailureKind};

use super::context::AppContext;
use super::helpers::short_id;

#[derive(Subcommand, Debug)]
pub enum RestrictionAction {
    /// Exit 0 if `app` is blocked for the user, 1 otherwise
    Check { app: String },
    /// Count a bypass attempt; logs `app_opened` once attempts run out
    Attempt {
        /// Bundle id of the app the user tried to open
        #[arg(long)]
        app: Option<String>,
    },
    /// Give the user their unlock attempts back
    Reset,
    /// Ask the platform backend directly whether `app` is blocked
    Platform { app: String },
}

/// Handle restriction commands
pub async fn handle_restriction_command(ctx: &AppContext, action: RestrictionAction) -> Result<()> {
    let controller = &ctx.controller;
    match action {
        RestrictionAction::Check { app } => {
            let blocked = controller.is_blocked(&ctx.user_id, &app);
            println!("{app}: {}", if blocked { "blocked" } else { "allowed" });
            if !blocked {
                std::process::exit(1);
            }
        }
        RestrictionAction::Attempt { app } => {
            let remaining = controller.record_unlock_attempt(&ctx.user_id).await?;
            if remaining > 0 {
                println!("{remaining} unlock attempts left");
                return Ok(());
            }

            println!("No unlock attempts left");
            let state = controller.restriction_state(&ctx.user_id);
            if let (Some(app), Some(session_id)) = (app, state.session_id) {
                let entry = controller
                    .record_failure(session_id, FailureKind::AppOpened, FailureDetails::app(app))
                    .await?;
                println!(
                    "Logged {} against session {}",
                    entry.kind,
                    short_id(session_id)
                );
            }
        }
        RestrictionAction::Reset => {
            controller.reset_unlock_attempts(&ctx.user_id).await?;
            println!("Unlock attempts reset");
        }
        RestrictionAction::Platform { app } => {
            let blocked = controller.enforcer().platform_is_blocked(&app).await?;
            println!(
                "{app}: {} by {}",
                if blocked { "blocked" } else { "not blocked" },
                controller.enforcer().platform_name()
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use focus_core::FocusConfig;
    use focus_storage::NewFocusSession;
    use tempfile::TempDir;

    async fn invocation(dir: &TempDir) -> AppContext {
        let config_path = dir.path().join("config.toml");
        let config = FocusConfig::load(&config_path).unwrap();
        AppContext::with_config(Some("u".into()), config, dir.path())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_attempts_run_out_across_invocations() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("focus.db");
        std::fs::write(
            dir.path().join("config.toml"),
            format!(
                "platform = \"blocklist\"\nmax_unlock_attempts = 2\ndatabase_path = {:?}\n",
                db_path.display().to_string()
            ),
        )
        .unwrap();

        let session = {
            let ctx = invocation(&dir).await;
            let session = ctx
                .controller
                .start(&ctx.user_id, NewFocusSession::new("Write", 25).with_restrictions(["com.a"]))
                .await
                .unwrap();
            handle_restriction_command(&ctx, RestrictionAction::Attempt { app: None })
                .await
                .unwrap();
            session
        };

        let ctx = invocation(&dir).await;
        assert!(ctx.controller.is_blocked("u", "com.a"));
        assert_eq!(ctx.controller.restriction_state("u").unlock_attempts, 1);

        let app = Some("com.a".to_string());
        handle_restriction_command(&ctx, RestrictionAction::Attempt { app })
            .await
            .unwrap();

        let logs = ctx.controller.failure_logs("u", Some(session.id)).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].kind, FailureKind::AppOpened);
        assert_eq!(logs[0].app_bundle_id.as_deref(), Some("com.a"));
    }
}
