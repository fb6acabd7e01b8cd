mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{
    context::AppContext, history, restriction::RestrictionAction, session::SessionAction,
};

#[derive(Parser)]
#[command(name = "focus")]
#[command(about = "Focus sessions that lock distracting apps", long_about = None)]
struct Cli {
    /// User the command acts for (defaults to $FOCUS_USER, then $USER)
    #[arg(short, long, global = true)]
    user: Option<String>,
    /// Config file (defaults to <data dir>/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start, end and manage focus sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Inspect and respond to app restrictions
    Lock {
        #[command(subcommand)]
        action: RestrictionAction,
    },
    /// Show the active session and lock state
    Status,
    /// List recent sessions
    History {
        /// Maximum number of sessions to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// List failure logs
    Failures {
        /// Only logs of this session (id or id prefix)
        #[arg(short, long)]
        session: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let ctx = AppContext::open(cli.user, cli.config.as_deref()).await?;

    match cli.command {
        Commands::Session { action } => commands::session::handle_session_command(&ctx, action).await,
        Commands::Lock { action } => {
            commands::restriction::handle_restriction_command(&ctx, action).await
        }
        Commands::Status => history::show_status(&ctx).await,
        Commands::History { limit } => history::show_history(&ctx, limit).await,
        Commands::Failures { session } => history::show_failures(&ctx, session.as_deref()).await,
    }
}
