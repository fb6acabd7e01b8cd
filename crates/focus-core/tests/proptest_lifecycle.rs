use focus_core::{
    FocusConfig, MemorySessionStore, Outcome, RecordingNotifier, RestrictionEnforcer,
    SessionController, SessionStore,
};
use focus_core::platform::MemoryPlatform;
use focus_storage::{NewFocusSession, SessionStatus};
use proptest::prelude::*;
use proptest::test_runner::{Config, TestCaseError};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use uuid::Uuid;

const USERS: [&str; 2] = ["alice", "bob"];

#[derive(Debug, Clone)]
enum Op {
    Start { user: usize, locked: bool },
    Schedule { user: usize },
    Begin { user: usize },
    End { user: usize, success: bool },
    Cancel { user: usize },
    Progress { user: usize, minutes: u32 },
}

fn op() -> impl Strategy<Value = Op> {
    let user = 0..USERS.len();
    prop_oneof![
        (user.clone(), any::<bool>()).prop_map(|(user, locked)| Op::Start { user, locked }),
        user.clone().prop_map(|user| Op::Schedule { user }),
        user.clone().prop_map(|user| Op::Begin { user }),
        (user.clone(), any::<bool>()).prop_map(|(user, success)| Op::End { user, success }),
        user.clone().prop_map(|user| Op::Cancel { user }),
        (user, 0_u32..120).prop_map(|(user, minutes)| Op::Progress { user, minutes }),
    ]
}

fn request(locked: bool) -> NewFocusSession {
    let request = NewFocusSession::new("Focus", 25);
    if locked {
        request.with_restrictions(["com.tiktok", "com.instagram"])
    } else {
        request
    }
}

/// Most recent session of `user` in `status`, if any
async fn latest(store: &MemorySessionStore, user: &str, status: SessionStatus) -> Option<Uuid> {
    store
        .list_sessions(user, 1_000)
        .await
        .ok()?
        .into_iter()
        .find(|s| s.status == status)
        .map(|s| s.id)
}

async fn apply(controller: &SessionController, store: &MemorySessionStore, op: &Op) {
    // Errors are part of the exercise; only the invariants below matter
    match *op {
        Op::Start { user, locked } => {
            let _ = controller.start(USERS[user], request(locked)).await;
        }
        Op::Schedule { user } => {
            let _ = controller.schedule(USERS[user], request(true)).await;
        }
        Op::Begin { user } => {
            if let Some(id) = latest(store, USERS[user], SessionStatus::Scheduled).await {
                let _ = controller.begin(id).await;
            }
        }
        Op::End { user, success } => {
            if let Some(id) = latest(store, USERS[user], SessionStatus::Active).await {
                let outcome = if success { Outcome::Success } else { Outcome::Failure };
                let _ = controller.end(id, outcome).await;
            }
        }
        Op::Cancel { user } => {
            let target = match latest(store, USERS[user], SessionStatus::Active).await {
                Some(id) => Some(id),
                None => latest(store, USERS[user], SessionStatus::Scheduled).await,
            };
            if let Some(id) = target {
                let _ = controller.cancel(id).await;
            }
        }
        Op::Progress { user, minutes } => {
            if let Some(id) = latest(store, USERS[user], SessionStatus::Active).await {
                let _ = controller.update_progress(id, minutes).await;
            }
        }
    }
}

async fn run(ops: Vec<Op>) -> Result<(), TestCaseError> {
    let config = FocusConfig::default();
    let store = Arc::new(MemorySessionStore::new());
    let platform = Arc::new(MemoryPlatform::new());
    let enforcer = Arc::new(RestrictionEnforcer::new(platform.clone(), &config));
    let controller =
        SessionController::new(store.clone(), enforcer, Arc::new(RecordingNotifier::new()), config);
    let mut progress: HashMap<Uuid, u32> = HashMap::new();

    for op in &ops {
        apply(&controller, &store, op).await;
        let mut held = BTreeSet::new();

        for user in USERS {
            let sessions = store.list_sessions(user, 1_000).await.unwrap_or_default();
            let active: Vec<_> = sessions
                .iter()
                .filter(|s| s.status == SessionStatus::Active)
                .collect();
            prop_assert!(active.len() <= 1, "{user} has {} active sessions", active.len());

            for session in &sessions {
                prop_assert_eq!(session.ended_at.is_some(), session.status.is_terminal());
                let seen = progress.entry(session.id).or_insert(0);
                prop_assert!(session.total_focus_minutes >= *seen);
                *seen = session.total_focus_minutes;
            }

            let state = controller.restriction_state(user);
            match active.first() {
                Some(session) if session.wants_lock() => {
                    prop_assert!(state.locked);
                    prop_assert_eq!(state.session_id, Some(session.id));
                    held.extend(state.blocked_apps.iter().cloned());
                }
                _ => {
                    prop_assert!(!state.locked);
                    prop_assert!(state.blocked_apps.is_empty());
                }
            }
        }

        // The device-wide set is exactly what some locked user still needs
        prop_assert_eq!(platform.blocked(), held);
    }
    Ok(())
}

proptest! {
    #![proptest_config(Config::with_cases(64))]
    #[test]
    fn lifecycle_invariants_hold(ops in prop::collection::vec(op(), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("tokio runtime");
        runtime.block_on(run(ops))?;
    }
}
