use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::PlatformRestriction;

/// In-process restriction backend
///
/// Keeps the blocked set in memory and counts calls. Block and unblock can be
/// told to fail or to stall, which makes it the backend of choice for tests
/// and dry runs.
#[derive(Default)]
pub struct MemoryPlatform {
    blocked: Mutex<BTreeSet<String>>,
    block_calls: AtomicUsize,
    unblock_calls: AtomicUsize,
    fail_block: AtomicBool,
    fail_unblock: AtomicBool,
    stall: Mutex<Option<Duration>>,
}

impl MemoryPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_block(&self, fail: bool) {
        self.fail_block.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_unblock(&self, fail: bool) {
        self.fail_unblock.store(fail, Ordering::SeqCst);
    }

    /// Make every block and unblock sleep before acting
    pub fn set_stall(&self, stall: Option<Duration>) {
        if let Ok(mut current) = self.stall.lock() {
            *current = stall;
        }
    }

    #[must_use]
    pub fn block_calls(&self) -> usize {
        self.block_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn unblock_calls(&self) -> usize {
        self.unblock_calls.load(Ordering::SeqCst)
    }

    /// Snapshot of what the platform believes is blocked
    #[must_use]
    pub fn blocked(&self) -> BTreeSet<String> {
        self.blocked
            .lock()
            .map(|set| set.clone())
            .unwrap_or_default()
    }

    async fn maybe_stall(&self) {
        let stall = self.stall.lock().ok().and_then(|stall| *stall);
        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
        }
    }
}

#[async_trait]
impl PlatformRestriction for MemoryPlatform {
    async fn block(&self, apps: &[String]) -> Result<()> {
        self.block_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_stall().await;
        if self.fail_block.load(Ordering::SeqCst) {
            anyhow::bail!("Screen Time permission not granted");
        }
        let mut blocked = self
            .blocked
            .lock()
            .map_err(|_| anyhow!("Blocked set mutex poisoned"))?;
        blocked.extend(apps.iter().cloned());
        log::debug!("Memory platform blocking {apps:?}");
        Ok(())
    }

    async fn unblock(&self, apps: &[String]) -> Result<()> {
        self.unblock_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_stall().await;
        if self.fail_unblock.load(Ordering::SeqCst) {
            anyhow::bail!("Screen Time permission revoked");
        }
        let mut blocked = self
            .blocked
            .lock()
            .map_err(|_| anyhow!("Blocked set mutex poisoned"))?;
        for app in apps {
            blocked.remove(app);
        }
        log::debug!("Memory platform unblocking {apps:?}");
        Ok(())
    }

    async fn is_blocked(&self, app: &str) -> Result<bool> {
        let blocked = self
            .blocked
            .lock()
            .map_err(|_| anyhow!("Blocked set mutex poisoned"))?;
        Ok(blocked.contains(app))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
