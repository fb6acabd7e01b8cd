use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tokio::sync::Mutex;

use super::PlatformRestriction;

/// On-disk handoff read by the OS hook (launcher shim, hosts updater,
/// Screen Time extension)
#[derive(Debug, Default, Serialize, Deserialize)]
struct BlocklistFile {
    blocked: BTreeSet<String>,
    updated_at: Option<DateTime<Utc>>,
}

/// Publishes the blocked set as a JSON file
///
/// Every change is written to a temp file and renamed into place, so the hook
/// never sees a half-written list.
pub struct BlocklistPlatform {
    path: PathBuf,
    blocked: Mutex<BTreeSet<String>>,
}

impl BlocklistPlatform {
    /// Open (or start) the blocklist at `path`
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed
    pub fn new(path: PathBuf) -> Result<Self> {
        let blocked = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read blocklist {}", path.display()))?;
            serde_json::from_str::<BlocklistFile>(&raw)
                .with_context(|| format!("Corrupt blocklist {}", path.display()))?
                .blocked
        } else {
            BTreeSet::new()
        };

        log::debug!(
            "Blocklist platform at {} ({} apps blocked)",
            path.display(),
            blocked.len()
        );

        Ok(Self {
            path,
            blocked: Mutex::new(blocked),
        })
    }

    async fn publish(&self, blocked: &BTreeSet<String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create blocklist directory")?;
        }

        let file = BlocklistFile {
            blocked: blocked.clone(),
            updated_at: Some(Utc::now()),
        };
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&file)?)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl PlatformRestriction for BlocklistPlatform {
    async fn block(&self, apps: &[String]) -> Result<()> {
        let mut blocked = self.blocked.lock().await;
        let mut next = blocked.clone();
        next.extend(apps.iter().cloned());
        self.publish(&next).await?;
        *blocked = next;
        log::info!("Blocklist now holds {} apps", blocked.len());
        Ok(())
    }

    async fn unblock(&self, apps: &[String]) -> Result<()> {
        let mut blocked = self.blocked.lock().await;
        let mut next = blocked.clone();
        for app in apps {
            next.remove(app);
        }
        self.publish(&next).await?;
        *blocked = next;
        log::info!("Blocklist now holds {} apps", blocked.len());
        Ok(())
    }

    async fn is_blocked(&self, app: &str) -> Result<bool> {
        Ok(self.blocked.lock().await.contains(app))
    }

    fn name(&self) -> &'static str {
        "blocklist"
    }
}
