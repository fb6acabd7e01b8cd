use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

use crate::config::{FocusConfig, PlatformKind};

pub mod blocklist;
pub mod memory;

pub use blocklist::BlocklistPlatform;
pub use memory::MemoryPlatform;

/// OS-level app restriction mechanism
///
/// The core only records intent; implementations make the operating system
/// (or a hook running on it) actually keep the apps closed.
#[async_trait]
pub trait PlatformRestriction: Send + Sync {
    /// Start blocking `apps`
    async fn block(&self, apps: &[String]) -> Result<()>;

    /// Stop blocking `apps`
    async fn unblock(&self, apps: &[String]) -> Result<()>;

    /// Whether the platform currently blocks `app`
    async fn is_blocked(&self, app: &str) -> Result<bool>;

    /// Get the backend name
    fn name(&self) -> &'static str;
}

/// Create the configured platform backend
///
/// # Errors
///
/// Returns an error if backend initialization fails
pub fn create_platform(
    config: &FocusConfig,
    data_dir: &Path,
) -> Result<Box<dyn PlatformRestriction>> {
    match config.platform {
        PlatformKind::Memory => Ok(Box::new(MemoryPlatform::new())),
        PlatformKind::Blocklist => Ok(Box::new(BlocklistPlatform::new(
            data_dir.join("blocklist.json"),
        )?)),
    }
}
