//! Per-platform run lock.
//!
//! Two overlapping runs of the same platform would race on the same
//! persons; an advisory lock held for the run's duration prevents it.
//! Runs of different platforms proceed concurrently.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::debug;

use unisync_core::PlatformKind;

/// Advisory lock granting at most one in-flight run per platform.
#[derive(Debug, Clone, Default)]
pub struct PlatformRunLock {
    held: Arc<Mutex<HashSet<PlatformKind>>>,
}

impl PlatformRunLock {
    /// Create an unheld lock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to acquire the permit for a platform. Returns `None` when a
    /// run for the platform is already in flight.
    #[must_use]
    pub fn try_acquire(&self, platform: PlatformKind) -> Option<RunPermit> {
        let Ok(mut held) = self.held.lock() else {
            return None;
        };
        if held.insert(platform) {
            debug!(platform = %platform, "Acquired platform run permit");
            Some(RunPermit {
                platform,
                held: Arc::clone(&self.held),
            })
        } else {
            None
        }
    }

    /// Whether a run for the platform is in flight.
    #[must_use]
    pub fn is_held(&self, platform: PlatformKind) -> bool {
        self.held
            .lock()
            .map(|held| held.contains(&platform))
            .unwrap_or(false)
    }
}

/// RAII permit for one platform run; released on drop.
#[derive(Debug)]
pub struct RunPermit {
    platform: PlatformKind,
    held: Arc<Mutex<HashSet<PlatformKind>>>,
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        if let Ok(mut held) = self.held.lock() {
            held.remove(&self.platform);
        }
        debug!(platform = %self.platform, "Released platform run permit");
    }
}
