//! Recording access notifier.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use unisync_core::{AccessNotifier, NotifyError};

/// Records every restoration call and can be switched into a failing
/// mode to exercise the best-effort-warning path.
#[derive(Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    /// Create a succeeding notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent calls fail.
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    /// The recorded (external id, reason) calls.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AccessNotifier for RecordingNotifier {
    async fn restore_access(&self, external_id: &str, reason: &str) -> Result<(), NotifyError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((external_id.to_string(), reason.to_string()));
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError("community platform unreachable".to_string()));
        }
        Ok(())
    }
}
