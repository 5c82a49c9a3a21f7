//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use unisync_core::{PlatformKind, RunError, RunTrigger, RunWarning, SourceRecord};

/// Configuration for the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRunConfig {
    /// Batch size for processing records.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Cooperative pause between batches, in milliseconds. Bounds burst
    /// load on the persistence layer; not required for correctness.
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
    /// Product resolver settings.
    #[serde(default)]
    pub resolver: ResolverConfig,
}

fn default_batch_size() -> usize {
    50
}

fn default_batch_pause_ms() -> u64 {
    250
}

impl Default for SyncRunConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_pause_ms: default_batch_pause_ms(),
            resolver: ResolverConfig::default(),
        }
    }
}

/// Product resolver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// How long a built catalog index stays fresh, in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_cache_ttl_secs() -> u64 {
    300
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

/// Progress callback: (items processed, items total).
pub type ProgressCallback = Arc<dyn Fn(u32, u32) + Send + Sync>;
/// Error callback, invoked for every item-scoped error.
pub type ErrorCallback = Arc<dyn Fn(&RunError) + Send + Sync>;
/// Warning callback, invoked for every warning.
pub type WarningCallback = Arc<dyn Fn(&RunWarning) + Send + Sync>;

/// Optional caller hooks invoked while a run progresses.
#[derive(Clone, Default)]
pub struct RunCallbacks {
    /// Called after every batch.
    pub on_progress: Option<ProgressCallback>,
    /// Called for every item-scoped error.
    pub on_error: Option<ErrorCallback>,
    /// Called for every warning.
    pub on_warning: Option<WarningCallback>,
}

impl std::fmt::Debug for RunCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunCallbacks")
            .field("on_progress", &self.on_progress.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_warning", &self.on_warning.is_some())
            .finish()
    }
}

/// One request to reconcile a batch of source records.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Platform the records originate from.
    pub platform: PlatformKind,
    /// What triggered the run.
    pub trigger: RunTrigger,
    /// Normalized records, fully materialized by the adapter.
    pub records: Vec<SourceRecord>,
    /// Whether the adapter performed a full fetch.
    pub full_sync: bool,
    /// Caller hooks.
    pub callbacks: RunCallbacks,
    /// Cancellation token, checked once per item.
    pub cancel: CancellationToken,
}

impl RunRequest {
    /// Create a request with no callbacks and a fresh cancellation token.
    #[must_use]
    pub fn new(platform: PlatformKind, trigger: RunTrigger, records: Vec<SourceRecord>) -> Self {
        Self {
            platform,
            trigger,
            records,
            full_sync: false,
            callbacks: RunCallbacks::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Mark the request as a full sync.
    #[must_use]
    pub fn full_sync(mut self, full_sync: bool) -> Self {
        self.full_sync = full_sync;
        self
    }

    /// Attach caller hooks.
    #[must_use]
    pub fn callbacks(mut self, callbacks: RunCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Attach a cancellation token.
    #[must_use]
    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = SyncRunConfig::default();
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.batch_pause_ms, 250);
        assert_eq!(config.resolver.cache_ttl_secs, 300);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: SyncRunConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.batch_size, 50);

        let config: SyncRunConfig =
            serde_json::from_str(r#"{"batch_size": 10}"#).unwrap();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.batch_pause_ms, 250);
    }

    #[test]
    fn test_run_request_builder() {
        let request = RunRequest::new(PlatformKind::Lms, RunTrigger::Manual, vec![])
            .full_sync(true);
        assert!(request.full_sync);
        assert!(!request.cancel.is_cancelled());
    }
}
