//! Run report recording.
//!
//! [`RunRecorder`] is the engine's single writer to the append-only run
//! report: it opens the run, appends structured entries (mirrored to
//! `tracing`), tracks aggregate stats, invokes caller hooks and seals
//! the terminal status. Entries are also kept locally so the final
//! [`RunResult`](crate::engine::RunResult) can return them.

use chrono::Utc;
use std::sync::Arc;
use tracing::{error as log_error, info, warn as log_warn};

use unisync_core::{
    ItemOutcome, RunError, RunId, RunLogEntry, RunMeta, RunReportSink, RunStats, RunStatus,
    RunWarning, SnapshotPhase, StoreSnapshot,
};

use crate::config::RunCallbacks;
use crate::error::SyncResult;

/// Writer for one run's report.
pub struct RunRecorder {
    sink: Arc<dyn RunReportSink>,
    run_id: RunId,
    stats: RunStats,
    errors: Vec<RunError>,
    warnings: Vec<RunWarning>,
    callbacks: RunCallbacks,
}

impl RunRecorder {
    /// Open a run in `Running` status.
    pub async fn open(
        sink: Arc<dyn RunReportSink>,
        meta: RunMeta,
        callbacks: RunCallbacks,
    ) -> SyncResult<Self> {
        let run_id = sink.open(meta).await?;
        Ok(Self {
            sink,
            run_id,
            stats: RunStats::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            callbacks,
        })
    }

    /// The run id.
    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Current aggregate stats.
    #[must_use]
    pub fn stats(&self) -> RunStats {
        self.stats
    }

    /// Append a log entry.
    pub async fn log(&self, message: impl Into<String>) -> SyncResult<()> {
        let message = message.into();
        info!(run_id = %self.run_id, "{message}");
        self.sink
            .append_log(
                self.run_id,
                RunLogEntry {
                    message,
                    at: Utc::now(),
                },
            )
            .await?;
        Ok(())
    }

    /// Append a warning entry and invoke the warning hook.
    pub async fn warning(
        &mut self,
        email: Option<String>,
        message: impl Into<String>,
    ) -> SyncResult<()> {
        let entry = RunWarning {
            email,
            message: message.into(),
            at: Utc::now(),
        };
        log_warn!(run_id = %self.run_id, email = ?entry.email, "{}", entry.message);
        self.sink.append_warning(self.run_id, entry.clone()).await?;
        if let Some(ref hook) = self.callbacks.on_warning {
            hook(&entry);
        }
        self.warnings.push(entry);
        Ok(())
    }

    /// Append an error entry and invoke the error hook.
    pub async fn error(
        &mut self,
        email: Option<String>,
        message: impl Into<String>,
    ) -> SyncResult<()> {
        let entry = RunError {
            email,
            message: message.into(),
            at: Utc::now(),
        };
        log_error!(run_id = %self.run_id, email = ?entry.email, "{}", entry.message);
        self.sink.append_error(self.run_id, entry.clone()).await?;
        if let Some(ref hook) = self.callbacks.on_error {
            hook(&entry);
        }
        self.errors.push(entry);
        Ok(())
    }

    /// Record one item outcome into the aggregate stats.
    pub fn record_outcome(&mut self, outcome: ItemOutcome) {
        self.stats.record(outcome);
    }

    /// Push the aggregate stats to the sink.
    pub async fn flush_stats(&self) -> SyncResult<()> {
        self.sink.update_stats(self.run_id, &self.stats).await?;
        Ok(())
    }

    /// Record a before/after store snapshot.
    pub async fn snapshot(
        &self,
        phase: SnapshotPhase,
        snapshot: StoreSnapshot,
    ) -> SyncResult<()> {
        self.sink
            .record_snapshot(self.run_id, phase, snapshot)
            .await?;
        Ok(())
    }

    /// Invoke the progress hook.
    pub fn progress(&self, processed: u32, total: u32) {
        if let Some(ref hook) = self.callbacks.on_progress {
            hook(processed, total);
        }
    }

    /// Seal the run. The report must not be mutated afterward.
    pub async fn seal(&self, status: RunStatus) -> SyncResult<()> {
        self.flush_stats().await?;
        self.sink.seal(self.run_id, status).await?;
        info!(run_id = %self.run_id, status = %status, "Sealed sync run");
        Ok(())
    }

    /// Consume the recorder, returning the collected entries.
    #[must_use]
    pub fn into_entries(self) -> (Vec<RunError>, Vec<RunWarning>) {
        (self.errors, self.warnings)
    }
}
