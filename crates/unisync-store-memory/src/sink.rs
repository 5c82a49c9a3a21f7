//! In-memory run report sink.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use unisync_core::{
    RepositoryError, RepositoryResult, RunError, RunId, RunLogEntry, RunMeta, RunReportSink,
    RunStats, RunStatus, RunWarning, SnapshotPhase, StoreSnapshot, SyncRun,
};

/// Keeps every opened run in memory; sealed runs refuse further writes,
/// matching the append-only contract.
#[derive(Default)]
pub struct MemoryReportSink {
    runs: RwLock<HashMap<RunId, SyncRun>>,
}

impl MemoryReportSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a run, for assertions.
    pub async fn run(&self, run_id: RunId) -> Option<SyncRun> {
        self.runs.read().await.get(&run_id).cloned()
    }

    /// All runs, for assertions.
    pub async fn all_runs(&self) -> Vec<SyncRun> {
        self.runs.read().await.values().cloned().collect()
    }
}

impl MemoryReportSink {
    async fn with_open_run<F>(&self, run_id: RunId, f: F) -> RepositoryResult<()>
    where
        F: FnOnce(&mut SyncRun),
    {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(&run_id)
            .ok_or_else(|| RepositoryError::not_found("SyncRun", run_id.to_string()))?;
        if run.status.is_terminal() {
            return Err(RepositoryError::conflict(format!(
                "run {run_id} is sealed"
            )));
        }
        f(run);
        Ok(())
    }
}

#[async_trait]
impl RunReportSink for MemoryReportSink {
    async fn open(&self, meta: RunMeta) -> RepositoryResult<RunId> {
        let run = SyncRun {
            id: RunId::new(),
            platform: meta.platform,
            trigger: meta.trigger,
            status: RunStatus::Running,
            started_at: meta.started_at,
            completed_at: None,
            stats: RunStats::new(),
            errors: vec![],
            warnings: vec![],
            logs: vec![],
            snapshot_before: None,
            snapshot_after: None,
        };
        let id = run.id;
        self.runs.write().await.insert(id, run);
        Ok(id)
    }

    async fn append_log(&self, run_id: RunId, entry: RunLogEntry) -> RepositoryResult<()> {
        self.with_open_run(run_id, |run| run.logs.push(entry)).await
    }

    async fn append_warning(&self, run_id: RunId, entry: RunWarning) -> RepositoryResult<()> {
        self.with_open_run(run_id, |run| run.warnings.push(entry))
            .await
    }

    async fn append_error(&self, run_id: RunId, entry: RunError) -> RepositoryResult<()> {
        self.with_open_run(run_id, |run| run.errors.push(entry))
            .await
    }

    async fn update_stats(&self, run_id: RunId, stats: &RunStats) -> RepositoryResult<()> {
        let stats = *stats;
        self.with_open_run(run_id, |run| run.stats = stats).await
    }

    async fn record_snapshot(
        &self,
        run_id: RunId,
        phase: SnapshotPhase,
        snapshot: StoreSnapshot,
    ) -> RepositoryResult<()> {
        self.with_open_run(run_id, |run| match phase {
            SnapshotPhase::Before => run.snapshot_before = Some(snapshot),
            SnapshotPhase::After => run.snapshot_after = Some(snapshot),
        })
        .await
    }

    async fn seal(&self, run_id: RunId, status: RunStatus) -> RepositoryResult<()> {
        self.with_open_run(run_id, |run| {
            run.status = status;
            run.completed_at = Some(Utc::now());
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unisync_core::{PlatformKind, RunTrigger};

    fn meta() -> RunMeta {
        RunMeta {
            platform: PlatformKind::Lms,
            trigger: RunTrigger::Manual,
            started_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_sealed_run_refuses_writes() {
        let sink = MemoryReportSink::new();
        let run_id = sink.open(meta()).await.unwrap();

        sink.seal(run_id, RunStatus::Success).await.unwrap();
        let err = sink
            .append_log(
                run_id,
                RunLogEntry {
                    message: "late".to_string(),
                    at: Utc::now(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_entries_keep_order() {
        let sink = MemoryReportSink::new();
        let run_id = sink.open(meta()).await.unwrap();

        for i in 0..3 {
            sink.append_log(
                run_id,
                RunLogEntry {
                    message: format!("line {i}"),
                    at: Utc::now(),
                },
            )
            .await
            .unwrap();
        }

        let run = sink.run(run_id).await.unwrap();
        let messages: Vec<_> = run.logs.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(messages, vec!["line 0", "line 1", "line 2"]);
    }

    #[tokio::test]
    async fn test_seal_stamps_completion() {
        let sink = MemoryReportSink::new();
        let run_id = sink.open(meta()).await.unwrap();
        sink.seal(run_id, RunStatus::Partial).await.unwrap();

        let run = sink.run(run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Partial);
        assert!(run.completed_at.is_some());
    }
}
