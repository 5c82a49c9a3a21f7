//! Sync run reports.
//!
//! A [`SyncRun`] is the structured, replayable record of one engine
//! invocation: stats, ordered logs/warnings/errors, before/after store
//! snapshots and a terminal status. Runs are append-only while running
//! and sealed at completion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::RunId;
use crate::platform::PlatformKind;

/// What triggered a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    /// An operator started the run by hand.
    Manual,
    /// The scheduler started the run.
    Scheduled,
    /// A platform webhook started the run.
    Webhook,
}

impl RunTrigger {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RunTrigger::Manual => "manual",
            RunTrigger::Scheduled => "scheduled",
            RunTrigger::Webhook => "webhook",
        }
    }
}

impl fmt::Display for RunTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RunTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manual" => Ok(RunTrigger::Manual),
            "scheduled" => Ok(RunTrigger::Scheduled),
            "webhook" => Ok(RunTrigger::Webhook),
            _ => Err(format!("Unknown run trigger: {s}")),
        }
    }
}

/// Status of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run is in progress.
    Running,
    /// Run completed with zero item errors.
    Success,
    /// Run completed with some, but not all, items in error.
    Partial,
    /// Every item errored, a run-scoped failure occurred, or the run was
    /// cancelled.
    Failed,
}

impl RunStatus {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }

    /// Whether the status is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    /// Derive the terminal status from item outcome counts.
    #[must_use]
    pub fn from_outcome_counts(errors: u32, total: u32) -> Self {
        if errors == 0 {
            RunStatus::Success
        } else if errors < total {
            RunStatus::Partial
        } else {
            RunStatus::Failed
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "partial" => Ok(RunStatus::Partial),
            "failed" => Ok(RunStatus::Failed),
            _ => Err(format!("Unknown run status: {s}")),
        }
    }
}

/// Classification of one processed item. Exactly one per item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    /// A person or enrollment was newly created.
    Inserted,
    /// At least one field changed.
    Updated,
    /// Nothing changed.
    Unchanged,
    /// The item failed validation or product resolution.
    Skipped,
    /// Processing threw an error.
    Errored,
}

impl ItemOutcome {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemOutcome::Inserted => "inserted",
            ItemOutcome::Updated => "updated",
            ItemOutcome::Unchanged => "unchanged",
            ItemOutcome::Skipped => "skipped",
            ItemOutcome::Errored => "errored",
        }
    }
}

impl fmt::Display for ItemOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggregate counts for one run. The conservation law
/// `total == inserted + updated + unchanged + skipped + errors` holds at
/// every point during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Items consumed from the deduplicated input.
    #[serde(default)]
    pub total: u32,
    /// Items that created a person or enrollment.
    #[serde(default)]
    pub inserted: u32,
    /// Items that changed at least one field.
    #[serde(default)]
    pub updated: u32,
    /// Items that changed nothing.
    #[serde(default)]
    pub unchanged: u32,
    /// Items skipped on validation/resolution failure.
    #[serde(default)]
    pub skipped: u32,
    /// Items that errored.
    #[serde(default)]
    pub errors: u32,
}

impl RunStats {
    /// Create empty stats.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one item outcome.
    pub fn record(&mut self, outcome: ItemOutcome) {
        self.total += 1;
        match outcome {
            ItemOutcome::Inserted => self.inserted += 1,
            ItemOutcome::Updated => self.updated += 1,
            ItemOutcome::Unchanged => self.unchanged += 1,
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Errored => self.errors += 1,
        }
    }

    /// Check the conservation law.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.total == self.inserted + self.updated + self.unchanged + self.skipped + self.errors
    }

    /// Merge with another stats instance.
    pub fn merge(&mut self, other: &RunStats) {
        self.total += other.total;
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }
}

/// A structured error entry appended to a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunError {
    /// Normalized email of the affected item, where known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// What went wrong.
    pub message: String,
    /// When the entry was appended.
    pub at: DateTime<Utc>,
}

/// A structured warning entry appended to a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunWarning {
    /// Normalized email of the affected item, where known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// What to look at.
    pub message: String,
    /// When the entry was appended.
    pub at: DateTime<Utc>,
}

/// A structured log entry appended to a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLogEntry {
    /// The log line.
    pub message: String,
    /// When the entry was appended.
    pub at: DateTime<Utc>,
}

/// Aggregate store counts captured at run start and run end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Persons in the store.
    pub persons: u64,
    /// Active enrollments in the store.
    pub active_enrollments: u64,
}

/// Which end of the run a snapshot was captured at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotPhase {
    /// Captured before the first batch.
    Before,
    /// Captured after the deferred expiration pass.
    After,
}

/// Metadata for opening a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    /// Platform the run syncs.
    pub platform: PlatformKind,
    /// What triggered the run.
    pub trigger: RunTrigger,
    /// When the run started.
    pub started_at: DateTime<Utc>,
}

/// One engine invocation and its sealed report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRun {
    /// Run id.
    pub id: RunId,
    /// Platform the run synced.
    pub platform: PlatformKind,
    /// What triggered the run.
    pub trigger: RunTrigger,
    /// Status; fixed once sealed.
    pub status: RunStatus,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run sealed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Aggregate counts.
    pub stats: RunStats,
    /// Ordered error entries.
    #[serde(default)]
    pub errors: Vec<RunError>,
    /// Ordered warning entries.
    #[serde(default)]
    pub warnings: Vec<RunWarning>,
    /// Ordered log entries.
    #[serde(default)]
    pub logs: Vec<RunLogEntry>,
    /// Store counts at run start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_before: Option<StoreSnapshot>,
    /// Store counts at run end.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_after: Option<StoreSnapshot>,
}
