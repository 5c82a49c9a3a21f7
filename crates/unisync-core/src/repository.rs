//! Collaborator contracts.
//!
//! The engine is specified against these store-agnostic traits; concrete
//! stores (Postgres, in-memory) and platform adapters implement them. All
//! calls are potential I/O suspension points.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cohort::Cohort;
use crate::enrollment::{
    Enrollment, EnrollmentPatch, EnrollmentStatus, InactiveReason, NewEnrollment,
};
use crate::ids::{CohortId, EnrollmentId, PersonId, ProductId, RunId};
use crate::person::{NewPerson, Person, PersonPatch};
use crate::platform::PlatformKind;
use crate::product::Product;
use crate::record::SourceRecord;
use crate::run::{
    RunError, RunLogEntry, RunMeta, RunStats, RunStatus, RunWarning, SnapshotPhase, StoreSnapshot,
};

/// Errors raised by collaborator implementations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A uniqueness constraint was violated.
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// The referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The backing store failed.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl RepositoryError {
    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

/// Result type for collaborator calls.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Failure of a best-effort external notification.
#[derive(Debug, Error)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

/// Options for an adapter fetch.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FetchOptions {
    /// Fetch the complete member list instead of recent changes.
    #[serde(default)]
    pub full_sync: bool,
    /// Lower bound on record recency, for incremental fetches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
}

/// A platform adapter. Must have applied pagination and platform
/// enrichment before returning; the engine never calls a platform
/// directly.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Platform this adapter fetches from.
    fn platform(&self) -> PlatformKind;

    /// Fetch normalized records.
    async fn fetch(&self, options: FetchOptions) -> RepositoryResult<Vec<SourceRecord>>;
}

/// Store of canonical persons.
#[async_trait]
pub trait PersonRepository: Send + Sync {
    /// Look up a person by normalized email.
    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<Person>>;

    /// Create a person. Fails with [`RepositoryError::Conflict`] if the
    /// email is already taken.
    async fn create(&self, new: NewPerson) -> RepositoryResult<Person>;

    /// Apply a partial update.
    async fn update(&self, id: PersonId, patch: PersonPatch) -> RepositoryResult<Person>;

    /// Total persons in the store.
    async fn count(&self) -> RepositoryResult<u64>;
}

/// Store of person-product enrollments.
#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// Look up the enrollment for a (person, product) pair.
    async fn find_by_person_and_product(
        &self,
        person_id: PersonId,
        product_id: ProductId,
    ) -> RepositoryResult<Option<Enrollment>>;

    /// All enrollments of a person.
    async fn find_by_person(&self, person_id: PersonId) -> RepositoryResult<Vec<Enrollment>>;

    /// Create an enrollment. Fails with [`RepositoryError::Conflict`] if
    /// the (person, product) pair already exists.
    async fn create(&self, new: NewEnrollment) -> RepositoryResult<Enrollment>;

    /// Apply a partial update.
    async fn update(
        &self,
        id: EnrollmentId,
        patch: EnrollmentPatch,
    ) -> RepositoryResult<Enrollment>;

    /// Set the status of every enrollment of a person. Enrollments
    /// already in the target status are left untouched, so deactivating
    /// never relabels an earlier inactive reason. Returns the number of
    /// enrollments touched.
    async fn update_status_by_person(
        &self,
        person_id: PersonId,
        status: EnrollmentStatus,
        reason: Option<InactiveReason>,
    ) -> RepositoryResult<u64>;

    /// Active enrollments in the store.
    async fn count_active(&self) -> RepositoryResult<u64>;
}

/// Read-only product catalog.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// All active products, every platform.
    async fn list_active(&self) -> RepositoryResult<Vec<Product>>;
}

/// Store of cohorts.
#[async_trait]
pub trait CohortRepository: Send + Sync {
    /// Find a cohort by platform-native id, creating it on first sight.
    async fn find_or_create(
        &self,
        external_id: &str,
        name: &str,
        platform: PlatformKind,
    ) -> RepositoryResult<Cohort>;

    /// Count enrollments with an active membership in the cohort.
    async fn count_active_members(&self, cohort_id: CohortId) -> RepositoryResult<u32>;

    /// Refresh the cached member count.
    async fn set_member_count(&self, cohort_id: CohortId, count: u32) -> RepositoryResult<()>;

    /// Deactivate a cohort with zero active members.
    async fn deactivate(&self, cohort_id: CohortId) -> RepositoryResult<()>;
}

/// Sink for the append-only run report.
#[async_trait]
pub trait RunReportSink: Send + Sync {
    /// Open a run in `Running` status.
    async fn open(&self, meta: RunMeta) -> RepositoryResult<RunId>;

    /// Append a log entry.
    async fn append_log(&self, run_id: RunId, entry: RunLogEntry) -> RepositoryResult<()>;

    /// Append a warning entry.
    async fn append_warning(&self, run_id: RunId, entry: RunWarning) -> RepositoryResult<()>;

    /// Append an error entry.
    async fn append_error(&self, run_id: RunId, entry: RunError) -> RepositoryResult<()>;

    /// Replace the run's aggregate stats.
    async fn update_stats(&self, run_id: RunId, stats: &RunStats) -> RepositoryResult<()>;

    /// Record a before/after store snapshot.
    async fn record_snapshot(
        &self,
        run_id: RunId,
        phase: SnapshotPhase,
        snapshot: StoreSnapshot,
    ) -> RepositoryResult<()>;

    /// Fix the terminal status. The run must not be mutated afterward.
    async fn seal(&self, run_id: RunId, status: RunStatus) -> RepositoryResult<()>;
}

/// Best-effort platform-side access restoration, fired on renewal. A
/// failure is a warning, never a run error.
#[async_trait]
pub trait AccessNotifier: Send + Sync {
    /// Ask the platform collaborator to restore access (e.g. re-grant a
    /// community role).
    async fn restore_access(&self, external_id: &str, reason: &str) -> Result<(), NotifyError>;
}
