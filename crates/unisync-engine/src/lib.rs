//! # Universal Sync Engine
//!
//! Reconciliation engine for the canonical identity graph: takes a
//! normalized batch of source records, resolves each to a canonical
//! person and product enrollment, applies idempotent create/update
//! semantics with first-class change detection, deduplicates and elects
//! primary enrollments, computes per-platform engagement metrics, runs
//! the expiration/renewal state machine and emits a structured,
//! replayable run report.
//!
//! ## Pipeline
//!
//! ```text
//! ┌──────────────┐    ┌──────────────┐    ┌───────────────────────┐
//! │   Adapter    │───►│ Deduplicator │───►│  Reconciliation loop  │
//! │  (external)  │    │              │    │  (batches → items)    │
//! └──────────────┘    └──────────────┘    └──────────┬────────────┘
//!                                                    │
//!              ┌─────────────────────┬───────────────┼───────────────┐
//!              ▼                     ▼               ▼               ▼
//!      ┌──────────────┐     ┌──────────────┐  ┌────────────┐  ┌────────────┐
//!      │   Product    │     │  Engagement  │  │ Expiration │  │    Run     │
//!      │   Resolver   │     │  Calculator  │  │ / Renewal  │  │  Recorder  │
//!      └──────────────┘     └──────────────┘  └────────────┘  └────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - Re-running with identical input leaves every item `unchanged`.
//! - `stats.total == inserted + updated + unchanged + skipped + errors`.
//! - At most one primary enrollment per person on platforms that allow
//!   several concurrent enrollments.
//! - One bad item never aborts a run; only run-scoped failures do.
//!
//! ## Example
//!
//! ```ignore
//! use unisync_engine::{EngineCollaborators, RunRequest, SyncEngine};
//! use unisync_core::{PlatformKind, RunTrigger};
//!
//! let engine = SyncEngine::new(collaborators);
//! let records = adapter.fetch(Default::default()).await?;
//! let result = engine
//!     .run(RunRequest::new(PlatformKind::Lms, RunTrigger::Scheduled, records))
//!     .await?;
//! println!("{} inserted, {} errors", result.stats.inserted, result.stats.errors);
//! ```

pub mod config;
pub mod dedup;
pub mod diff;
pub mod engagement;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod lock;
pub mod report;
pub mod resolver;

// Re-exports for convenience
pub use config::{
    ErrorCallback, ProgressCallback, ResolverConfig, RunCallbacks, RunRequest, SyncRunConfig,
    WarningCallback,
};
pub use dedup::{dedupe, DedupedRecord};
pub use engagement::{calculate as calculate_engagement, EngagementInput};
pub use engine::{EngineCollaborators, RunResult, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use lifecycle::{
    apply_expirations, check_renewal, expiration_due, renewal_due, DeactivationQueue,
    ExpirationSummary, RenewalOutcome, EXPIRATION_WINDOW_DAYS,
};
pub use lock::{PlatformRunLock, RunPermit};
pub use report::RunRecorder;
pub use resolver::{ProductResolver, Resolution};
