//! In-memory implementations of the Universal Sync collaborator
//! contracts, for tests and local development.
//!
//! - [`MemoryStore`] - persons, enrollments, products and cohorts behind
//!   one lock, with the store-level uniqueness constraints enforced
//! - [`MemoryReportSink`] - append-only run reports, sealed runs refuse
//!   writes
//! - [`RecordingNotifier`] - records access-restoration calls, optionally
//!   failing
//! - [`StaticAdapter`] - a source adapter over a fixed record set

pub mod adapter;
pub mod notifier;
pub mod sink;
pub mod store;

pub use adapter::StaticAdapter;
pub use notifier::RecordingNotifier;
pub use sink::MemoryReportSink;
pub use store::MemoryStore;
