//! Engine error types.

use thiserror::Error;
use unisync_core::{PlatformKind, RepositoryError, RunId};

/// Errors that can occur during a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The record failed validation (missing/empty email or platform id).
    #[error("Validation failed for '{email}': {message}")]
    Validation { email: String, message: String },

    /// A collaborator call failed.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// A run for this platform is already in progress.
    #[error("A sync run is already in progress for platform {platform}")]
    AlreadyRunning { platform: PlatformKind },

    /// The run was cancelled mid-flight.
    #[error("Sync run {run_id} was cancelled")]
    Cancelled { run_id: RunId },

    /// Internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SyncError {
    /// Create a validation error.
    pub fn validation(email: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            email: email.into(),
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Item-scoped errors are caught in the per-item loop and surfaced
    /// through the run report; everything else aborts the run.
    #[must_use]
    pub fn is_item_scoped(&self) -> bool {
        matches!(
            self,
            SyncError::Validation { .. } | SyncError::Repository(_)
        )
    }

    /// Check if this error is a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled { .. })
    }
}

/// Result type for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;
