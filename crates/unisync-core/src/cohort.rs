//! Cohorts (class runs).
//!
//! A cohort is a named grouping referenced by enrollment memberships. The
//! engine creates cohorts lazily when first observed and deactivates a
//! cohort once an expiration pass leaves it with zero active members.

use serde::{Deserialize, Serialize};

use crate::ids::CohortId;
use crate::platform::PlatformKind;

/// A named grouping (course run, community space cohort).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cohort {
    /// Opaque id.
    pub id: CohortId,
    /// Platform-native cohort id.
    pub external_id: String,
    /// Display name.
    pub name: String,
    /// Platform the cohort lives on.
    pub platform: PlatformKind,
    /// Whether the cohort still has active members.
    pub is_active: bool,
    /// Cached count of active members, refreshed by expiration passes.
    pub active_members: u32,
}

impl Cohort {
    /// Create an active cohort.
    #[must_use]
    pub fn new(
        external_id: impl Into<String>,
        name: impl Into<String>,
        platform: PlatformKind,
    ) -> Self {
        Self {
            id: CohortId::new(),
            external_id: external_id.into(),
            name: name.into(),
            platform,
            is_active: true,
            active_members: 0,
        }
    }
}
