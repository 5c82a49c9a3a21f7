//! Person-product enrollments.
//!
//! An [`Enrollment`] associates one person with one product and carries
//! status, progress, engagement and cohort membership. Enrollments are
//! unique on `(person_id, product_id)`; among one person's enrollments on
//! a platform that allows several concurrent enrollments, at most one is
//! primary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CohortId, EnrollmentId, PersonId, ProductId};
use crate::platform::PlatformKind;

/// Status of an enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    /// Enrollment is live.
    Active,
    /// Enrollment was deactivated; see the inactive reason.
    Inactive,
}

impl EnrollmentStatus {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Inactive => "inactive",
        }
    }
}

impl std::fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why an enrollment went inactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InactiveReason {
    /// An operator deactivated the person by hand.
    Manual,
    /// The purchase aged past the expiration window.
    Expired,
}

impl InactiveReason {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            InactiveReason::Manual => "manual",
            InactiveReason::Expired => "expired",
        }
    }
}

/// Course progress on an enrollment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Completion percentage, 0-100.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    /// Most recent activity on the offering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity_at: Option<DateTime<Utc>>,
    /// Lessons completed, where the platform reports them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_lessons: Option<u32>,
}

/// Recency and engagement metrics on an enrollment. Recomputed on every
/// sync pass; never cached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Engagement {
    /// Platform engagement score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Whole days since the most recent login.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_since_last_login: Option<i64>,
    /// Whole days since the most recent member action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_since_last_action: Option<i64>,
    /// Whole days since enrollment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_since_enrollment: Option<i64>,
    /// Lifetime login count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_logins: Option<u32>,
    /// Actions in the trailing week.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions_last_week: Option<u32>,
    /// Actions in the trailing month.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions_last_month: Option<u32>,
    /// Purchase amount, where known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_value: Option<f64>,
    /// Purchase date, where known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_date: Option<DateTime<Utc>>,
}

/// Membership of an enrollment in a cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortMembership {
    /// The cohort.
    pub cohort_id: CohortId,
    /// When the person joined the cohort.
    pub joined_at: DateTime<Utc>,
    /// When the person left, if they have.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_at: Option<DateTime<Utc>>,
}

/// Association between one person and one product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    /// Opaque id.
    pub id: EnrollmentId,
    /// The enrolled person.
    pub person_id: PersonId,
    /// The product enrolled in.
    pub product_id: ProductId,
    /// Platform the enrollment lives on.
    pub platform: PlatformKind,
    /// Platform-native enrollment id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Status.
    pub status: EnrollmentStatus,
    /// Why the enrollment is inactive, when it is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inactive_reason: Option<InactiveReason>,
    /// When the person enrolled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrolled_at: Option<DateTime<Utc>>,
    /// Course progress.
    #[serde(default)]
    pub progress: Progress,
    /// Recency and engagement metrics.
    #[serde(default)]
    pub engagement: Engagement,
    /// Canonical enrollment among several on the same platform.
    pub is_primary: bool,
    /// Cohort memberships.
    #[serde(default)]
    pub cohort_memberships: Vec<CohortMembership>,
    /// Record creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl Enrollment {
    /// Whether the enrollment is live.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == EnrollmentStatus::Active
    }

    /// Membership record for a cohort, if one exists.
    #[must_use]
    pub fn cohort_membership(&self, cohort_id: CohortId) -> Option<&CohortMembership> {
        self.cohort_memberships
            .iter()
            .find(|m| m.cohort_id == cohort_id)
    }

    /// Apply a typed partial update. Fields absent from the patch are
    /// left untouched; cohort memberships are upserted by cohort id.
    pub fn apply_patch(&mut self, patch: EnrollmentPatch, now: DateTime<Utc>) {
        if let Some(status) = patch.status {
            self.status = status;
            if status == EnrollmentStatus::Active {
                self.inactive_reason = None;
            }
        }
        if let Some(reason) = patch.inactive_reason {
            self.inactive_reason = Some(reason);
        }
        if let Some(external_id) = patch.external_id {
            self.external_id = Some(external_id);
        }
        if let Some(enrolled_at) = patch.enrolled_at {
            self.enrolled_at = Some(enrolled_at);
        }
        if let Some(progress) = patch.progress {
            self.progress = progress;
        }
        if let Some(engagement) = patch.engagement {
            self.engagement = engagement;
        }
        if let Some(is_primary) = patch.is_primary {
            self.is_primary = is_primary;
        }
        if let Some(membership) = patch.cohort_membership {
            match self
                .cohort_memberships
                .iter_mut()
                .find(|m| m.cohort_id == membership.cohort_id)
            {
                Some(existing) => *existing = membership,
                None => self.cohort_memberships.push(membership),
            }
        }
        self.updated_at = now;
    }
}

/// Fields for creating an enrollment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEnrollment {
    /// The enrolled person.
    pub person_id: PersonId,
    /// The product enrolled in.
    pub product_id: ProductId,
    /// Platform the enrollment lives on.
    pub platform: PlatformKind,
    /// Platform-native enrollment id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// When the person enrolled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrolled_at: Option<DateTime<Utc>>,
    /// Whether this enrollment is the person's primary on the platform.
    pub is_primary: bool,
}

/// Typed partial update for an enrollment. Produced by the engine's
/// field diff; an empty patch means nothing changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrollmentPatch {
    /// New status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<EnrollmentStatus>,
    /// New inactive reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inactive_reason: Option<InactiveReason>,
    /// New platform-native enrollment id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// New enrollment date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrolled_at: Option<DateTime<Utc>>,
    /// Replacement progress.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    /// Replacement engagement metrics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engagement: Option<Engagement>,
    /// New primacy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_primary: Option<bool>,
    /// Cohort membership to upsert.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cohort_membership: Option<CohortMembership>,
}

impl EnrollmentPatch {
    /// Whether the patch carries no changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.inactive_reason.is_none()
            && self.external_id.is_none()
            && self.enrolled_at.is_none()
            && self.progress.is_none()
            && self.engagement.is_none()
            && self.is_primary.is_none()
            && self.cohort_membership.is_none()
    }
}
