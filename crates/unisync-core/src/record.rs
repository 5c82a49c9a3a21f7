//! Normalized source records.
//!
//! A [`SourceRecord`] is one fact from one platform about one person at
//! one point in time, produced by a platform adapter after pagination and
//! enrichment. Records are consumed once per sync run and never persisted
//! verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::platform::PlatformKind;

/// Subscription type reported by a platform, used as a product
/// resolution hint when no group id is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionHint {
    /// Monthly recurring subscription.
    Monthly,
    /// Annual recurring subscription.
    Annual,
}

impl SubscriptionHint {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionHint::Monthly => "monthly",
            SubscriptionHint::Annual => "annual",
        }
    }
}

impl std::fmt::Display for SubscriptionHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One normalized fact from one platform about one person.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Identity key. Matched case- and whitespace-insensitively.
    pub email: String,
    /// Display name as reported by the platform.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Platform this record originates from.
    pub platform: PlatformKind,
    /// Platform-native person id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Platform-native enrollment id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_enrollment_id: Option<String>,
    /// When the person enrolled in the offering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrolled_at: Option<DateTime<Utc>>,
    /// When the person purchased access.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchased_at: Option<DateTime<Utc>>,
    /// Purchase amount in the platform's currency.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_value: Option<f64>,
    /// Most recent login, for login-tracked platforms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
    /// Most recent member action, for action-tracked platforms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_action_at: Option<DateTime<Utc>>,
    /// Course progress, 0-100.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percentage: Option<f64>,
    /// Engagement score on the platform's own scale.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engagement_score: Option<f64>,
    /// Platform group/category id used for product resolution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_hint: Option<String>,
    /// Subscription type, used for product resolution when no group id
    /// is available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_hint: Option<SubscriptionHint>,
    /// Primacy already determined by the adapter, if it knows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_hint: Option<bool>,
    /// Platform-native cohort id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cohort_id: Option<String>,
    /// Human-readable cohort name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cohort_name: Option<String>,
    /// Lifetime login count, for login-tracked platforms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_logins: Option<u32>,
    /// Actions in the trailing week, for action-tracked platforms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions_last_week: Option<u32>,
    /// Actions in the trailing month, for action-tracked platforms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions_last_month: Option<u32>,
}

impl SourceRecord {
    /// Create a builder with the required identity fields.
    #[must_use]
    pub fn builder(email: impl Into<String>, platform: PlatformKind) -> SourceRecordBuilder {
        SourceRecordBuilder::new(email, platform)
    }

    /// Email normalized for identity matching: trimmed and lowercased.
    #[must_use]
    pub fn normalized_email(&self) -> String {
        normalize_email(&self.email)
    }

    /// Whether the record carries a usable identity key.
    #[must_use]
    pub fn has_identity(&self) -> bool {
        !self.normalized_email().is_empty()
    }
}

/// Normalize an email for identity matching.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Builder for [`SourceRecord`].
#[derive(Debug, Clone)]
pub struct SourceRecordBuilder {
    record: SourceRecord,
}

impl SourceRecordBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new(email: impl Into<String>, platform: PlatformKind) -> Self {
        Self {
            record: SourceRecord {
                email: email.into(),
                display_name: None,
                platform,
                external_id: None,
                external_enrollment_id: None,
                enrolled_at: None,
                purchased_at: None,
                purchase_value: None,
                last_login_at: None,
                last_action_at: None,
                progress_percentage: None,
                engagement_score: None,
                group_hint: None,
                subscription_hint: None,
                primary_hint: None,
                cohort_id: None,
                cohort_name: None,
                total_logins: None,
                actions_last_week: None,
                actions_last_month: None,
            },
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.record.display_name = Some(name.into());
        self
    }

    /// Set the platform-native person id.
    #[must_use]
    pub fn external_id(mut self, id: impl Into<String>) -> Self {
        self.record.external_id = Some(id.into());
        self
    }

    /// Set the platform-native enrollment id.
    #[must_use]
    pub fn external_enrollment_id(mut self, id: impl Into<String>) -> Self {
        self.record.external_enrollment_id = Some(id.into());
        self
    }

    /// Set the enrollment date.
    #[must_use]
    pub fn enrolled_at(mut self, at: DateTime<Utc>) -> Self {
        self.record.enrolled_at = Some(at);
        self
    }

    /// Set the purchase date.
    #[must_use]
    pub fn purchased_at(mut self, at: DateTime<Utc>) -> Self {
        self.record.purchased_at = Some(at);
        self
    }

    /// Set the purchase amount.
    #[must_use]
    pub fn purchase_value(mut self, value: f64) -> Self {
        self.record.purchase_value = Some(value);
        self
    }

    /// Set the most recent login.
    #[must_use]
    pub fn last_login_at(mut self, at: DateTime<Utc>) -> Self {
        self.record.last_login_at = Some(at);
        self
    }

    /// Set the most recent action.
    #[must_use]
    pub fn last_action_at(mut self, at: DateTime<Utc>) -> Self {
        self.record.last_action_at = Some(at);
        self
    }

    /// Set the course progress percentage.
    #[must_use]
    pub fn progress_percentage(mut self, pct: f64) -> Self {
        self.record.progress_percentage = Some(pct);
        self
    }

    /// Set the platform engagement score.
    #[must_use]
    pub fn engagement_score(mut self, score: f64) -> Self {
        self.record.engagement_score = Some(score);
        self
    }

    /// Set the product resolution group hint.
    #[must_use]
    pub fn group_hint(mut self, hint: impl Into<String>) -> Self {
        self.record.group_hint = Some(hint.into());
        self
    }

    /// Set the subscription type hint.
    #[must_use]
    pub fn subscription_hint(mut self, hint: SubscriptionHint) -> Self {
        self.record.subscription_hint = Some(hint);
        self
    }

    /// Set the adapter-determined primacy.
    #[must_use]
    pub fn primary_hint(mut self, primary: bool) -> Self {
        self.record.primary_hint = Some(primary);
        self
    }

    /// Set the cohort id and name.
    #[must_use]
    pub fn cohort(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.record.cohort_id = Some(id.into());
        self.record.cohort_name = Some(name.into());
        self
    }

    /// Set the lifetime login count.
    #[must_use]
    pub fn total_logins(mut self, count: u32) -> Self {
        self.record.total_logins = Some(count);
        self
    }

    /// Set trailing action counts.
    #[must_use]
    pub fn action_counts(mut self, last_week: u32, last_month: u32) -> Self {
        self.record.actions_last_week = Some(last_week);
        self.record.actions_last_month = Some(last_month);
        self
    }

    /// Build the record.
    #[must_use]
    pub fn build(self) -> SourceRecord {
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_email() {
        let record = SourceRecord::builder("  Alice@Example.COM ", PlatformKind::Lms).build();
        assert_eq!(record.normalized_email(), "alice@example.com");
        assert!(record.has_identity());
    }

    #[test]
    fn test_missing_identity() {
        let record = SourceRecord::builder("   ", PlatformKind::Community).build();
        assert!(!record.has_identity());
    }

    #[test]
    fn test_builder_sets_fields() {
        let record = SourceRecord::builder("a@x.com", PlatformKind::Community)
            .display_name("A")
            .external_id("ext-1")
            .group_hint("space-42")
            .subscription_hint(SubscriptionHint::Annual)
            .cohort("c-1", "Spring Cohort")
            .action_counts(3, 12)
            .build();

        assert_eq!(record.display_name.as_deref(), Some("A"));
        assert_eq!(record.external_id.as_deref(), Some("ext-1"));
        assert_eq!(record.group_hint.as_deref(), Some("space-42"));
        assert_eq!(record.subscription_hint, Some(SubscriptionHint::Annual));
        assert_eq!(record.cohort_id.as_deref(), Some("c-1"));
        assert_eq!(record.actions_last_week, Some(3));
        assert_eq!(record.actions_last_month, Some(12));
    }
}
