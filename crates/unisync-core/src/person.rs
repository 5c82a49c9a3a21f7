//! Canonical person identity.
//!
//! Exactly one [`Person`] exists per normalized email. Persons are created
//! on first sight of an email, updated on every later sync, and never
//! hard-deleted by the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::PersonId;
use crate::platform::PlatformKind;

/// Lifecycle status of a person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonStatus {
    /// Person holds at least one live enrollment.
    Active,
    /// Person was deactivated, manually or by expiration.
    Inactive,
}

impl PersonStatus {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonStatus::Active => "active",
            PersonStatus::Inactive => "inactive",
        }
    }
}

impl std::fmt::Display for PersonStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-platform identity subsection on a person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformLink {
    /// Platform this link belongs to.
    pub platform: PlatformKind,
    /// Platform-native person id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Lifetime login count reported by the platform.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_logins: Option<u32>,
    /// Most recent login reported by the platform.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
    /// Most recent member action reported by the platform.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_action_at: Option<DateTime<Utc>>,
    /// When the person joined the platform.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<DateTime<Utc>>,
    /// When this link was last written by a sync run.
    pub last_synced_at: DateTime<Utc>,
}

impl PlatformLink {
    /// Create an empty link for a platform.
    #[must_use]
    pub fn new(platform: PlatformKind, now: DateTime<Utc>) -> Self {
        Self {
            platform,
            external_id: None,
            total_logins: None,
            last_login_at: None,
            last_action_at: None,
            joined_at: None,
            last_synced_at: now,
        }
    }
}

/// Manual-deactivation bookkeeping on a person.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Deactivation {
    /// Set when an operator deactivated the person by hand.
    #[serde(default)]
    pub is_manually_deactivated: bool,
    /// When the deactivation happened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deactivated_at: Option<DateTime<Utc>>,
    /// Who deactivated the person.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deactivated_by: Option<String>,
    /// Why the person was deactivated or reactivated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// When a renewal reactivated the person.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reactivated_at: Option<DateTime<Utc>>,
}

/// Canonical identity keyed by normalized email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    /// Opaque id.
    pub id: PersonId,
    /// Normalized email. Unique; immutable once created.
    pub email: String,
    /// Display name. Last write wins.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Lifecycle status.
    pub status: PersonStatus,
    /// Per-platform identity subsections.
    #[serde(default)]
    pub platform_links: Vec<PlatformLink>,
    /// Manual-deactivation bookkeeping.
    #[serde(default)]
    pub deactivation: Deactivation,
    /// Record creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl Person {
    /// The platform link for a kind, if one exists.
    #[must_use]
    pub fn platform_link(&self, platform: PlatformKind) -> Option<&PlatformLink> {
        self.platform_links.iter().find(|l| l.platform == platform)
    }

    /// Apply a typed partial update. Fields absent from the patch are
    /// left untouched; the platform link is upserted by platform kind.
    pub fn apply_patch(&mut self, patch: PersonPatch, now: DateTime<Utc>) {
        if let Some(name) = patch.display_name {
            self.display_name = Some(name);
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(link) = patch.platform_link {
            match self
                .platform_links
                .iter_mut()
                .find(|l| l.platform == link.platform)
            {
                Some(existing) => *existing = link,
                None => self.platform_links.push(link),
            }
        }
        if let Some(deactivation) = patch.deactivation {
            self.deactivation = deactivation;
        }
        self.updated_at = now;
    }
}

/// Fields for creating a person.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPerson {
    /// Normalized email.
    pub email: String,
    /// Display name, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Initial platform link, if the source platform is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_link: Option<PlatformLink>,
}

/// Typed partial update for a person. Produced by the engine's field
/// diff; an empty patch means nothing changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonPatch {
    /// New display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// New lifecycle status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PersonStatus>,
    /// Replacement platform link, upserted by platform kind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_link: Option<PlatformLink>,
    /// Replacement deactivation record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deactivation: Option<Deactivation>,
}

impl PersonPatch {
    /// Whether the patch carries no changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.status.is_none()
            && self.platform_link.is_none()
            && self.deactivation.is_none()
    }
}
