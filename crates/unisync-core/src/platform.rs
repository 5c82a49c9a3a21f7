//! Platform kinds and their capability table.
//!
//! Every behavioral difference between source platforms is declared here
//! as data. Engine components consult [`PlatformCapabilities`] instead of
//! branching on the platform kind at each call site, so adding a platform
//! means adding one table entry.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of external platform a source record originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformKind {
    /// Learning management platform. Tracks logins and course progress;
    /// one person may hold several concurrent course enrollments.
    Lms,
    /// Community platform. Tracks member actions and cohort (space)
    /// membership; enrollments expire a fixed window after purchase.
    Community,
    /// Commerce platform. Supplies purchase records only.
    Commerce,
}

impl PlatformKind {
    /// All known platform kinds.
    pub const ALL: [PlatformKind; 3] = [
        PlatformKind::Lms,
        PlatformKind::Community,
        PlatformKind::Commerce,
    ];

    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKind::Lms => "lms",
            PlatformKind::Community => "community",
            PlatformKind::Commerce => "commerce",
        }
    }

    /// Capability table entry for this platform.
    #[must_use]
    pub fn capabilities(&self) -> PlatformCapabilities {
        match self {
            PlatformKind::Lms => PlatformCapabilities {
                tracks_logins: true,
                tracks_actions: false,
                multiple_enrollments: true,
                purchase_expiration: false,
                group_keyed_products: true,
            },
            PlatformKind::Community => PlatformCapabilities {
                tracks_logins: false,
                tracks_actions: true,
                multiple_enrollments: false,
                purchase_expiration: true,
                group_keyed_products: true,
            },
            PlatformKind::Commerce => PlatformCapabilities {
                tracks_logins: false,
                tracks_actions: false,
                multiple_enrollments: false,
                purchase_expiration: false,
                group_keyed_products: false,
            },
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PlatformKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lms" => Ok(PlatformKind::Lms),
            "community" => Ok(PlatformKind::Community),
            "commerce" => Ok(PlatformKind::Commerce),
            _ => Err(format!("Unknown platform kind: {s}")),
        }
    }
}

/// What a platform supports, consulted by the engine instead of ad hoc
/// per-platform branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformCapabilities {
    /// Platform reports member logins.
    pub tracks_logins: bool,
    /// Platform reports member actions (posts, comments, reactions).
    pub tracks_actions: bool,
    /// One person may hold several concurrent enrollments; the
    /// primary/secondary rule applies.
    pub multiple_enrollments: bool,
    /// Enrollments expire a fixed window after the purchase date and may
    /// be renewed.
    pub purchase_expiration: bool,
    /// Products are resolvable by a platform-side group/category id.
    pub group_keyed_products: bool,
}
