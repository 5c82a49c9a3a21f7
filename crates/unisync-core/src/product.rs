//! Catalog products.
//!
//! Products are owned by the catalog service; the engine resolves against
//! them but never creates or mutates them.

use serde::{Deserialize, Serialize};

use crate::ids::ProductId;
use crate::platform::PlatformKind;

/// A platform offering (course, community space, subscription tier) a
/// person can enroll in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Opaque id.
    pub id: ProductId,
    /// Stable catalog code, unique per platform.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Platform the offering lives on.
    pub platform: PlatformKind,
    /// Platform-side group/category id, where the platform exposes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Whether the offering is currently sold/active.
    pub is_active: bool,
}

impl Product {
    /// Create an active product.
    #[must_use]
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        platform: PlatformKind,
    ) -> Self {
        Self {
            id: ProductId::new(),
            code: code.into(),
            name: name.into(),
            platform,
            group_id: None,
            is_active: true,
        }
    }

    /// Attach a platform group id.
    #[must_use]
    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }
}
