//! Product resolution.
//!
//! Resolves a source record to a canonical catalog product through a
//! cascading fallback chain, against a multi-keyed index of active
//! products. The index is rebuilt wholesale and cached with a short TTL
//! shared across runs; invalidation is time-based only.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use unisync_core::{
    PlatformKind, Product, ProductId, ProductRepository, SourceRecord,
};

use crate::config::ResolverConfig;
use crate::error::SyncResult;

/// Outcome of resolving one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Resolved through a deterministic key.
    Resolved(ProductId),
    /// Resolved through the ambiguous platform-default fallback; the
    /// caller should record a warning.
    Fallback(ProductId),
    /// No active product matched; the caller must skip the item.
    Unresolved,
}

impl Resolution {
    /// The resolved product id, if any.
    #[must_use]
    pub fn product_id(&self) -> Option<ProductId> {
        match self {
            Resolution::Resolved(id) | Resolution::Fallback(id) => Some(*id),
            Resolution::Unresolved => None,
        }
    }

    /// Whether the ambiguous platform default was used.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        matches!(self, Resolution::Fallback(_))
    }
}

/// Multi-keyed lookup table over active products.
struct CatalogIndex {
    by_code: HashMap<String, ProductId>,
    by_platform_code: HashMap<(PlatformKind, String), ProductId>,
    by_group: HashMap<(PlatformKind, String), ProductId>,
    /// (platform, lowercased display name, id), in catalog order.
    names: Vec<(PlatformKind, String, ProductId)>,
    first_active: HashMap<PlatformKind, ProductId>,
    product_count: usize,
}

impl CatalogIndex {
    fn build(products: &[Product]) -> Self {
        let mut index = CatalogIndex {
            by_code: HashMap::new(),
            by_platform_code: HashMap::new(),
            by_group: HashMap::new(),
            names: Vec::new(),
            first_active: HashMap::new(),
            product_count: products.len(),
        };

        for product in products {
            if !product.is_active {
                continue;
            }
            let code = product.code.to_lowercase();
            index.by_code.entry(code.clone()).or_insert(product.id);
            index
                .by_platform_code
                .entry((product.platform, code))
                .or_insert(product.id);
            if let Some(ref group_id) = product.group_id {
                index
                    .by_group
                    .entry((product.platform, group_id.clone()))
                    .or_insert(product.id);
            }
            index
                .names
                .push((product.platform, product.name.to_lowercase(), product.id));
            index.first_active.entry(product.platform).or_insert(product.id);
        }
        index
    }
}

struct CachedCatalog {
    index: CatalogIndex,
    built_at: Instant,
}

/// Resolves source records to catalog products.
pub struct ProductResolver {
    products: Arc<dyn ProductRepository>,
    ttl: Duration,
    cache: RwLock<Option<CachedCatalog>>,
}

impl ProductResolver {
    /// Create a resolver over a catalog.
    #[must_use]
    pub fn new(products: Arc<dyn ProductRepository>, config: &ResolverConfig) -> Self {
        Self {
            products,
            ttl: Duration::from_secs(config.cache_ttl_secs),
            cache: RwLock::new(None),
        }
    }

    /// Rebuild the catalog index if it is missing or older than the TTL.
    /// Returns the number of indexed products.
    pub async fn refresh(&self) -> SyncResult<usize> {
        if let Ok(guard) = self.cache.read() {
            if let Some(ref cached) = *guard {
                if cached.built_at.elapsed() < self.ttl {
                    return Ok(cached.index.product_count);
                }
            }
        }

        let products = self.products.list_active().await?;
        let index = CatalogIndex::build(&products);
        let count = index.product_count;

        if let Ok(mut guard) = self.cache.write() {
            *guard = Some(CachedCatalog {
                index,
                built_at: Instant::now(),
            });
        }

        info!(products = count, "Rebuilt product catalog index");
        Ok(count)
    }

    /// Drop the cached index. The next refresh rebuilds it.
    pub fn clear_cache(&self) {
        if let Ok(mut guard) = self.cache.write() {
            *guard = None;
        }
        debug!("Cleared product catalog cache");
    }

    /// Resolve a record to a product. First match wins:
    /// 1. Platform group id from the record's group hint.
    /// 2. Code derived from the subscription hint.
    /// 3. Case-insensitive substring match of the cohort/group name
    ///    against product display names.
    /// 4. First active product of the platform (ambiguous fallback).
    /// 5. Unresolved.
    #[must_use]
    pub fn resolve(&self, record: &SourceRecord) -> Resolution {
        let guard = match self.cache.read() {
            Ok(g) => g,
            Err(_) => return Resolution::Unresolved,
        };
        let Some(ref cached) = *guard else {
            warn!(
                platform = %record.platform,
                "Product catalog not refreshed before resolution"
            );
            return Resolution::Unresolved;
        };
        let index = &cached.index;
        let platform = record.platform;

        if platform.capabilities().group_keyed_products {
            if let Some(ref hint) = record.group_hint {
                if let Some(&id) = index.by_group.get(&(platform, hint.clone())) {
                    return Resolution::Resolved(id);
                }
            }
        }

        if let Some(hint) = record.subscription_hint {
            let code = format!("{}-{}", platform.as_str(), hint.as_str());
            if let Some(&id) = index.by_platform_code.get(&(platform, code.clone())) {
                return Resolution::Resolved(id);
            }
            if let Some(&id) = index.by_code.get(&code) {
                return Resolution::Resolved(id);
            }
        }

        if let Some(name_hint) = record.cohort_name.as_ref().or(record.group_hint.as_ref()) {
            let needle = name_hint.to_lowercase();
            if !needle.is_empty() {
                for (kind, name, id) in &index.names {
                    if *kind == platform && (name.contains(&needle) || needle.contains(name)) {
                        return Resolution::Resolved(*id);
                    }
                }
            }
        }

        if let Some(&id) = index.first_active.get(&platform) {
            debug!(
                platform = %platform,
                email = %record.normalized_email(),
                "Falling back to first active product"
            );
            return Resolution::Fallback(id);
        }

        Resolution::Unresolved
    }
}
