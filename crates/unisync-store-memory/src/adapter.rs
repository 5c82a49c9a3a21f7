//! Static source adapter.

use async_trait::async_trait;

use unisync_core::{FetchOptions, PlatformKind, RepositoryResult, SourceAdapter, SourceRecord};

/// Adapter returning a fixed record set. Stands in for a platform
/// fetcher in tests and local development.
pub struct StaticAdapter {
    platform: PlatformKind,
    records: Vec<SourceRecord>,
}

impl StaticAdapter {
    /// Create an adapter for a platform with a fixed record set.
    #[must_use]
    pub fn new(platform: PlatformKind, records: Vec<SourceRecord>) -> Self {
        Self { platform, records }
    }
}

#[async_trait]
impl SourceAdapter for StaticAdapter {
    fn platform(&self) -> PlatformKind {
        self.platform
    }

    async fn fetch(&self, _options: FetchOptions) -> RepositoryResult<Vec<SourceRecord>> {
        Ok(self.records.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_returns_records() {
        let records = vec![SourceRecord::builder("a@x.com", PlatformKind::Lms).build()];
        let adapter = StaticAdapter::new(PlatformKind::Lms, records);

        assert_eq!(adapter.platform(), PlatformKind::Lms);
        let fetched = adapter.fetch(FetchOptions::default()).await.unwrap();
        assert_eq!(fetched.len(), 1);
    }
}
