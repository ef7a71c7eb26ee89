// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Release sources for each channel and the per-channel listing cache

mod github;
mod nightly;

pub use github::GitHubSource;
pub use nightly::NightlySource;

use crate::config::ReleaseChannel;
use crate::error::{ClientError, Result};
use crate::release::{OrderingPolicy, ReleaseDescriptor};
use crate::version::VersionData;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use parking_lot::Mutex;
use std::fmt;

/// Index of published releases for one channel
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    fn channel(&self) -> ReleaseChannel;

    fn ordering(&self) -> OrderingPolicy {
        OrderingPolicy::for_channel(self.channel())
    }

    /// Fetch every release currently published on the channel.
    ///
    /// Entries that do not match the channel's naming pattern are skipped.
    async fn list(&self) -> Result<Vec<ReleaseDescriptor>>;

    /// Resolve one release by tag
    async fn fetch_by_tag(&self, tag: &str) -> Result<ReleaseDescriptor>;

    /// Canonical artifact URL for a version of this channel
    fn build_download_url(&self, version: &VersionData, built_at: Option<NaiveDateTime>) -> String;
}

/// Caching front for a [`ReleaseSource`]
///
/// Listings are fetched once per catalog; use [`ReleaseCatalog::list_uncached`]
/// or [`ReleaseCatalog::invalidate`] to go back to the network.
pub struct ReleaseCatalog {
    source: Box<dyn ReleaseSource>,
    cache: Mutex<Option<Vec<ReleaseDescriptor>>>,
}

impl fmt::Debug for ReleaseCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseCatalog")
            .field("channel", &self.source.channel())
            .field("cached", &self.cache.lock().as_ref().map(Vec::len))
            .finish()
    }
}

impl ReleaseCatalog {
    pub fn new(source: Box<dyn ReleaseSource>) -> Self {
        Self {
            source,
            cache: Mutex::new(None),
        }
    }

    pub fn source(&self) -> &dyn ReleaseSource {
        self.source.as_ref()
    }

    pub fn channel(&self) -> ReleaseChannel {
        self.source.channel()
    }

    pub async fn list(&self) -> Result<Vec<ReleaseDescriptor>> {
        let cached = self.cache.lock().clone();
        match cached {
            Some(releases) => Ok(releases),
            None => self.list_uncached().await,
        }
    }

    /// Re-fetch the listing and replace the cached copy
    pub async fn list_uncached(&self) -> Result<Vec<ReleaseDescriptor>> {
        let releases = self.source.list().await?;
        tracing::debug!(
            "Listed {} {:?} releases",
            releases.len(),
            self.source.channel()
        );
        *self.cache.lock() = Some(releases.clone());
        Ok(releases)
    }

    pub fn invalidate(&self) {
        self.cache.lock().take();
    }

    /// Listing ordered newest first under the channel's policy
    pub async fn sorted(&self) -> Result<Vec<ReleaseDescriptor>> {
        let mut releases = self.list().await?;
        self.source.ordering().sort_newest_first(&mut releases);
        Ok(releases)
    }

    pub async fn latest(&self) -> Result<ReleaseDescriptor> {
        let releases = self.list().await?;
        self.source
            .ordering()
            .latest(&releases)
            .cloned()
            .ok_or_else(|| {
                ClientError::NotFound(format!(
                    "no {:?} release available for {}",
                    self.source.channel(),
                    crate::release::ASSET_SUFFIX
                ))
            })
    }

    pub async fn fetch_by_tag(&self, tag: &str) -> Result<ReleaseDescriptor> {
        self.source.fetch_by_tag(tag).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: Arc<AtomicUsize>,
        releases: Vec<ReleaseDescriptor>,
    }

    #[async_trait]
    impl ReleaseSource for CountingSource {
        fn channel(&self) -> ReleaseChannel {
            ReleaseChannel::Stable
        }

        async fn list(&self) -> Result<Vec<ReleaseDescriptor>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.releases.clone())
        }

        async fn fetch_by_tag(&self, tag: &str) -> Result<ReleaseDescriptor> {
            Err(ClientError::NotFound(tag.to_string()))
        }

        fn build_download_url(&self, version: &VersionData, _: Option<NaiveDateTime>) -> String {
            format!("https://example.com/{version}")
        }
    }

    fn catalog(versions: &[&str]) -> (ReleaseCatalog, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let releases = versions
            .iter()
            .map(|v| {
                ReleaseDescriptor::tagged(
                    ReleaseChannel::Stable,
                    format!("https://example.com/{v}"),
                    v.parse().unwrap(),
                )
            })
            .collect();
        let source = CountingSource {
            calls: Arc::clone(&calls),
            releases,
        };
        (ReleaseCatalog::new(Box::new(source)), calls)
    }

    #[tokio::test]
    async fn test_listing_is_cached() {
        let (catalog, calls) = catalog(&["1.0.0", "1.1.0"]);

        assert_eq!(catalog.list().await.unwrap().len(), 2);
        assert_eq!(catalog.list().await.unwrap().len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        catalog.list_uncached().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        catalog.invalidate();
        catalog.list().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_latest_uses_channel_ordering() {
        let (catalog, _) = catalog(&["1.2.0rc1", "1.2.0", "1.10.0a1", "0.9.0"]);
        assert_eq!(catalog.latest().await.unwrap().release(), "1.10.0a1");

        let sorted: Vec<String> = catalog
            .sorted()
            .await
            .unwrap()
            .iter()
            .map(ReleaseDescriptor::release)
            .collect();
        assert_eq!(sorted, ["1.10.0a1", "1.2.0", "1.2.0rc1", "0.9.0"]);
    }

    #[tokio::test]
    async fn test_latest_of_empty_channel() {
        let (catalog, _) = catalog(&[]);
        assert!(matches!(
            catalog.latest().await,
            Err(ClientError::NotFound(_))
        ));
    }
}
