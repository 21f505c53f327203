use moka::future::Cache;
use std::{
    fmt::{Debug, Formatter},
    time::Duration,
};
use tracing::debug;

const MAX_CACHED_PAGES: u64 = 1024;

/// Rendered page bodies keyed by request path and query.
///
/// Entries live for a fixed time after insertion. Writes to the store do not
/// invalidate anything, so cached bodies must not contain per-user content;
/// the navigation is rendered around them on every request.
#[derive(Clone)]
pub struct PageCache {
    pages: Cache<String, String>,
}

impl PageCache {
    #[must_use]
    pub fn new(time_to_live: Duration) -> Self {
        Self {
            pages: Cache::builder()
                .max_capacity(MAX_CACHED_PAGES)
                .time_to_live(time_to_live)
                .build(),
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let page = self.pages.get(key).await;
        debug!(key, hit = page.is_some(), "Page cache lookup");
        page
    }

    pub async fn insert(&self, key: String, page: String) {
        self.pages.insert(key, page).await;
    }

    pub fn clear(&self) {
        self.pages.invalidate_all();
    }
}

impl Debug for PageCache {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageCache")
            .field("entries", &self.pages.entry_count())
            .field("time_to_live", &self.pages.policy().time_to_live())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::server::cache::PageCache;
    use std::time::Duration;

    #[tokio::test]
    async fn keys_are_path_and_query() {
        let cache = PageCache::new(Duration::from_secs(20));
        cache.insert("/".to_owned(), "first".to_owned()).await;
        cache.insert("/?page=2".to_owned(), "second".to_owned()).await;

        assert_eq!(cache.get("/").await.as_deref(), Some("first"));
        assert_eq!(cache.get("/?page=2").await.as_deref(), Some("second"));
        assert_eq!(cache.get("/?page=3").await, None);
    }

    #[tokio::test]
    async fn clear_drops_everything() {
        let cache = PageCache::new(Duration::from_secs(20));
        cache.insert("/".to_owned(), "page".to_owned()).await;

        cache.clear();
        assert_eq!(cache.get("/").await, None);
    }

    #[tokio::test]
    async fn entries_expire() {
        let cache = PageCache::new(Duration::from_millis(50));
        cache.insert("/".to_owned(), "page".to_owned()).await;
        assert!(cache.get("/").await.is_some());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(cache.get("/").await, None);
    }
}
