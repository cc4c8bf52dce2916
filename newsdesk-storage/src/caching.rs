//! Read-through caching decorator for [`DashboardStore`].
//!
//! List queries are memoized in bounded [`QueryCache`]s under their
//! deterministic cache keys: each distinct query is computed once and then
//! served from memory until it is evicted or invalidated. Aggregate counters
//! always pass straight through, because the dashboard snapshot must reflect
//! the store on every tick.

use std::sync::Arc;

use async_trait::async_trait;
use newsdesk_core::{
    ArticleStatus, ArticleSummary, DashboardSnapshot, EntityKind, UserSummary,
};

use crate::cache::{CacheConfig, CacheStats, QueryCache};
use crate::store::{ArticleQuery, DashboardStore, StoreResult, UserQuery};

/// Store wrapper that caches list queries.
///
/// Failed queries are never cached. Two callers missing the same key at the
/// same moment may both reach the inner store; the later result overwrites
/// the earlier one in place without consuming an extra slot.
pub struct CachingStore<S: ?Sized> {
    inner: Arc<S>,
    articles: QueryCache<Vec<ArticleSummary>>,
    users: QueryCache<Vec<UserSummary>>,
}

impl<S> CachingStore<S>
where
    S: DashboardStore + ?Sized,
{
    pub fn new(inner: Arc<S>, config: &CacheConfig) -> Self {
        Self {
            inner,
            articles: QueryCache::new(config),
            users: QueryCache::new(config),
        }
    }

    /// Get a reference to the wrapped store.
    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }

    /// Drop every cached query over rows of `kind`. Returns the number of entries dropped.
    ///
    /// Writers call this after mutating rows so that paginated listings do not
    /// stay stale until they happen to be evicted.
    pub fn invalidate(&self, kind: EntityKind) -> usize {
        let prefix = format!("{}:", kind);
        let removed = match kind {
            EntityKind::Article => self.articles.invalidate_prefix(&prefix),
            EntityKind::User => self.users.invalidate_prefix(&prefix),
            // Advertisement counters are never cached.
            EntityKind::Advertisement => 0,
        };
        tracing::debug!(kind = %kind, removed, "Invalidated cached queries");
        removed
    }

    /// Combined statistics of the article and user caches.
    pub fn stats(&self) -> CacheStats {
        let a = self.articles.stats();
        let u = self.users.stats();
        CacheStats {
            hits: a.hits + u.hits,
            misses: a.misses + u.misses,
            entry_count: a.entry_count + u.entry_count,
            evictions: a.evictions + u.evictions,
            invalidations: a.invalidations + u.invalidations,
        }
    }
}

#[async_trait]
impl<S> DashboardStore for CachingStore<S>
where
    S: DashboardStore + ?Sized,
{
    async fn count_articles(&self, status: Option<ArticleStatus>) -> StoreResult<u64> {
        self.inner.count_articles(status).await
    }

    async fn count_users(&self) -> StoreResult<u64> {
        self.inner.count_users().await
    }

    async fn count_advertisements(&self) -> StoreResult<u64> {
        self.inner.count_advertisements().await
    }

    async fn sum_article_views(&self) -> StoreResult<u64> {
        self.inner.sum_article_views().await
    }

    async fn sum_article_shares(&self) -> StoreResult<u64> {
        self.inner.sum_article_shares().await
    }

    async fn list_articles(&self, query: &ArticleQuery) -> StoreResult<Vec<ArticleSummary>> {
        let key = query.cache_key();
        if let Some(rows) = self.articles.get(&key) {
            return Ok(rows);
        }
        let rows = self.inner.list_articles(query).await?;
        self.articles.set(key, rows.clone());
        Ok(rows)
    }

    async fn list_users(&self, query: &UserQuery) -> StoreResult<Vec<UserSummary>> {
        let key = query.cache_key();
        if let Some(rows) = self.users.get(&key) {
            return Ok(rows);
        }
        let rows = self.inner.list_users(query).await?;
        self.users.set(key, rows.clone());
        Ok(rows)
    }

    async fn snapshot(&self) -> StoreResult<DashboardSnapshot> {
        self.inner.snapshot().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use newsdesk_core::UserRole;

    fn caching(capacity: usize) -> (Arc<InMemoryStore>, CachingStore<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let cached = CachingStore::new(
            Arc::clone(&store),
            &CacheConfig::new().with_capacity(capacity),
        );
        (store, cached)
    }

    #[tokio::test]
    async fn test_list_is_computed_once_per_key() -> StoreResult<()> {
        let (store, cached) = caching(8);
        store.add_article("a", "desk", ArticleStatus::Published)?;

        let first = cached.list_articles(&ArticleQuery::latest(5)).await?;
        let second = cached.list_articles(&ArticleQuery::latest(5)).await?;
        assert_eq!(first, second);
        assert_eq!(store.query_count(), 1);

        cached
            .list_articles(&ArticleQuery::latest(5).with_offset(5))
            .await?;
        assert_eq!(store.query_count(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_counts_are_never_cached() -> StoreResult<()> {
        let (store, cached) = caching(8);
        store.add_article("a", "desk", ArticleStatus::Published)?;
        assert_eq!(cached.snapshot().await?.articles_count, 1);

        store.add_article("b", "desk", ArticleStatus::Published)?;
        assert_eq!(cached.snapshot().await?.articles_count, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_until_invalidated() -> StoreResult<()> {
        let (store, cached) = caching(8);
        store.add_user("Ana", "ana@example.com", UserRole::Reader)?;
        assert_eq!(cached.list_users(&UserQuery::latest(5)).await?.len(), 1);

        store.add_user("Ben", "ben@example.com", UserRole::Reader)?;
        assert_eq!(cached.list_users(&UserQuery::latest(5)).await?.len(), 1);

        assert_eq!(cached.invalidate(EntityKind::User), 1);
        assert_eq!(cached.list_users(&UserQuery::latest(5)).await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_invalidation_is_scoped_to_kind() -> StoreResult<()> {
        let (_store, cached) = caching(8);
        cached.list_articles(&ArticleQuery::latest(5)).await?;
        cached.list_users(&UserQuery::latest(5)).await?;

        assert_eq!(cached.invalidate(EntityKind::Advertisement), 0);
        assert_eq!(cached.invalidate(EntityKind::Article), 1);
        assert_eq!(cached.stats().entry_count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_capacity_bounds_distinct_pages() -> StoreResult<()> {
        let (store, cached) = caching(2);
        for offset in [0, 10, 20] {
            cached
                .list_articles(&ArticleQuery::latest(10).with_offset(offset))
                .await?;
        }
        assert_eq!(cached.stats().evictions, 1);

        // offset=0 was inserted first and is gone; offset=20 is still cached.
        cached
            .list_articles(&ArticleQuery::latest(10).with_offset(20))
            .await?;
        assert_eq!(store.query_count(), 3);
        cached.list_articles(&ArticleQuery::latest(10)).await?;
        assert_eq!(store.query_count(), 4);
        Ok(())
    }
}
