//! Data store abstraction for dashboard reads.
//!
//! The relational schema and its access layer live outside this subsystem.
//! Everything the dashboard needs from them is expressed by
//! [`DashboardStore`]: a handful of read-only aggregate queries plus two
//! paginated list queries. Implementations must be pure reads.

use async_trait::async_trait;
use newsdesk_core::{
    ArticleStatus, ArticleSummary, DashboardSnapshot, EntityKind, StoreError, UserRole,
    UserSummary,
};

/// Result alias for store reads.
pub type StoreResult<T> = Result<T, StoreError>;

/// Parameters of a paginated article listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleQuery {
    pub offset: u32,
    pub limit: u32,
    pub category: Option<String>,
    pub status: Option<ArticleStatus>,
}

impl ArticleQuery {
    /// The `limit` newest articles regardless of status or category.
    pub fn latest(limit: u32) -> Self {
        Self {
            offset: 0,
            limit,
            category: None,
            status: None,
        }
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_status(mut self, status: ArticleStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Deterministic cache key covering every parameter that affects the result.
    ///
    /// The category is length-prefixed so a category containing the field
    /// separator cannot forge another query's key.
    pub fn cache_key(&self) -> String {
        format!(
            "{}:list:offset={}:limit={}:category={}:status={}",
            EntityKind::Article,
            self.offset,
            self.limit,
            self.category
                .as_deref()
                .map(|c| format!("{}#{}", c.len(), c))
                .unwrap_or_else(|| "*".to_string()),
            self.status.map(|s| s.as_str()).unwrap_or("*"),
        )
    }
}

/// Parameters of a paginated user listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserQuery {
    pub offset: u32,
    pub limit: u32,
    pub role: Option<UserRole>,
}

impl UserQuery {
    pub fn latest(limit: u32) -> Self {
        Self {
            offset: 0,
            limit,
            role: None,
        }
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_role(mut self, role: UserRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn cache_key(&self) -> String {
        format!(
            "{}:list:offset={}:limit={}:role={}",
            EntityKind::User,
            self.offset,
            self.limit,
            self.role.map(|r| r.as_str()).unwrap_or("*"),
        )
    }
}

/// Read-only queries the live dashboard issues against the data store.
#[async_trait]
pub trait DashboardStore: Send + Sync {
    /// Count articles, optionally restricted to one status.
    async fn count_articles(&self, status: Option<ArticleStatus>) -> StoreResult<u64>;

    async fn count_users(&self) -> StoreResult<u64>;

    async fn count_advertisements(&self) -> StoreResult<u64>;

    /// Sum of the per-article view counters.
    async fn sum_article_views(&self) -> StoreResult<u64>;

    /// Sum of the per-article share counters.
    async fn sum_article_shares(&self) -> StoreResult<u64>;

    /// Articles ordered newest first.
    async fn list_articles(&self, query: &ArticleQuery) -> StoreResult<Vec<ArticleSummary>>;

    /// Users ordered newest first.
    async fn list_users(&self, query: &UserQuery) -> StoreResult<Vec<UserSummary>>;

    /// Compute the full dashboard snapshot.
    ///
    /// The default issues one query per counter; stores that can answer in
    /// a single round trip should override it.
    async fn snapshot(&self) -> StoreResult<DashboardSnapshot> {
        Ok(DashboardSnapshot {
            articles_count: self.count_articles(Some(ArticleStatus::Published)).await?,
            users_count: self.count_users().await?,
            pending_articles_count: self.count_articles(Some(ArticleStatus::Pending)).await?,
            total_views: self.sum_article_views().await?,
            total_ads: self.count_advertisements().await?,
            total_shares: self.sum_article_shares().await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_article_cache_key_covers_every_parameter() {
        let base = ArticleQuery::latest(10);
        let keys = [
            base.cache_key(),
            base.clone().with_offset(10).cache_key(),
            base.clone().with_category("sport").cache_key(),
            base.clone().with_status(ArticleStatus::Pending).cache_key(),
            ArticleQuery::latest(20).cache_key(),
        ];
        for (i, a) in keys.iter().enumerate() {
            assert!(a.starts_with("article:"));
            for b in keys.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_category_cannot_forge_another_key() {
        let sneaky = ArticleQuery::latest(5).with_category("x:status=pending");
        let honest = ArticleQuery::latest(5)
            .with_category("x")
            .with_status(ArticleStatus::Pending);
        assert_ne!(sneaky.cache_key(), honest.cache_key());
    }

    #[test]
    fn test_user_cache_key() {
        assert_eq!(
            UserQuery::latest(5).cache_key(),
            "user:list:offset=0:limit=5:role=*"
        );
        assert_eq!(
            UserQuery::latest(5).with_role(UserRole::Admin).cache_key(),
            "user:list:offset=0:limit=5:role=admin"
        );
    }
}
