//! In-memory [`DashboardStore`] used for development and tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use newsdesk_core::{
    new_entity_id, ArticleStatus, ArticleSummary, EntityId, StoreError, UserRole, UserSummary,
};

use crate::store::{ArticleQuery, DashboardStore, StoreResult, UserQuery};

/// Process-local store holding articles, users and advertisements in vectors.
///
/// Every query increments a counter so tests can assert how often the
/// store was actually hit behind a cache.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    articles: RwLock<Vec<ArticleSummary>>,
    users: RwLock<Vec<UserSummary>>,
    advertisements: RwLock<Vec<EntityId>>,
    queries: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_article(&self, article: ArticleSummary) -> StoreResult<EntityId> {
        let id = article.id;
        self.articles
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .push(article);
        Ok(id)
    }

    /// Insert an article with zeroed counters, created now.
    pub fn add_article(
        &self,
        title: impl Into<String>,
        author: impl Into<String>,
        status: ArticleStatus,
    ) -> StoreResult<EntityId> {
        self.insert_article(ArticleSummary {
            id: new_entity_id(),
            title: title.into(),
            author: author.into(),
            category: None,
            status,
            views: 0,
            shares: 0,
            created_at: Utc::now(),
        })
    }

    pub fn insert_user(&self, user: UserSummary) -> StoreResult<EntityId> {
        let id = user.id;
        self.users
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .push(user);
        Ok(id)
    }

    pub fn add_user(
        &self,
        name: impl Into<String>,
        email: impl Into<String>,
        role: UserRole,
    ) -> StoreResult<EntityId> {
        self.insert_user(UserSummary {
            id: new_entity_id(),
            name: name.into(),
            email: email.into(),
            role,
            created_at: Utc::now(),
        })
    }

    pub fn add_advertisement(&self) -> StoreResult<EntityId> {
        let id = new_entity_id();
        self.advertisements
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .push(id);
        Ok(id)
    }

    /// Change an article's status. Returns whether the article exists.
    pub fn set_article_status(&self, id: EntityId, status: ArticleStatus) -> StoreResult<bool> {
        let mut articles = self.articles.write().map_err(|_| StoreError::LockPoisoned)?;
        match articles.iter_mut().find(|a| a.id == id) {
            Some(article) => {
                article.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Number of queries served since construction.
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    fn record_query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }
}

/// Sort newest first and apply offset/limit.
fn page<T, F>(mut rows: Vec<T>, offset: u32, limit: u32, created_at: F) -> Vec<T>
where
    F: Fn(&T) -> chrono::DateTime<Utc>,
{
    // Reverse first so rows with equal timestamps keep newest-inserted first.
    rows.reverse();
    rows.sort_by_key(|row| std::cmp::Reverse(created_at(row)));
    rows.into_iter()
        .skip(offset as usize)
        .take(limit as usize)
        .collect()
}

#[async_trait]
impl DashboardStore for InMemoryStore {
    async fn count_articles(&self, status: Option<ArticleStatus>) -> StoreResult<u64> {
        self.record_query();
        let articles = self.articles.read().map_err(|_| StoreError::LockPoisoned)?;
        let count = articles
            .iter()
            .filter(|a| status.map_or(true, |s| a.status == s))
            .count();
        Ok(count as u64)
    }

    async fn count_users(&self) -> StoreResult<u64> {
        self.record_query();
        let users = self.users.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(users.len() as u64)
    }

    async fn count_advertisements(&self) -> StoreResult<u64> {
        self.record_query();
        let ads = self
            .advertisements
            .read()
            .map_err(|_| StoreError::LockPoisoned)?;
        Ok(ads.len() as u64)
    }

    async fn sum_article_views(&self) -> StoreResult<u64> {
        self.record_query();
        let articles = self.articles.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(articles.iter().map(|a| a.views).sum())
    }

    async fn sum_article_shares(&self) -> StoreResult<u64> {
        self.record_query();
        let articles = self.articles.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(articles.iter().map(|a| a.shares).sum())
    }

    async fn list_articles(&self, query: &ArticleQuery) -> StoreResult<Vec<ArticleSummary>> {
        self.record_query();
        let articles = self.articles.read().map_err(|_| StoreError::LockPoisoned)?;
        let matching: Vec<ArticleSummary> = articles
            .iter()
            .filter(|a| query.status.map_or(true, |s| a.status == s))
            .filter(|a| match &query.category {
                Some(category) => a.category.as_deref() == Some(category.as_str()),
                None => true,
            })
            .cloned()
            .collect();
        Ok(page(matching, query.offset, query.limit, |a| a.created_at))
    }

    async fn list_users(&self, query: &UserQuery) -> StoreResult<Vec<UserSummary>> {
        self.record_query();
        let users = self.users.read().map_err(|_| StoreError::LockPoisoned)?;
        let matching: Vec<UserSummary> = users
            .iter()
            .filter(|u| query.role.map_or(true, |r| u.role == r))
            .cloned()
            .collect();
        Ok(page(matching, query.offset, query.limit, |u| u.created_at))
    }
}
