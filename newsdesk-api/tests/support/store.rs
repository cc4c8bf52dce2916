//! Data store fixtures for integration tests.

use std::sync::Arc;

use async_trait::async_trait;
use newsdesk_core::{ArticleStatus, ArticleSummary, StoreError, UserRole, UserSummary};
use newsdesk_storage::{ArticleQuery, DashboardStore, InMemoryStore, StoreResult, UserQuery};

/// In-memory store with `published` published articles, `pending` pending
/// articles, `users` users and `ads` advertisements.
pub fn seeded_store(
    published: usize,
    pending: usize,
    users: usize,
    ads: usize,
) -> StoreResult<Arc<InMemoryStore>> {
    let store = InMemoryStore::new();
    for i in 0..published {
        store.add_article(format!("Published {}", i), "Desk", ArticleStatus::Published)?;
    }
    for i in 0..pending {
        store.add_article(format!("Pending {}", i), "Desk", ArticleStatus::Pending)?;
    }
    for i in 0..users {
        store.add_user(
            format!("User {}", i),
            format!("user{}@example.com", i),
            UserRole::Reader,
        )?;
    }
    for _ in 0..ads {
        store.add_advertisement()?;
    }
    Ok(Arc::new(store))
}

/// Store whose every query fails as if the database were down.
#[derive(Debug, Default)]
pub struct UnavailableStore;

fn down<T>() -> StoreResult<T> {
    Err(StoreError::Unavailable {
        reason: "connection refused".to_string(),
    })
}

#[async_trait]
impl DashboardStore for UnavailableStore {
    async fn count_articles(&self, _status: Option<ArticleStatus>) -> StoreResult<u64> {
        down()
    }
    async fn count_users(&self) -> StoreResult<u64> {
        down()
    }
    async fn count_advertisements(&self) -> StoreResult<u64> {
        down()
    }
    async fn sum_article_views(&self) -> StoreResult<u64> {
        down()
    }
    async fn sum_article_shares(&self) -> StoreResult<u64> {
        down()
    }
    async fn list_articles(&self, _query: &ArticleQuery) -> StoreResult<Vec<ArticleSummary>> {
        down()
    }
    async fn list_users(&self, _query: &UserQuery) -> StoreResult<Vec<UserSummary>> {
        down()
    }
}
