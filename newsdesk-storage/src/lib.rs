//! Newsdesk Storage - Query Cache and Store Abstraction
//!
//! Defines the read-only [`DashboardStore`] the live dashboard queries, an
//! in-memory implementation, and the bounded FIFO query cache that shields
//! the store from repeated list queries.

pub mod cache;
pub mod caching;
pub mod memory;
pub mod store;

pub use cache::{BoundedCache, CacheConfig, CacheEntry, CacheStats, QueryCache};
pub use caching::CachingStore;
pub use memory::InMemoryStore;
pub use store::{ArticleQuery, DashboardStore, StoreResult, UserQuery};
