//! Bounded in-process query cache.
//!
//! The cache memoizes read-heavy queries under caller-built string keys.
//! It is bounded by entry count only: when full, inserting a new key evicts
//! the entry that was inserted first (FIFO). Reads never refresh an entry's
//! position, and there is no time-based expiry. Staleness is handled
//! explicitly through the invalidation methods, which writers call when the
//! rows behind a key change.
//!
//! [`BoundedCache`] is the single-threaded core and takes `&mut self`.
//! [`QueryCache`] wraps it in a mutex with hit/miss counters so it can be
//! shared across tokio worker threads.

pub mod bounded;
pub mod query_cache;

pub use bounded::{BoundedCache, CacheEntry};
pub use query_cache::{CacheConfig, CacheStats, QueryCache};
