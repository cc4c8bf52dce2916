//! Newsdesk Core - Dashboard Types
//!
//! Plain data types shared by the storage and API crates: the aggregate
//! dashboard snapshot, the list summaries pushed to live dashboards, the
//! wire-level event enum and the error types. No I/O lives here.

mod dashboard;
mod enums;
mod error;
mod event;

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use dashboard::{ArticleSummary, DashboardSnapshot, UserSummary};
pub use enums::{ArticleStatus, EntityKind, UserRole};
pub use error::{NewsdeskError, NewsdeskResult, StoreError};
pub use event::DashboardEvent;

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}
