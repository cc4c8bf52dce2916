//! Newsdesk API - Live Dashboard Stream
//!
//! Pushes dashboard counters and "latest" listings to connected browsers
//! over server-sent events. Each stream session receives a fresh snapshot on
//! connect, another on every tick, and any event published on the shared
//! [`EventBus`] in between. Ticks read the store directly; the paginated
//! listing routes go through the bounded query cache from `newsdesk-storage`.

#[macro_use]
mod macros;

pub mod bus;
pub mod config;
pub mod db;
pub mod error;
pub mod producers;
pub mod relay;
pub mod routes;
pub mod session;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use bus::{EventBus, PublishReport, SubscriberError, SubscriptionId};
pub use config::{ApiConfig, BusConfig, RelayConfig, StreamConfig};
pub use db::{DbConfig, PgDashboardStore, StoreBackend};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use producers::{EventSink, Producer, SinkClosed, SnapshotProducers};
pub use relay::{relay_from_config, HttpPushRelay, NoopRelay, PushRelay, RelayError};
pub use routes::create_api_router;
pub use session::{
    CloseReason, SessionError, SessionId, SessionManager, SessionState, SessionStats,
    SessionStream, StreamSession,
};
pub use state::{AppState, CachedStore, DashboardHub};
