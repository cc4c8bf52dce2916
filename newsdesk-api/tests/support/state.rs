//! Application state wiring for integration tests.

use std::sync::Arc;
use std::time::Duration;

use newsdesk_api::config::{ApiConfig, StreamConfig};
use newsdesk_api::relay::{NoopRelay, PushRelay};
use newsdesk_api::AppState;
use newsdesk_storage::DashboardStore;

/// Default tick interval of the dashboard stream.
pub const TICK: Duration = Duration::from_millis(5000);

pub fn test_config() -> ApiConfig {
    ApiConfig {
        stream: StreamConfig::default().with_tick_interval(TICK),
        ..ApiConfig::default()
    }
}

pub fn test_state(store: Arc<dyn DashboardStore>) -> AppState {
    test_state_with_relay(store, Arc::new(NoopRelay))
}

pub fn test_state_with_relay(store: Arc<dyn DashboardStore>, relay: Arc<dyn PushRelay>) -> AppState {
    AppState::new(test_config(), store, relay)
}
