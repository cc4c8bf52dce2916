//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use newsdesk_core::{DashboardEvent, EntityKind};
use newsdesk_storage::{CacheStats, CachingStore, DashboardStore};

use crate::bus::{EventBus, PublishReport};
use crate::config::ApiConfig;
use crate::producers::{Producer, SnapshotProducers};
use crate::relay::PushRelay;
use crate::session::SessionManager;

/// Store as seen by request handlers: list queries go through the query cache.
///
/// Snapshot producers read the uncached store so every tick reflects the
/// current rows.
pub type CachedStore = CachingStore<dyn DashboardStore>;

/// Entry point for the rest of the server to notify open dashboards.
///
/// Mutation handlers call [`record_mutation`](Self::record_mutation) after
/// writing rows; it drops the cached listings for that kind and publishes
/// fresh events so dashboards update before the next tick. Dashboards that
/// nobody notifies still catch up on the next tick.
pub struct DashboardHub {
    store: Arc<CachedStore>,
    bus: Arc<EventBus>,
    producers: SnapshotProducers,
}

impl DashboardHub {
    pub fn new(store: Arc<CachedStore>, bus: Arc<EventBus>, producers: SnapshotProducers) -> Self {
        Self {
            store,
            bus,
            producers,
        }
    }

    /// Publish an event to every open dashboard.
    pub fn publish(&self, event: DashboardEvent) -> PublishReport {
        self.bus.publish(event)
    }

    /// Invalidate cached queries over `kind` and republish what changed.
    ///
    /// Returns the number of events published. Producer failures are logged
    /// and skipped like they are on a tick.
    pub async fn record_mutation(&self, kind: EntityKind) -> usize {
        let invalidated = self.store.invalidate(kind);

        let affected: &[Producer] = match kind {
            EntityKind::Article => &[Producer::DashboardUpdate, Producer::LatestArticles],
            EntityKind::User => &[Producer::DashboardUpdate, Producer::LatestUsers],
            EntityKind::Advertisement => &[Producer::DashboardUpdate],
        };

        let mut published = 0;
        for producer in affected {
            if let Some(event) = self.producers.produce_logged(*producer).await {
                self.bus.publish(event);
                published += 1;
            }
        }

        tracing::info!(
            kind = %kind,
            invalidated,
            published,
            "Recorded dashboard mutation"
        );
        published
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.store.stats()
    }
}

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub store: Arc<CachedStore>,
    pub bus: Arc<EventBus>,
    pub hub: Arc<DashboardHub>,
    pub sessions: Arc<SessionManager>,
    pub start_time: Instant,
}

impl AppState {
    /// Wire the bus, cache, producers and session manager around `store`.
    pub fn new(config: ApiConfig, store: Arc<dyn DashboardStore>, relay: Arc<dyn PushRelay>) -> Self {
        let cached: Arc<CachedStore> = Arc::new(CachingStore::new(Arc::clone(&store), &config.cache));
        let bus = Arc::new(EventBus::with_relay(config.bus.clone(), relay));

        let producers = SnapshotProducers::new(store, config.stream.latest_limit);
        let hub = Arc::new(DashboardHub::new(
            Arc::clone(&cached),
            Arc::clone(&bus),
            producers.clone(),
        ));
        let sessions = Arc::new(SessionManager::new(
            Arc::clone(&bus),
            producers,
            config.stream.clone(),
        ));

        Self {
            config: Arc::new(config),
            store: cached,
            bus,
            hub,
            sessions,
            start_time: Instant::now(),
        }
    }
}

// Use macro to reduce boilerplate for FromRef implementations
crate::impl_from_ref!(Arc<EventBus>, bus);
crate::impl_from_ref!(Arc<DashboardHub>, hub);
crate::impl_from_ref!(Arc<SessionManager>, sessions);
crate::impl_from_ref!(Arc<CachedStore>, store);
crate::impl_from_ref!(Instant, start_time);
