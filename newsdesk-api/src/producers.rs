//! Snapshot Producers
//!
//! Three independent producers recompute what the dashboard shows:
//! aggregate counters (`dashboardUpdate`), the newest articles
//! (`latestArticles`) and the newest users (`latestUsers`). Each one reads
//! the store and, on success, emits exactly one event of its type to the
//! sink it was given. A failing producer is logged and skipped; the others
//! still run. Producers never write to the store.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use newsdesk_core::DashboardEvent;
use newsdesk_storage::{ArticleQuery, DashboardStore, StoreResult, UserQuery};
use tracing::{debug, error};

use crate::telemetry::metrics;

/// Returned by an [`EventSink`] that no longer accepts events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkClosed;

/// Receiver of produced events, typically one stream session.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: DashboardEvent) -> Result<(), SinkClosed>;
}

/// The three snapshot producers, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Producer {
    DashboardUpdate,
    LatestArticles,
    LatestUsers,
}

impl Producer {
    pub const ALL: [Producer; 3] = [
        Producer::DashboardUpdate,
        Producer::LatestArticles,
        Producer::LatestUsers,
    ];

    /// Name of the event type this producer emits.
    pub fn as_str(&self) -> &'static str {
        match self {
            Producer::DashboardUpdate => "dashboardUpdate",
            Producer::LatestArticles => "latestArticles",
            Producer::LatestUsers => "latestUsers",
        }
    }
}

impl fmt::Display for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Producers bound to one data store.
#[derive(Clone)]
pub struct SnapshotProducers {
    store: Arc<dyn DashboardStore>,
    latest_limit: u32,
}

impl SnapshotProducers {
    pub fn new(store: Arc<dyn DashboardStore>, latest_limit: u32) -> Self {
        Self {
            store,
            latest_limit,
        }
    }

    pub fn store(&self) -> &Arc<dyn DashboardStore> {
        &self.store
    }

    /// Compute the event of one producer without emitting it.
    pub async fn produce(&self, producer: Producer) -> StoreResult<DashboardEvent> {
        match producer {
            Producer::DashboardUpdate => {
                let data = self.store.snapshot().await?;
                Ok(DashboardEvent::DashboardUpdate { data })
            }
            Producer::LatestArticles => {
                let articles = self
                    .store
                    .list_articles(&ArticleQuery::latest(self.latest_limit))
                    .await?;
                Ok(DashboardEvent::LatestArticles { articles })
            }
            Producer::LatestUsers => {
                let users = self
                    .store
                    .list_users(&UserQuery::latest(self.latest_limit))
                    .await?;
                Ok(DashboardEvent::LatestUsers { users })
            }
        }
    }

    /// Compute one producer's event, logging and counting a store failure.
    pub async fn produce_logged(&self, producer: Producer) -> Option<DashboardEvent> {
        match self.produce(producer).await {
            Ok(event) => Some(event),
            Err(e) => {
                error!(producer = %producer, error = %e, "Snapshot producer failed");
                if let Some(m) = metrics() {
                    m.record_producer_failure(producer.as_str());
                }
                None
            }
        }
    }

    /// Run all three producers and emit their events to `sink`.
    ///
    /// Store queries run concurrently; events are emitted in the fixed order
    /// of [`Producer::ALL`]. Returns the number of events emitted, or
    /// [`SinkClosed`] as soon as the sink stops accepting them.
    pub async fn run_all<S>(&self, sink: &S) -> Result<usize, SinkClosed>
    where
        S: EventSink + ?Sized,
    {
        let (update, articles, users) = tokio::join!(
            self.produce_logged(Producer::DashboardUpdate),
            self.produce_logged(Producer::LatestArticles),
            self.produce_logged(Producer::LatestUsers),
        );

        let mut emitted = 0;
        for event in [update, articles, users].into_iter().flatten() {
            sink.emit(event).await?;
            emitted += 1;
        }
        debug!(emitted, "Snapshot producers finished");
        Ok(emitted)
    }
}

impl fmt::Debug for SnapshotProducers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotProducers")
            .field("latest_limit", &self.latest_limit)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsdesk_core::{ArticleStatus, StoreError, UserRole};
    use newsdesk_storage::InMemoryStore;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct VecSink {
        events: Mutex<Vec<DashboardEvent>>,
        closed: bool,
    }

    #[async_trait]
    impl EventSink for VecSink {
        async fn emit(&self, event: DashboardEvent) -> Result<(), SinkClosed> {
            if self.closed {
                return Err(SinkClosed);
            }
            self.events.lock().await.push(event);
            Ok(())
        }
    }

    /// Store whose user queries always fail.
    struct NoUsers(InMemoryStore);

    #[async_trait]
    impl DashboardStore for NoUsers {
        async fn count_articles(&self, status: Option<ArticleStatus>) -> StoreResult<u64> {
            self.0.count_articles(status).await
        }
        async fn count_users(&self) -> StoreResult<u64> {
            Err(StoreError::query_failed("count_users", "relation does not exist"))
        }
        async fn count_advertisements(&self) -> StoreResult<u64> {
            self.0.count_advertisements().await
        }
        async fn sum_article_views(&self) -> StoreResult<u64> {
            self.0.sum_article_views().await
        }
        async fn sum_article_shares(&self) -> StoreResult<u64> {
            self.0.sum_article_shares().await
        }
        async fn list_articles(
            &self,
            query: &ArticleQuery,
        ) -> StoreResult<Vec<newsdesk_core::ArticleSummary>> {
            self.0.list_articles(query).await
        }
        async fn list_users(
            &self,
            _query: &UserQuery,
        ) -> StoreResult<Vec<newsdesk_core::UserSummary>> {
            Err(StoreError::query_failed("list_users", "relation does not exist"))
        }
    }

    fn seeded() -> StoreResult<InMemoryStore> {
        let store = InMemoryStore::new();
        for i in 0..3 {
            store.add_article(format!("Story {}", i), "Desk", ArticleStatus::Published)?;
        }
        store.add_article("Draft", "Desk", ArticleStatus::Pending)?;
        store.add_user("Ana", "ana@example.com", UserRole::Editor)?;
        Ok(store)
    }

    #[tokio::test]
    async fn test_run_all_emits_three_events_in_order() -> StoreResult<()> {
        let producers = SnapshotProducers::new(Arc::new(seeded()?), 5);
        let sink = VecSink::default();

        assert_eq!(producers.run_all(&sink).await, Ok(3));

        let events = sink.events.lock().await;
        let types: Vec<_> = events.iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec!["dashboardUpdate", "latestArticles", "latestUsers"]);
        match &events[0] {
            DashboardEvent::DashboardUpdate { data } => {
                assert_eq!(data.articles_count, 3);
                assert_eq!(data.pending_articles_count, 1);
                assert_eq!(data.users_count, 1);
            }
            other => panic!("unexpected event {:?}", other),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_failing_producers_do_not_block_others() -> StoreResult<()> {
        let producers = SnapshotProducers::new(Arc::new(NoUsers(seeded()?)), 5);
        let sink = VecSink::default();

        // The snapshot needs count_users, so only latestArticles survives.
        assert_eq!(producers.run_all(&sink).await, Ok(1));
        let events = sink.events.lock().await;
        assert_eq!(events[0].event_type(), "latestArticles");
        Ok(())
    }

    #[tokio::test]
    async fn test_latest_limit_applies() -> StoreResult<()> {
        let producers = SnapshotProducers::new(Arc::new(seeded()?), 2);
        match producers.produce(Producer::LatestArticles).await? {
            DashboardEvent::LatestArticles { articles } => assert_eq!(articles.len(), 2),
            other => panic!("unexpected event {:?}", other),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_closed_sink_stops_emission() -> StoreResult<()> {
        let producers = SnapshotProducers::new(Arc::new(seeded()?), 5);
        let sink = VecSink {
            closed: true,
            ..Default::default()
        };
        assert_eq!(producers.run_all(&sink).await, Err(SinkClosed));
        Ok(())
    }

    #[test]
    fn test_producer_names_match_event_types() {
        assert_eq!(Producer::ALL.len(), 3);
        assert_eq!(Producer::LatestUsers.to_string(), "latestUsers");
    }
}
