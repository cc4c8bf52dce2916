//! Stream Session Lifecycle Tests
//!
//! Drives sessions through the manager with a paused clock: the initial
//! snapshot on open, bus events between ticks, the periodic refresh, and
//! every way a session can end.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use newsdesk_api::bus::EventBus;
use newsdesk_api::config::{BusConfig, StreamConfig};
use newsdesk_api::producers::SnapshotProducers;
use newsdesk_api::session::{
    CloseReason, SessionError, SessionManager, SessionState, SessionStream,
};
use newsdesk_core::{ArticleStatus, DashboardEvent, EntityKind, UserRole, UserSummary};
use newsdesk_storage::{DashboardStore, UserQuery};
use tokio::time::{timeout, Instant};

#[allow(dead_code)]
#[path = "support/relay.rs"]
mod test_relay_support;
#[allow(dead_code)]
#[path = "support/state.rs"]
mod test_state_support;
#[allow(dead_code)]
#[path = "support/store.rs"]
mod test_store_support;

use test_relay_support::RecordingRelay;
use test_state_support::{test_state, test_state_with_relay, TICK};
use test_store_support::seeded_store;

type TestResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Longer than one tick so paused-clock waits always reach the next refresh.
const WAIT: Duration = Duration::from_secs(60);

async fn next_event(
    stream: &mut SessionStream,
) -> Result<DashboardEvent, Box<dyn std::error::Error + Send + Sync>> {
    match timeout(WAIT, stream.next()).await? {
        Some(event) => Ok(event),
        None => Err("stream ended".into()),
    }
}

async fn next_types(
    stream: &mut SessionStream,
    n: usize,
) -> Result<Vec<&'static str>, Box<dyn std::error::Error + Send + Sync>> {
    let mut types = Vec::with_capacity(n);
    for _ in 0..n {
        types.push(next_event(stream).await?.event_type());
    }
    Ok(types)
}

const SNAPSHOT_ORDER: [&str; 3] = ["dashboardUpdate", "latestArticles", "latestUsers"];

// ============================================================================
// OPENING
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_open_emits_initial_snapshot_with_store_counts() -> TestResult {
    let state = test_state(seeded_store(5, 2, 3, 1)?);
    let start = Instant::now();
    let mut stream = state.sessions.open(state.sessions.client_signal())?;

    match next_event(&mut stream).await? {
        DashboardEvent::DashboardUpdate { data } => {
            assert_eq!(data.articles_count, 5);
            assert_eq!(data.pending_articles_count, 2);
            assert_eq!(data.users_count, 3);
            assert_eq!(data.total_ads, 1);
        }
        other => return Err(format!("expected dashboardUpdate, got {:?}", other).into()),
    }
    match next_event(&mut stream).await? {
        DashboardEvent::LatestArticles { articles } => assert_eq!(articles.len(), 5),
        other => return Err(format!("expected latestArticles, got {:?}", other).into()),
    }
    match next_event(&mut stream).await? {
        DashboardEvent::LatestUsers { users } => assert_eq!(users.len(), 3),
        other => return Err(format!("expected latestUsers, got {:?}", other).into()),
    }

    assert!(start.elapsed() < TICK);
    assert_eq!(state.sessions.active_sessions(), 1);
    assert_eq!(state.bus.subscriber_count(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_aborted_open_registers_nothing() -> TestResult {
    let state = test_state(seeded_store(1, 0, 0, 0)?);
    let signal = state.sessions.client_signal();
    signal.cancel();

    let result = state.sessions.open(signal);
    assert_eq!(result.err(), Some(SessionError::AlreadyAborted));

    let stats = state.sessions.stats();
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.opened, 0);
    assert_eq!(stats.timers_armed, 0);
    assert_eq!(stats.active, 0);
    assert_eq!(state.bus.subscriber_count(), 0);
    Ok(())
}

// ============================================================================
// MERGED SOURCES
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_bus_events_arrive_between_ticks() -> TestResult {
    let state = test_state(seeded_store(2, 0, 1, 0)?);
    let start = Instant::now();
    let mut stream = state.sessions.open(state.sessions.client_signal())?;

    assert_eq!(next_types(&mut stream, 3).await?, SNAPSHOT_ORDER);

    let pushed = DashboardEvent::LatestUsers {
        users: Vec::<UserSummary>::new(),
    };
    let report = state.hub.publish(pushed.clone());
    assert_eq!(report.delivered, 1);
    assert_eq!(next_event(&mut stream).await?, pushed);
    assert!(start.elapsed() < TICK);

    // The refresh follows one period after open.
    assert_eq!(next_types(&mut stream, 3).await?, SNAPSHOT_ORDER);
    assert!(start.elapsed() >= TICK);
    assert!(start.elapsed() < TICK * 2);

    assert_eq!(next_types(&mut stream, 3).await?, SNAPSHOT_ORDER);
    assert!(start.elapsed() >= TICK * 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_mutation_republishes_before_next_tick() -> TestResult {
    let store = seeded_store(3, 0, 0, 0)?;
    let state = test_state(store.clone());
    let start = Instant::now();
    let mut stream = state.sessions.open(state.sessions.client_signal())?;
    next_types(&mut stream, 3).await?;

    store.add_article("Breaking", "Desk", ArticleStatus::Published)?;
    assert_eq!(state.hub.record_mutation(EntityKind::Article).await, 2);

    match next_event(&mut stream).await? {
        DashboardEvent::DashboardUpdate { data } => assert_eq!(data.articles_count, 4),
        other => return Err(format!("expected dashboardUpdate, got {:?}", other).into()),
    }
    match next_event(&mut stream).await? {
        DashboardEvent::LatestArticles { articles } => {
            assert_eq!(articles.len(), 4);
            assert_eq!(articles[0].title, "Breaking");
        }
        other => return Err(format!("expected latestArticles, got {:?}", other).into()),
    }
    assert!(start.elapsed() < TICK);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_tick_reflects_writes_without_mutation_hook() -> TestResult {
    let store = seeded_store(2, 0, 2, 0)?;
    let state = test_state(store.clone());

    // Warm the request-path cache with the same page the ticks read.
    let cached = state.store.list_users(&UserQuery::latest(5)).await?;
    assert_eq!(cached.len(), 2);

    let start = Instant::now();
    let mut stream = state.sessions.open(state.sessions.client_signal())?;
    assert_eq!(next_types(&mut stream, 3).await?, SNAPSHOT_ORDER);

    store.add_user("Late Joiner", "late@example.com", UserRole::Reader)?;
    store.add_article("Unannounced", "Desk", ArticleStatus::Published)?;

    match next_event(&mut stream).await? {
        DashboardEvent::DashboardUpdate { data } => {
            assert_eq!(data.users_count, 3);
            assert_eq!(data.articles_count, 3);
        }
        other => return Err(format!("expected dashboardUpdate, got {:?}", other).into()),
    }
    assert!(start.elapsed() >= TICK);
    match next_event(&mut stream).await? {
        DashboardEvent::LatestArticles { articles } => {
            assert_eq!(articles.len(), 3);
            assert_eq!(articles[0].title, "Unannounced");
        }
        other => return Err(format!("expected latestArticles, got {:?}", other).into()),
    }
    match next_event(&mut stream).await? {
        DashboardEvent::LatestUsers { users } => {
            assert_eq!(users.len(), 3);
            assert_eq!(users[0].name, "Late Joiner");
        }
        other => return Err(format!("expected latestUsers, got {:?}", other).into()),
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_back_to_back_bus_events_keep_publish_order() -> TestResult {
    let state = test_state(seeded_store(1, 0, 1, 0)?);
    let start = Instant::now();
    let mut stream = state.sessions.open(state.sessions.client_signal())?;
    assert_eq!(next_types(&mut stream, 3).await?, SNAPSHOT_ORDER);

    let first = DashboardEvent::LatestArticles { articles: vec![] };
    let second = DashboardEvent::LatestUsers {
        users: Vec::<UserSummary>::new(),
    };
    assert_eq!(state.hub.publish(first.clone()).delivered, 1);
    assert_eq!(state.hub.publish(second.clone()).delivered, 1);

    assert_eq!(next_event(&mut stream).await?, first);
    assert_eq!(next_event(&mut stream).await?, second);
    assert!(start.elapsed() < TICK);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_full_buffer_drops_bus_event_and_keeps_session() -> TestResult {
    let store = seeded_store(1, 0, 1, 0)?;
    let bus = Arc::new(EventBus::new(BusConfig::default()));
    let manager = SessionManager::new(
        Arc::clone(&bus),
        SnapshotProducers::new(store, 5),
        StreamConfig::default().with_session_buffer(1),
    );
    let mut stream = manager.open(manager.client_signal())?;

    // Let the producers fill the single slot and block on the second event.
    tokio::time::sleep(Duration::from_millis(10)).await;

    let report = bus.publish(DashboardEvent::LatestArticles { articles: vec![] });
    assert_eq!(report.failed, 1);
    assert!(!stream.session().is_closed());

    // The dropped event never shows up; the snapshot stays intact.
    assert_eq!(next_types(&mut stream, 3).await?, SNAPSHOT_ORDER);
    assert_eq!(manager.active_sessions(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_published_events_are_relayed() -> TestResult {
    let relay = Arc::new(RecordingRelay::default());
    let state = test_state_with_relay(seeded_store(0, 0, 0, 0)?, relay.clone());

    let event = DashboardEvent::LatestArticles { articles: vec![] };
    state.hub.publish(event.clone());
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(relay.forwarded(), vec![event]);
    Ok(())
}

// ============================================================================
// CLOSING
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_close_is_idempotent() -> TestResult {
    let state = test_state(seeded_store(1, 0, 0, 0)?);
    let mut stream = state.sessions.open(state.sessions.client_signal())?;
    let session = Arc::clone(stream.session());

    assert!(session.close(CloseReason::Shutdown));
    assert!(!session.close(CloseReason::ClientDisconnected));
    assert!(!session.close(CloseReason::WriteFailed));
    assert_eq!(session.state(), SessionState::Closed);

    let stats = state.sessions.stats();
    assert_eq!(stats.timers_armed, 1);
    assert_eq!(stats.timers_cleared, 1);
    assert_eq!(stats.closed, 1);
    assert_eq!(stats.active, 0);
    assert_eq!(state.bus.subscriber_count(), 0);

    assert!(stream.next().await.is_none());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_client_disconnect_closes_session() -> TestResult {
    let state = test_state(seeded_store(1, 0, 0, 0)?);
    let mut stream = state.sessions.open(state.sessions.client_signal())?;
    let session = Arc::clone(stream.session());
    next_types(&mut stream, 3).await?;

    drop(stream);
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(session.is_closed());
    assert_eq!(state.sessions.active_sessions(), 0);
    assert_eq!(state.bus.subscriber_count(), 0);

    // Nothing is delivered to a closed session, and no timer is left running.
    let report = state.hub.publish(DashboardEvent::LatestUsers { users: vec![] });
    assert_eq!(report.delivered, 0);
    let stats = state.sessions.stats();
    assert_eq!(stats.timers_armed, stats.timers_cleared);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_every_session_and_refuses_new_ones() -> TestResult {
    let state = test_state(seeded_store(1, 0, 0, 0)?);
    let mut first = state.sessions.open(state.sessions.client_signal())?;
    let mut second = state.sessions.open(state.sessions.client_signal())?;
    assert_eq!(state.bus.subscriber_count(), 2);

    assert_eq!(state.sessions.shutdown(), 2);

    assert!(first.next().await.is_none());
    assert!(second.next().await.is_none());
    assert_eq!(state.bus.subscriber_count(), 0);
    assert_eq!(
        state.sessions.open(state.sessions.client_signal()).err(),
        Some(SessionError::AlreadyAborted)
    );

    let stats = state.sessions.stats();
    assert_eq!(stats.opened, 2);
    assert_eq!(stats.closed, 2);
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.timers_armed, stats.timers_cleared);
    Ok(())
}
