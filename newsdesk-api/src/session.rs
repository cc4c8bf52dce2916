//! Dashboard Stream Sessions
//!
//! A stream session is one client's long-lived server-push connection. It
//! merges three sources onto a single outbound event sequence:
//!
//! - the snapshot producers, run once on open and again on every timer tick
//! - events published on the [`EventBus`]
//! - the client's cancellation signal, which ends everything
//!
//! ## Lifecycle
//!
//! ```text
//! Opening -> Active -> Closing -> Closed
//!    |                              ^
//!    +---- signal already fired ----+
//! ```
//!
//! Every emission goes through the session's bounded channel, which the
//! HTTP response drains as the single writer. Closing clears the timer,
//! unsubscribes from the bus, marks the session closed and releases the
//! channel, exactly once no matter how many paths ask for it.

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use newsdesk_core::DashboardEvent;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_stream::{wrappers::ReceiverStream, Stream};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bus::{EventBus, SubscriberError, SubscriptionId};
use crate::config::StreamConfig;
use crate::producers::{EventSink, SinkClosed, SnapshotProducers};
use crate::telemetry::metrics;

/// Identifier of one stream session (UUIDv7).
pub type SessionId = Uuid;

type Registry = RwLock<HashMap<SessionId, Arc<StreamSession>>>;

/// Errors raised while opening a session.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Connection was aborted before the stream opened")]
    AlreadyAborted,
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Opening,
    Active,
    Closing,
    Closed,
}

/// Why a session was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client went away or its signal was cancelled.
    ClientDisconnected,
    /// The outbound channel could not accept an event.
    WriteFailed,
    /// The server is shutting down.
    Shutdown,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::ClientDisconnected => "client_disconnected",
            CloseReason::WriteFailed => "write_failed",
            CloseReason::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
struct Counters {
    opened: AtomicU64,
    rejected: AtomicU64,
    closed: AtomicU64,
    timers_armed: AtomicU64,
    timers_cleared: AtomicU64,
}

/// Lifetime counters of a [`SessionManager`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Sessions that reached `Active`
    pub opened: u64,
    /// Open attempts refused because the signal had already fired
    pub rejected: u64,
    /// Sessions that reached `Closed` after being active
    pub closed: u64,
    /// Snapshot timers started
    pub timers_armed: u64,
    /// Snapshot timers cleared
    pub timers_cleared: u64,
    /// Sessions currently registered
    pub active: usize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// STREAM SESSION
// ============================================================================

/// One client's dashboard stream.
pub struct StreamSession {
    id: SessionId,
    state: Mutex<SessionState>,
    closed: AtomicBool,
    signal: CancellationToken,
    timer: Mutex<Option<CancellationToken>>,
    subscription: Mutex<Option<SubscriptionId>>,
    outbound: Mutex<Option<mpsc::Sender<DashboardEvent>>>,
    bus: Arc<EventBus>,
    counters: Arc<Counters>,
    registry: Weak<Registry>,
}

impl StreamSession {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the session. Returns `false` if it was already closing or closed.
    pub fn close(&self, reason: CloseReason) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.set_state(SessionState::Closing);

        if let Some(timer) = lock(&self.timer).take() {
            timer.cancel();
            self.counters.timers_cleared.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(subscription) = lock(&self.subscription).take() {
            self.bus.unsubscribe(subscription);
        }

        self.set_state(SessionState::Closed);

        // Dropping the sender ends the response body once the reader catches up.
        lock(&self.outbound).take();

        if let Some(registry) = self.registry.upgrade() {
            registry
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.id);
        }

        self.counters.closed.fetch_add(1, Ordering::Relaxed);
        if let Some(m) = metrics() {
            m.session_closed();
        }
        info!(session_id = %self.id, reason = %reason, "Dashboard stream closed");
        true
    }

    fn set_state(&self, state: SessionState) {
        *lock(&self.state) = state;
    }

    /// Sender for the next write, or `None` once closing has begun.
    fn sender(&self) -> Option<mpsc::Sender<DashboardEvent>> {
        if self.is_closed() {
            return None;
        }
        lock(&self.outbound).clone()
    }

    /// Bus callback body. Runs on the publisher's thread and never blocks.
    fn deliver(&self, event: &DashboardEvent) -> Result<(), SubscriberError> {
        let Some(sender) = self.sender() else {
            return Ok(());
        };

        match sender.try_send(event.clone()) {
            Ok(()) => {
                debug!(session_id = %self.id, event_type = event.event_type(), "Queued bus event");
                if let Some(m) = metrics() {
                    m.record_delivered(event.event_type(), "bus");
                }
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                warn!(
                    session_id = %self.id,
                    event_type = event.event_type(),
                    "Session buffer full, dropping bus event"
                );
                if let Some(m) = metrics() {
                    m.record_dropped(event.event_type());
                }
                Err(SubscriberError::Full)
            }
            Err(TrySendError::Closed(_)) => {
                self.close(CloseReason::WriteFailed);
                Err(SubscriberError::Closed)
            }
        }
    }

    fn subscribe(self: &Arc<Self>) {
        let mut slot = lock(&self.subscription);
        if self.is_closed() {
            return;
        }
        let weak = Arc::downgrade(self);
        *slot = Some(self.bus.subscribe(move |event| match weak.upgrade() {
            Some(session) => session.deliver(event),
            None => Ok(()),
        }));
    }

    fn arm_timer(self: &Arc<Self>, producers: SnapshotProducers, period: Duration) {
        let mut slot = lock(&self.timer);
        if self.is_closed() {
            return;
        }
        let timer = CancellationToken::new();
        *slot = Some(timer.clone());
        self.counters.timers_armed.fetch_add(1, Ordering::Relaxed);

        tokio::spawn(Arc::clone(self).run(producers, period, timer));
    }

    /// Produce once, then on every tick until the timer or the signal is cancelled.
    async fn run(self: Arc<Self>, producers: SnapshotProducers, period: Duration, timer: CancellationToken) {
        let signal = self.signal.clone();

        tokio::select! {
            biased;
            _ = timer.cancelled() => return,
            _ = signal.cancelled() => {
                self.close(CloseReason::ClientDisconnected);
                return;
            }
            result = producers.run_all(&*self) => {
                if result.is_err() {
                    return;
                }
            }
        }

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = timer.cancelled() => break,
                _ = signal.cancelled() => {
                    self.close(CloseReason::ClientDisconnected);
                    break;
                }
                _ = ticker.tick() => {}
            }

            debug!(session_id = %self.id, "Dashboard tick");
            tokio::select! {
                biased;
                _ = timer.cancelled() => break,
                _ = signal.cancelled() => {
                    self.close(CloseReason::ClientDisconnected);
                    break;
                }
                result = producers.run_all(&*self) => {
                    if result.is_err() {
                        break;
                    }
                }
            }
        }

        debug!(session_id = %self.id, "Dashboard timer stopped");
    }
}

#[async_trait]
impl EventSink for StreamSession {
    async fn emit(&self, event: DashboardEvent) -> Result<(), SinkClosed> {
        let Some(sender) = self.sender() else {
            return Err(SinkClosed);
        };

        let event_type = event.event_type();
        if sender.send(event).await.is_err() {
            self.close(CloseReason::WriteFailed);
            return Err(SinkClosed);
        }
        if let Some(m) = metrics() {
            m.record_delivered(event_type, "tick");
        }
        Ok(())
    }
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SESSION STREAM
// ============================================================================

/// Outbound side of a session, consumed by the HTTP response.
///
/// Dropping it cancels the session's signal, which is how a client
/// disconnect reaches the session. Once the session is closed the stream
/// ends, even if events are still buffered.
pub struct SessionStream {
    session: Arc<StreamSession>,
    events: ReceiverStream<DashboardEvent>,
    _disconnect: DropGuard,
}

impl SessionStream {
    pub fn id(&self) -> SessionId {
        self.session.id
    }

    pub fn session(&self) -> &Arc<StreamSession> {
        &self.session
    }
}

impl Stream for SessionStream {
    type Item = DashboardEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.session.is_closed() {
            return Poll::Ready(None);
        }
        Pin::new(&mut self.events).poll_next(cx)
    }
}

impl fmt::Debug for SessionStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStream")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SESSION MANAGER
// ============================================================================

/// Opens, tracks and shuts down dashboard stream sessions.
pub struct SessionManager {
    bus: Arc<EventBus>,
    producers: SnapshotProducers,
    config: StreamConfig,
    shutdown: CancellationToken,
    sessions: Arc<Registry>,
    counters: Arc<Counters>,
}

impl SessionManager {
    pub fn new(bus: Arc<EventBus>, producers: SnapshotProducers, config: StreamConfig) -> Self {
        Self {
            bus,
            producers,
            config,
            shutdown: CancellationToken::new(),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// A fresh cancellation signal for one client connection.
    ///
    /// Signals handed out after [`shutdown`](Self::shutdown) are already
    /// cancelled, so late connections are refused at open.
    pub fn client_signal(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// Open a session bound to `signal`.
    ///
    /// If `signal` has already fired the session goes straight to `Closed`:
    /// nothing subscribes to the bus and no timer is armed.
    pub fn open(&self, signal: CancellationToken) -> Result<SessionStream, SessionError> {
        if signal.is_cancelled() {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            info!("Dashboard stream aborted before opening");
            return Err(SessionError::AlreadyAborted);
        }

        let (tx, rx) = mpsc::channel(self.config.session_buffer.max(1));
        let session = Arc::new(StreamSession {
            id: Uuid::now_v7(),
            state: Mutex::new(SessionState::Opening),
            closed: AtomicBool::new(false),
            signal: signal.clone(),
            timer: Mutex::new(None),
            subscription: Mutex::new(None),
            outbound: Mutex::new(Some(tx)),
            bus: Arc::clone(&self.bus),
            counters: Arc::clone(&self.counters),
            registry: Arc::downgrade(&self.sessions),
        });

        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.id, Arc::clone(&session));
        self.counters.opened.fetch_add(1, Ordering::Relaxed);
        if let Some(m) = metrics() {
            m.session_opened();
        }

        session.set_state(SessionState::Active);
        session.subscribe();
        session.arm_timer(self.producers.clone(), self.config.tick_interval);

        info!(
            session_id = %session.id,
            tick_ms = self.config.tick_interval.as_millis() as u64,
            active = self.active_sessions(),
            "Dashboard stream opened"
        );

        Ok(SessionStream {
            session,
            events: ReceiverStream::new(rx),
            _disconnect: signal.drop_guard(),
        })
    }

    /// Number of open sessions.
    pub fn active_sessions(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            opened: self.counters.opened.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            closed: self.counters.closed.load(Ordering::Relaxed),
            timers_armed: self.counters.timers_armed.load(Ordering::Relaxed),
            timers_cleared: self.counters.timers_cleared.load(Ordering::Relaxed),
            active: self.active_sessions(),
        }
    }

    /// Close every open session and refuse new ones. Returns how many were closed.
    pub fn shutdown(&self) -> usize {
        let open: Vec<Arc<StreamSession>> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let closed = open
            .iter()
            .filter(|session| session.close(CloseReason::Shutdown))
            .count();
        self.shutdown.cancel();

        info!(closed, "Dashboard streams shut down");
        closed
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .field("active", &self.active_sessions())
            .finish_non_exhaustive()
    }
}
