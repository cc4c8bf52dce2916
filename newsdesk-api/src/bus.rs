//! Dashboard Event Bus
//!
//! In-process publish/subscribe hub for [`DashboardEvent`]s.
//!
//! ## Delivery
//!
//! - `publish` calls every subscriber synchronously, in registration order
//! - a subscriber that returns an error or panics is logged and skipped;
//!   the remaining subscribers still receive the event
//! - events published while nobody is subscribed are lost
//! - every published event is also mirrored to the configured [`PushRelay`]
//!   on the tokio runtime, without waiting for it
//!
//! There is no ceiling on the number of subscribers. Crossing the configured
//! listener threshold only logs a warning.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use newsdesk_core::DashboardEvent;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::BusConfig;
use crate::relay::{forward_logged, NoopRelay, PushRelay};
use crate::telemetry::metrics;

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Failure reported by a subscriber callback.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubscriberError {
    #[error("Subscriber is closed")]
    Closed,

    #[error("Subscriber buffer is full")]
    Full,

    #[error("{0}")]
    Other(String),
}

/// Callback invoked for each published event.
pub type Subscriber = Arc<dyn Fn(&DashboardEvent) -> Result<(), SubscriberError> + Send + Sync>;

/// Outcome of one [`EventBus::publish`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers that accepted the event
    pub delivered: usize,
    /// Subscribers that returned an error or panicked
    pub failed: usize,
}

/// Process-wide event bus. Construct one and share it through `Arc`.
pub struct EventBus {
    subscribers: RwLock<Vec<(SubscriptionId, Subscriber)>>,
    next_id: AtomicU64,
    config: BusConfig,
    relay: Arc<dyn PushRelay>,
    over_threshold: AtomicBool,
}

impl EventBus {
    /// Create a bus that does not mirror events anywhere.
    pub fn new(config: BusConfig) -> Self {
        Self::with_relay(config, Arc::new(NoopRelay))
    }

    /// Create a bus that mirrors every published event to `relay`.
    pub fn with_relay(config: BusConfig, relay: Arc<dyn PushRelay>) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            config,
            relay,
            over_threshold: AtomicBool::new(false),
        }
    }

    /// Register `callback`. It receives every event published from now on.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&DashboardEvent) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let count = {
            let mut subscribers = self.write();
            subscribers.push((id, Arc::new(callback)));
            subscribers.len()
        };

        debug!(subscription = %id, subscribers = count, "Bus subscriber added");
        self.check_threshold(count);
        id
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let (removed, count) = {
            let mut subscribers = self.write();
            let before = subscribers.len();
            subscribers.retain(|(sid, _)| *sid != id);
            (subscribers.len() != before, subscribers.len())
        };

        if removed {
            debug!(subscription = %id, subscribers = count, "Bus subscriber removed");
            self.check_threshold(count);
        }
        removed
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.read().len()
    }

    /// Deliver `event` to every subscriber in registration order. Never fails.
    pub fn publish(&self, event: DashboardEvent) -> PublishReport {
        let event_type = event.event_type();

        // Callbacks run without the lock held so they may unsubscribe.
        let subscribers: Vec<(SubscriptionId, Subscriber)> = self.read().clone();

        let mut report = PublishReport::default();
        for (id, callback) in &subscribers {
            match catch_unwind(AssertUnwindSafe(|| callback(&event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(
                        subscription = %id,
                        event_type = event_type,
                        error = %e,
                        "Bus subscriber failed"
                    );
                    if let Some(m) = metrics() {
                        m.record_subscriber_failure(false);
                    }
                }
                Err(payload) => {
                    report.failed += 1;
                    warn!(
                        subscription = %id,
                        event_type = event_type,
                        panic = panic_message(payload.as_ref()),
                        "Bus subscriber panicked"
                    );
                    if let Some(m) = metrics() {
                        m.record_subscriber_failure(true);
                    }
                }
            }
        }

        if subscribers.is_empty() {
            debug!(event_type = event_type, "No subscribers for event");
        } else {
            debug!(
                event_type = event_type,
                delivered = report.delivered,
                failed = report.failed,
                "Published event"
            );
        }
        if let Some(m) = metrics() {
            m.record_published(event_type);
        }

        self.mirror(event);
        report
    }

    fn mirror(&self, event: DashboardEvent) {
        if !self.relay.is_enabled() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(forward_logged(Arc::clone(&self.relay), event));
            }
            Err(_) => {
                debug!(
                    event_type = event.event_type(),
                    "No runtime available, event not relayed"
                );
            }
        }
    }

    fn check_threshold(&self, count: usize) {
        let Some(threshold) = self.config.listener_warn_threshold else {
            return;
        };
        if count > threshold {
            if !self.over_threshold.swap(true, Ordering::Relaxed) {
                warn!(
                    subscribers = count,
                    threshold = threshold,
                    "Event bus subscriber count exceeds warning threshold"
                );
            }
        } else {
            self.over_threshold.store(false, Ordering::Relaxed);
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<(SubscriptionId, Subscriber)>> {
        self.subscribers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<(SubscriptionId, Subscriber)>> {
        self.subscribers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("config", &self.config)
            .field("relay_enabled", &self.relay.is_enabled())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
