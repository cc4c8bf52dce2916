//! Push Relay
//!
//! Mirrors bus events to the external push-notification service that fans
//! them out to other processes. Delivery is fire-and-forget: the bus spawns
//! each relay call and never waits for it, and no call is retried.

use std::sync::Arc;

use async_trait::async_trait;
use newsdesk_core::DashboardEvent;
use serde::Serialize;
use thiserror::Error;

use crate::config::RelayConfig;
use crate::telemetry::metrics;

/// Errors raised while forwarding an event.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Failed to build relay client: {0}")]
    Client(String),

    #[error("Relay request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Relay rejected event with status {0}")]
    Status(u16),
}

/// Destination for mirrored bus events.
#[async_trait]
pub trait PushRelay: Send + Sync {
    /// Forward one event.
    async fn forward(&self, event: &DashboardEvent) -> Result<(), RelayError>;

    /// Whether calling [`forward`](Self::forward) does anything at all.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Relay used when no push service is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRelay;

#[async_trait]
impl PushRelay for NoopRelay {
    async fn forward(&self, _event: &DashboardEvent) -> Result<(), RelayError> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

#[derive(Serialize)]
struct RelayEnvelope<'a> {
    channel: &'a str,
    event: &'a DashboardEvent,
}

/// Relay posting `{ "channel", "event" }` JSON to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpPushRelay {
    client: reqwest::Client,
    url: String,
    channel: String,
}

impl HttpPushRelay {
    pub fn new(url: impl Into<String>, config: &RelayConfig) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RelayError::Client(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            channel: config.channel.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PushRelay for HttpPushRelay {
    async fn forward(&self, event: &DashboardEvent) -> Result<(), RelayError> {
        let envelope = RelayEnvelope {
            channel: &self.channel,
            event,
        };

        let response = self
            .client
            .post(&self.url)
            .header("User-Agent", "Newsdesk-Relay/1.0")
            .json(&envelope)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Status(status.as_u16()));
        }

        tracing::debug!(
            event_type = event.event_type(),
            status = %status,
            "Event relayed"
        );
        Ok(())
    }
}

/// Build the relay described by `config`: HTTP when a URL is set, no-op otherwise.
pub fn relay_from_config(config: &RelayConfig) -> Result<Arc<dyn PushRelay>, RelayError> {
    match &config.url {
        Some(url) => Ok(Arc::new(HttpPushRelay::new(url.clone(), config)?)),
        None => Ok(Arc::new(NoopRelay)),
    }
}

/// Forward `event` and record the outcome. Failures are logged, never returned.
pub(crate) async fn forward_logged(relay: Arc<dyn PushRelay>, event: DashboardEvent) {
    let result = relay.forward(&event).await;
    if let Some(m) = metrics() {
        m.record_relay_delivery(result.is_ok());
    }
    if let Err(e) = result {
        tracing::warn!(
            event_type = event.event_type(),
            error = %e,
            "Push relay delivery failed"
        );
    }
}
