//! Push relay that records what it was asked to forward.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use newsdesk_api::relay::{PushRelay, RelayError};
use newsdesk_core::DashboardEvent;

#[derive(Debug, Default)]
pub struct RecordingRelay {
    forwarded: Mutex<Vec<DashboardEvent>>,
}

impl RecordingRelay {
    pub fn forwarded(&self) -> Vec<DashboardEvent> {
        self.forwarded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PushRelay for RecordingRelay {
    async fn forward(&self, event: &DashboardEvent) -> Result<(), RelayError> {
        self.forwarded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}
