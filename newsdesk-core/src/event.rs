//! Dashboard Event Types
//!
//! The closed set of events pushed to live dashboards. Every event is
//! encoded as a JSON object with a `type` discriminator at the wire
//! boundary and decoded the same way by clients.

use serde::{Deserialize, Serialize};

use crate::{ArticleSummary, DashboardSnapshot, UserSummary};

/// Events delivered over the dashboard stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DashboardEvent {
    /// Fresh aggregate counters.
    DashboardUpdate {
        /// The recomputed snapshot
        data: DashboardSnapshot,
    },

    /// The most recently created articles, newest first.
    LatestArticles {
        articles: Vec<ArticleSummary>,
    },

    /// The most recently registered users, newest first.
    LatestUsers {
        users: Vec<UserSummary>,
    },
}

impl DashboardEvent {
    /// Get the wire discriminator for logging and metrics labels.
    pub fn event_type(&self) -> &'static str {
        match self {
            DashboardEvent::DashboardUpdate { .. } => "dashboardUpdate",
            DashboardEvent::LatestArticles { .. } => "latestArticles",
            DashboardEvent::LatestUsers { .. } => "latestUsers",
        }
    }

    /// Encode the event as a single JSON line.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
