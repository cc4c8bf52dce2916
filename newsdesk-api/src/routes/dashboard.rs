//! Live Dashboard Endpoints
//!
//! - `GET /stream` - server-sent event stream of dashboard events
//! - `GET /articles`, `GET /users` - paginated listings served from the query cache
//! - `POST /mutations` - notify open dashboards that rows of a kind changed
//! - `GET /stats` - session, bus and cache counters
//!
//! Each SSE message is one JSON-encoded [`DashboardEvent`] framed as
//! `data: <json>\n\n`.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::StreamExt;
use newsdesk_core::{ArticleStatus, ArticleSummary, DashboardEvent, EntityKind, UserRole, UserSummary};
use newsdesk_storage::{ArticleQuery, DashboardStore, UserQuery};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::session::SessionManager;
use crate::state::{AppState, CachedStore, DashboardHub};

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

// ============================================================================
// TYPES
// ============================================================================

/// Query string of `GET /articles`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListArticlesParams {
    pub offset: Option<u32>,
    pub limit: Option<u32>,
    pub category: Option<String>,
    /// `draft`, `pending` or `published`
    pub status: Option<String>,
}

/// Query string of `GET /users`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListUsersParams {
    pub offset: Option<u32>,
    pub limit: Option<u32>,
    pub role: Option<String>,
}

/// Body of `POST /mutations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationRequest {
    /// Entity kind that changed: `article`, `user` or `advertisement`
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationResponse {
    pub kind: EntityKind,
    /// Events republished to open dashboards
    pub published: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStatsResponse {
    pub sessions: SessionCounters,
    pub bus_subscribers: usize,
    pub cache: CacheCounters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCounters {
    pub active: usize,
    pub opened: u64,
    pub rejected: u64,
    pub closed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheCounters {
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub hit_rate: f64,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// Encode one event as an SSE message.
pub fn sse_event(event: &DashboardEvent) -> Result<Event, axum::Error> {
    Event::default().json_data(event)
}

/// GET /api/v1/dashboard/stream - Open a live dashboard stream
pub async fn stream_dashboard(
    State(sessions): State<Arc<SessionManager>>,
) -> ApiResult<impl IntoResponse> {
    let stream = sessions.open(sessions.client_signal())?;
    let session_id = stream.id();

    let events = stream.map(move |event| {
        sse_event(&event).map_err(|e| {
            tracing::error!(session_id = %session_id, error = %e, "Failed to encode event");
            e
        })
    });

    let sse = Sse::new(events)
        .keep_alive(KeepAlive::new().interval(sessions.config().keep_alive_interval));

    Ok((
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        sse,
    ))
}

fn page_size(limit: Option<u32>) -> ApiResult<u32> {
    match limit.unwrap_or(DEFAULT_PAGE_SIZE) {
        0 => Err(ApiError::invalid_input("limit must be at least 1")),
        n => Ok(n.min(MAX_PAGE_SIZE)),
    }
}

/// GET /api/v1/dashboard/articles - Newest articles, one page
pub async fn list_articles(
    State(store): State<Arc<CachedStore>>,
    Query(params): Query<ListArticlesParams>,
) -> ApiResult<Json<Vec<ArticleSummary>>> {
    let mut query = ArticleQuery::latest(page_size(params.limit)?)
        .with_offset(params.offset.unwrap_or(0));
    if let Some(category) = params.category {
        query = query.with_category(category);
    }
    if let Some(status) = params.status.as_deref() {
        let status: ArticleStatus = status
            .parse()
            .map_err(|_| ApiError::invalid_format("status", "draft, pending or published"))?;
        query = query.with_status(status);
    }

    Ok(Json(store.list_articles(&query).await?))
}

/// GET /api/v1/dashboard/users - Newest users, one page
pub async fn list_users(
    State(store): State<Arc<CachedStore>>,
    Query(params): Query<ListUsersParams>,
) -> ApiResult<Json<Vec<UserSummary>>> {
    let mut query = UserQuery::latest(page_size(params.limit)?)
        .with_offset(params.offset.unwrap_or(0));
    if let Some(role) = params.role.as_deref() {
        let role: UserRole = role
            .parse()
            .map_err(|_| ApiError::invalid_format("role", "reader, author, editor or admin"))?;
        query = query.with_role(role);
    }

    Ok(Json(store.list_users(&query).await?))
}

/// POST /api/v1/dashboard/mutations - Invalidate and republish after a write
pub async fn record_mutation(
    State(hub): State<Arc<DashboardHub>>,
    Json(req): Json<MutationRequest>,
) -> ApiResult<impl IntoResponse> {
    let kind: EntityKind = req
        .kind
        .parse()
        .map_err(|_| ApiError::invalid_format("kind", "article, user or advertisement"))?;

    let published = hub.record_mutation(kind).await;
    Ok((
        StatusCode::ACCEPTED,
        Json(MutationResponse { kind, published }),
    ))
}

/// GET /api/v1/dashboard/stats - Pipeline counters
pub async fn dashboard_stats(State(state): State<AppState>) -> Json<DashboardStatsResponse> {
    let sessions = state.sessions.stats();
    let cache = state.hub.cache_stats();

    Json(DashboardStatsResponse {
        sessions: SessionCounters {
            active: sessions.active,
            opened: sessions.opened,
            rejected: sessions.rejected,
            closed: sessions.closed,
        },
        bus_subscribers: state.bus.subscriber_count(),
        cache: CacheCounters {
            entries: cache.entry_count,
            hits: cache.hits,
            misses: cache.misses,
            evictions: cache.evictions,
            invalidations: cache.invalidations,
            hit_rate: cache.hit_rate(),
        },
    })
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the dashboard router.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/stream", get(stream_dashboard))
        .route("/articles", get(list_articles))
        .route("/users", get(list_users))
        .route("/mutations", post(record_mutation))
        .route("/stats", get(dashboard_stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsdesk_core::DashboardSnapshot;

    #[test]
    fn test_mutation_request_deserialization() -> Result<(), serde_json::Error> {
        let req: MutationRequest = serde_json::from_str(r#"{"kind":"articles"}"#)?;
        assert_eq!(req.kind.parse::<EntityKind>().ok(), Some(EntityKind::Article));
        Ok(())
    }

    #[test]
    fn test_mutation_response_serialization() -> Result<(), serde_json::Error> {
        let json = serde_json::to_string(&MutationResponse {
            kind: EntityKind::User,
            published: 2,
        })?;
        assert!(json.contains("\"kind\":\"user\""));
        Ok(())
    }

    #[test]
    fn test_page_size_is_clamped() {
        assert_eq!(page_size(None).ok(), Some(DEFAULT_PAGE_SIZE));
        assert_eq!(page_size(Some(7)).ok(), Some(7));
        assert_eq!(page_size(Some(10_000)).ok(), Some(MAX_PAGE_SIZE));
        assert!(page_size(Some(0)).is_err());
    }

    #[test]
    fn test_sse_event_encodes() {
        let event = DashboardEvent::DashboardUpdate {
            data: DashboardSnapshot::default(),
        };
        assert!(sse_event(&event).is_ok());
    }
}
