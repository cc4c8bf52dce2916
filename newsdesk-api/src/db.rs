//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling using deadpool-postgres, and
//! [`PgDashboardStore`], the production [`DashboardStore`].
//!
//! The schema belongs to the CMS. The dashboard only reads these columns:
//!
//! ```text
//! articles(id uuid, title text, author_id uuid, category_id uuid null,
//!          status text, views bigint, shares bigint, created_at timestamptz)
//! users(id uuid, name text, email text, role text, created_at timestamptz)
//! categories(id uuid, name text)
//! advertisements(id uuid)
//! ```

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolError, RecyclingMethod, Runtime};
use newsdesk_core::{
    ArticleStatus, ArticleSummary, EntityKind, StoreError, Timestamp, UserRole, UserSummary,
};
use newsdesk_storage::{ArticleQuery, DashboardStore, StoreResult, UserQuery};
use std::time::Duration;
use tokio_postgres::{NoTls, Row};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "newsdesk".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("NEWSDESK_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("NEWSDESK_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("NEWSDESK_DB_NAME").unwrap_or_else(|_| "newsdesk".to_string()),
            user: std::env::var("NEWSDESK_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("NEWSDESK_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("NEWSDESK_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("NEWSDESK_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.connect_timeout = Some(self.timeout);

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(deadpool_postgres::PoolConfig::new(self.max_size));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

/// Which [`DashboardStore`] the binary runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl StoreBackend {
    /// Read `NEWSDESK_STORE` (`postgres` or `memory`, default `postgres`).
    pub fn from_env() -> ApiResult<Self> {
        match std::env::var("NEWSDESK_STORE") {
            Err(_) => Ok(StoreBackend::Postgres),
            Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
                "" | "postgres" | "pg" => Ok(StoreBackend::Postgres),
                "memory" | "mem" => Ok(StoreBackend::Memory),
                _ => Err(ApiError::invalid_format("NEWSDESK_STORE", "postgres or memory")),
            },
        }
    }
}

// ============================================================================
// POSTGRES STORE
// ============================================================================

const COUNT_ARTICLES: &str =
    "SELECT COUNT(*) FROM articles WHERE ($1::text IS NULL OR status = $1)";
const COUNT_USERS: &str = "SELECT COUNT(*) FROM users";
const COUNT_ADVERTISEMENTS: &str = "SELECT COUNT(*) FROM advertisements";
const SUM_VIEWS: &str = "SELECT COALESCE(SUM(views), 0)::bigint FROM articles";
const SUM_SHARES: &str = "SELECT COALESCE(SUM(shares), 0)::bigint FROM articles";
const LIST_ARTICLES: &str = "SELECT a.id, a.title, u.name, c.name, a.status, a.views, a.shares, a.created_at \
     FROM articles a \
     JOIN users u ON u.id = a.author_id \
     LEFT JOIN categories c ON c.id = a.category_id \
     WHERE ($1::text IS NULL OR c.name = $1) AND ($2::text IS NULL OR a.status = $2) \
     ORDER BY a.created_at DESC, a.id DESC \
     LIMIT $3 OFFSET $4";
const LIST_USERS: &str = "SELECT id, name, email, role, created_at \
     FROM users \
     WHERE ($1::text IS NULL OR role = $1) \
     ORDER BY created_at DESC, id DESC \
     LIMIT $2 OFFSET $3";

/// [`DashboardStore`] issuing aggregate SQL through a connection pool.
#[derive(Clone)]
pub struct PgDashboardStore {
    pool: Pool,
}

impl PgDashboardStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a store from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_conn(&self) -> StoreResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_error)
    }

    async fn scalar(
        &self,
        name: &'static str,
        sql: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> StoreResult<u64> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_one(sql, params)
            .await
            .map_err(|e| StoreError::query_failed(name, e))?;
        let value: i64 = row.try_get(0).map_err(|e| StoreError::query_failed(name, e))?;
        u64::try_from(value).map_err(|_| StoreError::query_failed(name, "negative aggregate"))
    }
}

fn pool_error(err: PoolError) -> StoreError {
    tracing::error!("Connection pool error: {:?}", err);
    StoreError::Unavailable {
        reason: err.to_string(),
    }
}

fn non_negative(entity: EntityKind, column: &str, value: i64) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| StoreError::InvalidRow {
        entity,
        reason: format!("{} is negative: {}", column, value),
    })
}

fn article_from_row(row: &Row) -> StoreResult<ArticleSummary> {
    let invalid = |e: tokio_postgres::Error| StoreError::InvalidRow {
        entity: EntityKind::Article,
        reason: e.to_string(),
    };

    let status: String = row.try_get(4).map_err(invalid)?;
    let status: ArticleStatus = status.parse().map_err(|_| StoreError::InvalidRow {
        entity: EntityKind::Article,
        reason: format!("unknown status '{}'", status),
    })?;
    let views: i64 = row.try_get(5).map_err(invalid)?;
    let shares: i64 = row.try_get(6).map_err(invalid)?;

    Ok(ArticleSummary {
        id: row.try_get::<_, Uuid>(0).map_err(invalid)?,
        title: row.try_get(1).map_err(invalid)?,
        author: row.try_get(2).map_err(invalid)?,
        category: row.try_get(3).map_err(invalid)?,
        status,
        views: non_negative(EntityKind::Article, "views", views)?,
        shares: non_negative(EntityKind::Article, "shares", shares)?,
        created_at: row.try_get::<_, Timestamp>(7).map_err(invalid)?,
    })
}

fn user_from_row(row: &Row) -> StoreResult<UserSummary> {
    let invalid = |e: tokio_postgres::Error| StoreError::InvalidRow {
        entity: EntityKind::User,
        reason: e.to_string(),
    };

    let role: String = row.try_get(3).map_err(invalid)?;
    let role: UserRole = role.parse().map_err(|_| StoreError::InvalidRow {
        entity: EntityKind::User,
        reason: format!("unknown role '{}'", role),
    })?;

    Ok(UserSummary {
        id: row.try_get::<_, Uuid>(0).map_err(invalid)?,
        name: row.try_get(1).map_err(invalid)?,
        email: row.try_get(2).map_err(invalid)?,
        role,
        created_at: row.try_get::<_, Timestamp>(4).map_err(invalid)?,
    })
}

#[async_trait]
impl DashboardStore for PgDashboardStore {
    async fn count_articles(&self, status: Option<ArticleStatus>) -> StoreResult<u64> {
        let status = status.map(|s| s.as_str());
        self.scalar("count_articles", COUNT_ARTICLES, &[&status]).await
    }

    async fn count_users(&self) -> StoreResult<u64> {
        self.scalar("count_users", COUNT_USERS, &[]).await
    }

    async fn count_advertisements(&self) -> StoreResult<u64> {
        self.scalar("count_advertisements", COUNT_ADVERTISEMENTS, &[]).await
    }

    async fn sum_article_views(&self) -> StoreResult<u64> {
        self.scalar("sum_article_views", SUM_VIEWS, &[]).await
    }

    async fn sum_article_shares(&self) -> StoreResult<u64> {
        self.scalar("sum_article_shares", SUM_SHARES, &[]).await
    }

    async fn list_articles(&self, query: &ArticleQuery) -> StoreResult<Vec<ArticleSummary>> {
        let conn = self.get_conn().await?;
        let category = query.category.as_deref();
        let status = query.status.map(|s| s.as_str());
        let limit = i64::from(query.limit);
        let offset = i64::from(query.offset);

        let rows = conn
            .query(LIST_ARTICLES, &[&category, &status, &limit, &offset])
            .await
            .map_err(|e| StoreError::query_failed("list_articles", e))?;

        rows.iter().map(article_from_row).collect()
    }

    async fn list_users(&self, query: &UserQuery) -> StoreResult<Vec<UserSummary>> {
        let conn = self.get_conn().await?;
        let role = query.role.map(|r| r.as_str());
        let limit = i64::from(query.limit);
        let offset = i64::from(query.offset);

        let rows = conn
            .query(LIST_USERS, &[&role, &limit, &offset])
            .await
            .map_err(|e| StoreError::query_failed("list_users", e))?;

        rows.iter().map(user_from_row).collect()
    }
}
