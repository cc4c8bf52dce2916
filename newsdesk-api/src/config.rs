//! API Configuration Module
//!
//! Configuration for the dashboard stream, the event bus, the push relay and
//! CORS. Everything is loaded from environment variables with defaults that
//! suit local development.

use std::time::Duration;

use newsdesk_storage::CacheConfig;

// ============================================================================
// STREAM CONFIGURATION
// ============================================================================

/// Settings for every dashboard stream session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Period of the snapshot timer.
    pub tick_interval: Duration,

    /// Events buffered per session before bus deliveries are dropped.
    pub session_buffer: usize,

    /// Rows in the latest-articles and latest-users events.
    pub latest_limit: u32,

    /// Interval of SSE keep-alive comments.
    pub keep_alive_interval: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(5000),
            session_buffer: 64,
            latest_limit: 5,
            keep_alive_interval: Duration::from_secs(15),
        }
    }
}

impl StreamConfig {
    /// Create StreamConfig from environment variables.
    ///
    /// Environment variables:
    /// - `NEWSDESK_TICK_INTERVAL_MS`: Snapshot timer period (default: 5000)
    /// - `NEWSDESK_SESSION_BUFFER`: Per-session event buffer (default: 64)
    /// - `NEWSDESK_LATEST_LIMIT`: Rows in latest lists (default: 5)
    /// - `NEWSDESK_KEEP_ALIVE_SECS`: SSE keep-alive period (default: 15)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let tick_interval = env_parse::<u64>("NEWSDESK_TICK_INTERVAL_MS")
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(defaults.tick_interval);

        let session_buffer = env_parse::<usize>("NEWSDESK_SESSION_BUFFER")
            .filter(|n| *n > 0)
            .unwrap_or(defaults.session_buffer);

        let latest_limit = env_parse::<u32>("NEWSDESK_LATEST_LIMIT")
            .unwrap_or(defaults.latest_limit);

        let keep_alive_interval = env_parse::<u64>("NEWSDESK_KEEP_ALIVE_SECS")
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.keep_alive_interval);

        Self {
            tick_interval,
            session_buffer,
            latest_limit,
            keep_alive_interval,
        }
    }

    /// Set the timer period.
    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    /// Set the per-session buffer.
    pub fn with_session_buffer(mut self, session_buffer: usize) -> Self {
        self.session_buffer = session_buffer.max(1);
        self
    }
}

// ============================================================================
// BUS CONFIGURATION
// ============================================================================

/// Settings for the in-process event bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Subscriber count above which a warning is logged. `None` disables it.
    pub listener_warn_threshold: Option<usize>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            listener_warn_threshold: Some(1000),
        }
    }
}

impl BusConfig {
    /// Create BusConfig from environment variables.
    ///
    /// - `NEWSDESK_BUS_LISTENER_WARN_THRESHOLD`: warning threshold (default: 1000, 0 disables)
    pub fn from_env() -> Self {
        match env_parse::<usize>("NEWSDESK_BUS_LISTENER_WARN_THRESHOLD") {
            Some(0) => Self {
                listener_warn_threshold: None,
            },
            Some(n) => Self {
                listener_warn_threshold: Some(n),
            },
            None => Self::default(),
        }
    }
}

// ============================================================================
// RELAY CONFIGURATION
// ============================================================================

/// Settings for mirroring bus events to the external push service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Endpoint receiving mirrored events. `None` disables the relay.
    pub url: Option<String>,

    /// Per-request timeout.
    pub timeout: Duration,

    /// Channel name sent with every event.
    pub channel: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout: Duration::from_millis(2000),
            channel: "dashboard".to_string(),
        }
    }
}

impl RelayConfig {
    /// Create RelayConfig from environment variables.
    ///
    /// Environment variables:
    /// - `NEWSDESK_PUSH_RELAY_URL`: push endpoint (unset = relay disabled)
    /// - `NEWSDESK_PUSH_RELAY_TIMEOUT_MS`: request timeout (default: 2000)
    /// - `NEWSDESK_PUSH_RELAY_CHANNEL`: channel name (default: "dashboard")
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let url = std::env::var("NEWSDESK_PUSH_RELAY_URL")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let timeout = env_parse::<u64>("NEWSDESK_PUSH_RELAY_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.timeout);

        let channel = std::env::var("NEWSDESK_PUSH_RELAY_CHANNEL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.channel);

        Self {
            url,
            timeout,
            channel,
        }
    }

    /// Whether events are mirrored anywhere.
    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// Top-level configuration of the API process.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    pub stream: StreamConfig,
    pub bus: BusConfig,
    pub relay: RelayConfig,
    pub cache: CacheConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            cors_max_age_secs: 86400,
            stream: StreamConfig::default(),
            bus: BusConfig::default(),
            relay: RelayConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `NEWSDESK_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `NEWSDESK_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `NEWSDESK_CACHE_CAPACITY`: Query cache capacity (default: 200)
    ///
    /// plus the variables read by [`StreamConfig`], [`BusConfig`] and [`RelayConfig`].
    pub fn from_env() -> Self {
        let cors_origins = std::env::var("NEWSDESK_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_max_age_secs = env_parse("NEWSDESK_CORS_MAX_AGE_SECS").unwrap_or(86400);

        let mut cache = CacheConfig::default();
        if let Some(capacity) = env_parse::<usize>("NEWSDESK_CACHE_CAPACITY") {
            cache = cache.with_capacity(capacity);
        }

        Self {
            cors_origins,
            cors_max_age_secs,
            stream: StreamConfig::from_env(),
            bus: BusConfig::from_env(),
            relay: RelayConfig::from_env(),
            cache,
        }
    }

    /// Check if running in production mode (strict CORS).
    pub fn is_production(&self) -> bool {
        !self.cors_origins.is_empty()
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            return true;
        }
        self.cors_origins.iter().any(|allowed| allowed == origin)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}
