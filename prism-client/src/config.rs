//! Client Configuration Module
//!
//! Settings loaded from environment variables with defaults suitable for
//! development. [`ClientBuilder::from_settings`](crate::ClientBuilder::from_settings)
//! turns them into a builder.

use prism_core::{CachePolicy, ConfigError, TransportCachePolicy};
use std::time::Duration;

use crate::dispatcher::DEFAULT_IDLE_TIMEOUT;

// ============================================================================
// CLIENT SETTINGS
// ============================================================================

/// Environment-derived client settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    /// Server endpoint. No default.
    pub server_url: Option<String>,

    /// Default normalized-cache policy for new calls.
    pub cache_policy: CachePolicy,

    /// Default transport-cache policy for new calls.
    pub transport_cache_policy: TransportCachePolicy,

    /// Idle time before a dispatcher thread is reclaimed.
    pub dispatcher_idle_timeout: Duration,

    /// Age after which cached response bytes are stale. `None` never expires.
    pub http_cache_max_age: Option<Duration>,

    /// Enables an in-memory response cache of this many entries.
    pub http_cache_max_entries: Option<usize>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: None,
            cache_policy: CachePolicy::default(),
            transport_cache_policy: TransportCachePolicy::default(),
            dispatcher_idle_timeout: DEFAULT_IDLE_TIMEOUT,
            http_cache_max_age: None,
            http_cache_max_entries: None,
        }
    }
}

impl ClientSettings {
    /// Load settings from the environment.
    ///
    /// Environment variables:
    /// - `PRISM_SERVER_URL`: server endpoint
    /// - `PRISM_CACHE_POLICY`: `CACHE_FIRST`, `CACHE_ONLY` or `NETWORK_ONLY` (default: `CACHE_FIRST`)
    /// - `PRISM_TRANSPORT_CACHE_POLICY`: transport-cache policy (default: `CACHE_FIRST`)
    /// - `PRISM_DISPATCHER_IDLE_SECS`: dispatcher thread idle timeout (default: 60)
    /// - `PRISM_HTTP_CACHE_MAX_AGE_SECS`: response cache max age (default: never expire)
    /// - `PRISM_HTTP_CACHE_MAX_ENTRIES`: enables the response cache with this capacity
    ///
    /// Unset variables fall back to defaults; set but unparsable ones are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let server_url = std::env::var("PRISM_SERVER_URL")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let cache_policy = match env_value("PRISM_CACHE_POLICY") {
            Some(value) => value.parse()?,
            None => defaults.cache_policy,
        };

        let transport_cache_policy = match env_value("PRISM_TRANSPORT_CACHE_POLICY") {
            Some(value) => value.parse()?,
            None => defaults.transport_cache_policy,
        };

        let dispatcher_idle_timeout = parse_env::<u64>("PRISM_DISPATCHER_IDLE_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.dispatcher_idle_timeout);

        let http_cache_max_age =
            parse_env::<u64>("PRISM_HTTP_CACHE_MAX_AGE_SECS")?.map(Duration::from_secs);

        let http_cache_max_entries = parse_env::<usize>("PRISM_HTTP_CACHE_MAX_ENTRIES")?;
        if http_cache_max_entries == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "PRISM_HTTP_CACHE_MAX_ENTRIES".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            server_url,
            cache_policy,
            transport_cache_policy,
            dispatcher_idle_timeout,
            http_cache_max_age,
            http_cache_max_entries,
        })
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env_value(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                field: key.to_string(),
                value,
                reason: e.to_string(),
            }),
        None => Ok(None),
    }
}

// ============================================================================
// TESTS
// ============================================================================
