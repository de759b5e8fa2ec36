//! Per-call cache policies
//!
//! Two independent axes: [`CachePolicy`] orders the normalized cache against
//! the network, [`TransportCachePolicy`] governs the raw response-byte cache
//! and is only consulted once a call decides to go to the network.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Normalized-cache policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CachePolicy {
    /// Never touch the network; a miss is terminal.
    CacheOnly,
    /// Skip the cache read and always fetch; the result is still written.
    NetworkOnly,
    /// Try the cache, fall through to the network on any miss.
    #[default]
    CacheFirst,
}

impl CachePolicy {
    pub fn reads_cache(&self) -> bool {
        matches!(self, Self::CacheOnly | Self::CacheFirst)
    }

    pub fn allows_network(&self) -> bool {
        matches!(self, Self::NetworkOnly | Self::CacheFirst)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CacheOnly => "CACHE_ONLY",
            Self::NetworkOnly => "NETWORK_ONLY",
            Self::CacheFirst => "CACHE_FIRST",
        }
    }
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CachePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "CACHE_ONLY" => Ok(Self::CacheOnly),
            "NETWORK_ONLY" => Ok(Self::NetworkOnly),
            "CACHE_FIRST" => Ok(Self::CacheFirst),
            _ => Err(ConfigError::InvalidValue {
                field: "cache_policy".to_string(),
                value: s.to_string(),
                reason: "expected CACHE_ONLY, NETWORK_ONLY or CACHE_FIRST".to_string(),
            }),
        }
    }
}

/// Transport-level (raw byte) cache policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportCachePolicy {
    /// Serve cached bytes or fail; never hit the network.
    CacheOnly,
    /// Serve fresh cached bytes, otherwise fetch.
    #[default]
    CacheFirst,
    /// Fetch; on failure fall back to cached bytes even if stale.
    NetworkFirst,
    /// Bypass cached bytes entirely; the response is still stored.
    NetworkOnly,
    /// Serve fresh cached bytes once, then evict them.
    ExpireAfterRead,
}

impl TransportCachePolicy {
    /// Value sent to the transport as its cache-control hint.
    pub fn header_value(&self) -> &'static str {
        match self {
            Self::CacheOnly => "CACHE_ONLY",
            Self::CacheFirst => "CACHE_FIRST",
            Self::NetworkFirst => "NETWORK_FIRST",
            Self::NetworkOnly => "NETWORK_ONLY",
            Self::ExpireAfterRead => "EXPIRE_AFTER_READ",
        }
    }

    pub fn reads_before_network(&self) -> bool {
        matches!(
            self,
            Self::CacheOnly | Self::CacheFirst | Self::ExpireAfterRead
        )
    }
}

impl fmt::Display for TransportCachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header_value())
    }
}

impl FromStr for TransportCachePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "CACHE_ONLY" => Ok(Self::CacheOnly),
            "CACHE_FIRST" => Ok(Self::CacheFirst),
            "NETWORK_FIRST" => Ok(Self::NetworkFirst),
            "NETWORK_ONLY" => Ok(Self::NetworkOnly),
            "EXPIRE_AFTER_READ" => Ok(Self::ExpireAfterRead),
            _ => Err(ConfigError::InvalidValue {
                field: "transport_cache_policy".to_string(),
                value: s.to_string(),
                reason: "unknown transport cache policy".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_policy_axes() {
        assert!(CachePolicy::CacheOnly.reads_cache());
        assert!(!CachePolicy::CacheOnly.allows_network());
        assert!(!CachePolicy::NetworkOnly.reads_cache());
        assert!(CachePolicy::NetworkOnly.allows_network());
        assert!(CachePolicy::CacheFirst.reads_cache());
        assert!(CachePolicy::CacheFirst.allows_network());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("cache-only".parse::<CachePolicy>().unwrap(), CachePolicy::CacheOnly);
        assert_eq!(
            "network_first".parse::<TransportCachePolicy>().unwrap(),
            TransportCachePolicy::NetworkFirst
        );
        assert!("sometimes".parse::<CachePolicy>().is_err());
    }

    #[test]
    fn test_policy_serde_names() {
        let json = serde_json::to_string(&CachePolicy::NetworkOnly).unwrap();
        assert_eq!(json, "\"NETWORK_ONLY\"");
        let parsed: TransportCachePolicy = serde_json::from_str("\"EXPIRE_AFTER_READ\"").unwrap();
        assert_eq!(parsed, TransportCachePolicy::ExpireAfterRead);
    }

    #[test]
    fn test_defaults() {
        assert_eq!(CachePolicy::default(), CachePolicy::CacheFirst);
        assert_eq!(TransportCachePolicy::default(), TransportCachePolicy::CacheFirst);
    }
}
