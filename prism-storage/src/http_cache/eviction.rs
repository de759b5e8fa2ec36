//! Eviction strategies for cached response bytes.
//!
//! A strategy only decides whether an entry is stale. Stale entries are not
//! removed eagerly: `NETWORK_FIRST` may still fall back to them when the
//! network fails.

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

use super::traits::CachedResponse;

/// Decides whether a cached response is stale.
pub trait EvictionStrategy: fmt::Debug + Send + Sync {
    fn is_stale(&self, response: &CachedResponse, now: DateTime<Utc>) -> bool;
}

/// Entries go stale a fixed time after they were written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpireAfterWrite {
    max_age: Duration,
}

impl ExpireAfterWrite {
    pub fn new(max_age: Duration) -> Self {
        Self { max_age }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }
}

impl EvictionStrategy for ExpireAfterWrite {
    fn is_stale(&self, response: &CachedResponse, now: DateTime<Utc>) -> bool {
        response.age(now) > self.max_age
    }
}

/// Entries never go stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NeverExpire;

impl EvictionStrategy for NeverExpire {
    fn is_stale(&self, _response: &CachedResponse, _now: DateTime<Utc>) -> bool {
        false
    }
}
