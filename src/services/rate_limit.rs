//! Fixed-window rate limiting on top of the store.
//!
//! Each hit is one atomic store operation, so callers sharing a key cannot
//! race past the limit. Counters live only in the store, under their own
//! `rate_limit:` namespace, and expire with their window.

use std::time::Duration;

use crate::error::{AppError, Result};
use crate::store::StoreClient;

/// Namespace prepended to every counter key.
pub const KEY_PREFIX: &str = "rate_limit:";

/// Length of a rate window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateWindow {
    PerSecond,
    PerMinute,
}

impl RateWindow {
    pub fn duration(self) -> Duration {
        match self {
            RateWindow::PerSecond => Duration::from_secs(1),
            RateWindow::PerMinute => Duration::from_secs(60),
        }
    }
}

/// At most `limit` calls per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub limit: u32,
    pub window: RateWindow,
}

impl RateLimit {
    pub fn per_second(limit: u32) -> Self {
        Self {
            limit,
            window: RateWindow::PerSecond,
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self {
            limit,
            window: RateWindow::PerMinute,
        }
    }
}

/// What an allowed call left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// Calls counted in this window, including this one.
    pub count: u64,
    /// Calls left in this window.
    pub remaining: u64,
    /// Time until the window resets.
    pub reset_after: Duration,
}

/// Counts calls per caller-supplied key.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    store: StoreClient,
}

impl RateLimiter {
    pub fn new(store: StoreClient) -> Self {
        Self { store }
    }

    /// Counts one call for `key`.
    ///
    /// # Errors
    ///
    /// - `AppError::RateLimitExceeded` - the window is already full
    /// - `AppError::Validation` - `limit` is zero
    /// - `AppError::Store` - the store call failed
    pub async fn allow(&self, key: &str, limit: RateLimit) -> Result<RateDecision> {
        if limit.limit == 0 {
            return Err(AppError::Validation("Rate limit must be positive".to_string()));
        }

        let counter = format!("{}{}", KEY_PREFIX, key);
        let hit = self
            .store
            .hit_window(&counter, u64::from(limit.limit), limit.window.duration())
            .await?;

        if !hit.allowed {
            tracing::debug!("⛔ {} exceeded {} per {:?}", key, limit.limit, limit.window);
            return Err(AppError::RateLimitExceeded(format!(
                "Too many requests. Try again in {} ms",
                hit.ttl.as_millis()
            )));
        }

        Ok(RateDecision {
            count: hit.count,
            remaining: u64::from(limit.limit).saturating_sub(hit.count),
            reset_after: hit.ttl,
        })
    }

    pub async fn allow_per_second(&self, key: &str, times: u32) -> Result<RateDecision> {
        self.allow(key, RateLimit::per_second(times)).await
    }

    pub async fn allow_per_minute(&self, key: &str, times: u32) -> Result<RateDecision> {
        self.allow(key, RateLimit::per_minute(times)).await
    }
}
