//! Distributed sliding-window rate limiting.
//!
//! One key per identity (or IP) and route. Prune, insert, count and TTL
//! refresh execute as a single MULTI/EXEC round-trip; two concurrent
//! requests must never both observe `count <= max` from separate
//! read-then-write calls.

use std::time::Duration;

use chrono::Utc;
use redis_utils::{with_timeout, SharedConnectionManager};

use crate::error::Result;

const RATE_LIMIT_PREFIX: &str = "auth:ratelimit:";

/// Per-route limit attached to a route requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub max_requests: u32,
    pub window_ms: u64,
}

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests left in the current window.
    pub remaining: u32,
    /// Accurate backoff hint derived from the oldest in-window entry;
    /// zero when the request is allowed.
    pub retry_after_ms: u64,
}

pub struct RateLimiter {
    redis: SharedConnectionManager,
    timeout: Duration,
}

impl RateLimiter {
    pub fn new(redis: SharedConnectionManager, timeout: Duration) -> Self {
        Self { redis, timeout }
    }

    /// Record the current request under `key` and decide whether it may
    /// proceed given `max_requests` per `window_ms`.
    pub async fn check(
        &self,
        key: &str,
        max_requests: u32,
        window_ms: u64,
    ) -> Result<RateLimitDecision> {
        let full_key = format!("{RATE_LIMIT_PREFIX}{key}");
        let now = Utc::now().timestamp_millis();
        let window_start = now - window_ms as i64;
        // Member must be unique even for same-millisecond arrivals.
        let member = format!("{now}-{:08x}", rand::random::<u32>());

        let mut conn = self.redis.lock().await.clone();
        let (count, oldest): (u64, Vec<(String, f64)>) = with_timeout(self.timeout, async {
            redis::pipe()
                .atomic()
                .zrembyscore(&full_key, 0, window_start)
                .ignore()
                .zadd(&full_key, member.as_str(), now)
                .ignore()
                .zcard(&full_key)
                .zrange_withscores(&full_key, 0, 0)
                .pexpire(&full_key, window_ms as i64)
                .ignore()
                .query_async(&mut conn)
                .await
        })
        .await?;

        let allowed = count <= max_requests as u64;
        let remaining = (max_requests as u64).saturating_sub(count) as u32;
        let retry_after_ms = if allowed {
            0
        } else {
            oldest
                .first()
                .map(|(_, score)| {
                    let oldest_ms = *score as i64;
                    (oldest_ms + window_ms as i64 - now).max(0) as u64
                })
                .unwrap_or(window_ms)
        };

        Ok(RateLimitDecision {
            allowed,
            remaining,
            retry_after_ms,
        })
    }
}

/// Rate-limit key for an authenticated identity on a route.
pub fn identity_key(identity_id: &str, route: &str) -> String {
    format!("user:{identity_id}:{route}")
}

/// Fallback key for unauthenticated callers, so anonymous abuse is still
/// throttled.
pub fn ip_key(ip: &str, route: &str) -> String {
    format!("ip:{ip}:{route}")
}
