//! Shared Redis plumbing for the auth layer.
//!
//! Every process instance talks to the same TTL-capable store through a
//! [`ConnectionManager`] handle. All request-path operations go through
//! [`with_timeout`] so a slow or unreachable store surfaces as a bounded
//! [`StoreError::Timeout`] instead of hanging the caller past its deadline.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::{Client, RedisError};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::info;

/// Shared Redis connection manager guarded by a Tokio mutex.
pub type SharedConnectionManager = Arc<Mutex<ConnectionManager>>;

/// Errors from a bounded store operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] RedisError),

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Redis connection pool handle.
pub struct RedisPool {
    manager: SharedConnectionManager,
}

impl RedisPool {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client =
            Client::open(redis_url).context("failed to parse REDIS_URL connection string")?;
        let manager = ConnectionManager::new(client)
            .await
            .context("failed to initialize Redis connection manager")?;

        info!("Redis connection manager initialized");
        Ok(Self {
            manager: Arc::new(Mutex::new(manager)),
        })
    }

    pub fn manager(&self) -> SharedConnectionManager {
        self.manager.clone()
    }
}

/// Run a Redis operation with an upper bound on wall-clock time.
///
/// The caller's deadline policy (fail open or closed) is applied above this
/// layer; here a timeout is just another store failure.
pub async fn with_timeout<T, F>(limit: Duration, op: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, RedisError>>,
{
    match timeout(limit, op).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(StoreError::Redis(err)),
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn with_timeout_passes_through_success() {
        let result = with_timeout(Duration::from_millis(100), async { Ok::<_, RedisError>(7) })
            .await
            .unwrap();
        assert_eq!(result, 7);
    }

    #[tokio::test]
    async fn with_timeout_bounds_slow_operations() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, RedisError>(())
        })
        .await;
        assert!(matches!(result, Err(StoreError::Timeout(_))));
    }
}
