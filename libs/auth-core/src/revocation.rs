//! Token blacklist and per-identity session registry.
//!
//! Both live in the shared TTL-capable store so every process instance sees
//! the same revocation state. Blacklist entries carry the *remaining*
//! lifetime of the token they revoke and therefore never outlive it; the
//! session registry is TTL-aligned to the refresh-token lifetime and exists
//! to answer "revoke every session of identity X".

use std::time::Duration;

use chrono::Utc;
use redis_utils::{with_timeout, SharedConnectionManager};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::claims::refresh_token_id;
use crate::error::Result;

const BLACKLIST_PREFIX: &str = "auth:blacklist:";
const SESSION_PREFIX: &str = "auth:session:";

/// Conservative TTL for entries created by a revoke-all sweep, where the
/// original refresh expiry is not known at enumeration time.
const REVOKE_ALL_TTL_SECS: u64 = 24 * 60 * 60;

pub struct RevocationStore {
    redis: SharedConnectionManager,
    timeout: Duration,
}

impl RevocationStore {
    pub fn new(redis: SharedConnectionManager, timeout: Duration) -> Self {
        Self { redis, timeout }
    }

    /// Blacklist a token id for `ttl_seconds`.
    ///
    /// A zero TTL means the token is already dead; revoking it is a no-op,
    /// not an error.
    pub async fn revoke(&self, token_id: &str, ttl_seconds: u64) -> Result<()> {
        if ttl_seconds == 0 {
            return Ok(());
        }

        let key = blacklist_key(token_id);
        let mut conn = self.conn().await;
        with_timeout(self.timeout, async {
            redis::cmd("SET")
                .arg(&key)
                .arg("1")
                .arg("EX")
                .arg(ttl_seconds)
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await?;

        info!(ttl_seconds, "token blacklisted");
        Ok(())
    }

    /// Point lookup against the blacklist. A store failure propagates as
    /// `StoreUnavailable`; the fail-open/fail-closed decision is the
    /// caller's.
    pub async fn is_revoked(&self, token_id: &str) -> Result<bool> {
        let key = blacklist_key(token_id);
        let mut conn = self.conn().await;
        let exists: bool = with_timeout(self.timeout, async {
            redis::cmd("EXISTS").arg(&key).query_async(&mut conn).await
        })
        .await?;
        Ok(exists)
    }

    /// Track a freshly issued pair under the identity's session index.
    ///
    /// Tokens are stored as SHA-256 hashes only; the registry must be usable
    /// for revocation without ever holding a usable credential.
    pub async fn record_session(
        &self,
        identity_id: &str,
        pair_id: &str,
        access_token: &str,
        refresh_token: &str,
        refresh_ttl_secs: u64,
    ) -> Result<()> {
        let record_key = session_key(identity_id, pair_id);
        let index_key = session_index_key(identity_id);
        let now_ms = Utc::now().timestamp_millis();

        let fields = [
            ("jti", pair_id.to_string()),
            ("access_sha256", hash_token(access_token)),
            ("refresh_sha256", hash_token(refresh_token)),
            ("created_at", now_ms.to_string()),
            ("last_used_at", now_ms.to_string()),
        ];

        let mut conn = self.conn().await;
        with_timeout(self.timeout, async {
            redis::pipe()
                .atomic()
                .hset_multiple(&record_key, &fields)
                .ignore()
                .expire(&record_key, refresh_ttl_secs as i64)
                .ignore()
                .sadd(&index_key, pair_id)
                .ignore()
                .expire(&index_key, refresh_ttl_secs as i64)
                .ignore()
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await?;
        Ok(())
    }

    /// Drop one session record, e.g. after its refresh token was rotated.
    pub async fn remove_session(&self, identity_id: &str, pair_id: &str) -> Result<()> {
        let record_key = session_key(identity_id, pair_id);
        let index_key = session_index_key(identity_id);

        let mut conn = self.conn().await;
        with_timeout(self.timeout, async {
            redis::pipe()
                .atomic()
                .del(&record_key)
                .ignore()
                .srem(&index_key, pair_id)
                .ignore()
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await?;
        Ok(())
    }

    /// Blacklist every tracked token of an identity and drop its session
    /// index. Returns the number of sessions swept.
    pub async fn revoke_all(&self, identity_id: &str) -> Result<u64> {
        let index_key = session_index_key(identity_id);

        let mut conn = self.conn().await;
        let pair_ids: Vec<String> = with_timeout(self.timeout, async {
            redis::cmd("SMEMBERS")
                .arg(&index_key)
                .query_async(&mut conn)
                .await
        })
        .await?;

        if pair_ids.is_empty() {
            let _: () = with_timeout(self.timeout, async {
                redis::cmd("DEL").arg(&index_key).query_async(&mut conn).await
            })
            .await?;
            return Ok(0);
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for pair_id in &pair_ids {
            // Both halves of the pair: the tracked id is the access token's,
            // the refresh token carries the correlated ":refresh" id.
            pipe.set_ex(blacklist_key(pair_id), "1", REVOKE_ALL_TTL_SECS)
                .ignore();
            pipe.set_ex(
                blacklist_key(&refresh_token_id(pair_id)),
                "1",
                REVOKE_ALL_TTL_SECS,
            )
            .ignore();
            pipe.del(session_key(identity_id, pair_id)).ignore();
        }
        pipe.del(&index_key).ignore();

        with_timeout(self.timeout, async {
            pipe.query_async::<_, ()>(&mut conn).await
        })
        .await?;

        warn!(
            identity_id,
            sessions = pair_ids.len(),
            "all sessions revoked for identity"
        );
        Ok(pair_ids.len() as u64)
    }

    async fn conn(&self) -> redis::aio::ConnectionManager {
        self.redis.lock().await.clone()
    }
}

fn blacklist_key(token_id: &str) -> String {
    format!("{BLACKLIST_PREFIX}{token_id}")
}

fn session_key(identity_id: &str, pair_id: &str) -> String {
    format!("{SESSION_PREFIX}{identity_id}:{pair_id}")
}

fn session_index_key(identity_id: &str) -> String {
    format!("{SESSION_PREFIX}{identity_id}:index")
}

/// Hex-encoded SHA-256 of a token, for storage.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
