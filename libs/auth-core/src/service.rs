//! The auth service: issuance, verification, rotation and revocation,
//! composed from the token engine and the revocation store.
//!
//! Constructed once at process start with validated configuration and
//! injected wherever a request needs an authorization check. No ambient
//! globals.

use chrono::Utc;
use redis_utils::SharedConnectionManager;
use tracing::{info, warn};

use crate::claims::{TokenClaims, TokenKind, TokenPair};
use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use crate::identity::Identity;
use crate::revocation::RevocationStore;
use crate::token::TokenEngine;

pub struct AuthService {
    engine: TokenEngine,
    store: RevocationStore,
    enable_blacklist: bool,
    enable_session_tracking: bool,
    revocation_fail_open: bool,
    refresh_ttl_secs: u64,
}

impl AuthService {
    pub fn new(config: &AuthConfig, redis: SharedConnectionManager) -> Self {
        Self {
            engine: TokenEngine::new(config),
            store: RevocationStore::new(redis, config.store_timeout),
            enable_blacklist: config.enable_blacklist,
            enable_session_tracking: config.enable_session_tracking,
            revocation_fail_open: config.revocation_fail_open,
            refresh_ttl_secs: config.refresh_token_ttl_secs,
        }
    }

    /// Mint a token pair and, when session tracking is on, register it under
    /// the identity's session index.
    ///
    /// Session bookkeeping is best-effort: a store hiccup here must not turn
    /// a successful login into a failure. A session that was never recorded
    /// simply cannot be swept by revoke-all before it expires.
    pub async fn issue_pair(&self, user: &Identity) -> Result<TokenPair> {
        let issued = self.engine.issue(user)?;

        if self.enable_session_tracking {
            if let Err(err) = self
                .store
                .record_session(
                    &user.id,
                    &issued.pair_id,
                    &issued.pair.access_token,
                    &issued.pair.refresh_token,
                    self.refresh_ttl_secs,
                )
                .await
            {
                warn!("failed to record session for issued pair: {}", err);
            }
        }

        info!(identity = %user.id, "issued token pair");
        Ok(issued.pair)
    }

    /// Full verification: engine checks, then the blacklist when enabled.
    ///
    /// A store outage during the blacklist lookup rejects the request with
    /// `StoreUnavailable` unless fail-open was explicitly configured.
    pub async fn verify(&self, token: &str, expected: TokenKind) -> Result<TokenClaims> {
        let claims = self.engine.verify(token, expected)?;

        if self.enable_blacklist {
            match self.store.is_revoked(&claims.jti).await {
                Ok(true) => return Err(AuthError::RevokedToken),
                Ok(false) => {}
                Err(err) if self.revocation_fail_open => {
                    warn!("blacklist lookup failed, configured to fail open: {}", err);
                }
                Err(err) => return Err(err),
            }
        }

        Ok(claims)
    }

    /// Rotate a refresh token: verify it, retire it, mint a new pair.
    ///
    /// The presented token is blacklisted *before* the new pair is issued.
    /// If that write fails the whole operation aborts: issuing on top of a
    /// still-valid refresh token would leave two live pairs for one session.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let claims = self.verify(refresh_token, TokenKind::Refresh).await?;

        let remaining = claims.exp - Utc::now().timestamp();
        if remaining > 0 {
            self.store.revoke(&claims.jti, remaining as u64).await?;
        }

        if self.enable_session_tracking {
            if let Err(err) = self
                .store
                .remove_session(&claims.identity.id, claims.pair_id())
                .await
            {
                warn!("failed to drop rotated session record: {}", err);
            }
        }

        info!(identity = %claims.identity.id, "refresh token rotated");
        self.issue_pair(&claims.identity).await
    }

    /// Revoke a single presented token for its remaining lifetime.
    ///
    /// The payload is read without signature verification; the worst a
    /// forged token can do here is blacklist an id nobody holds. An already
    /// expired token is a no-op.
    pub async fn revoke_token(&self, token: &str) -> Result<()> {
        let peeked = self.engine.peek(token).ok_or(AuthError::InvalidToken)?;

        let remaining = peeked.exp - Utc::now().timestamp();
        if remaining <= 0 {
            return Ok(());
        }
        self.store.revoke(&peeked.jti, remaining as u64).await
    }

    /// Revoke every tracked session of an identity. Returns the number of
    /// sessions swept.
    pub async fn revoke_all(&self, identity_id: &str) -> Result<u64> {
        self.store.revoke_all(identity_id).await
    }

    pub fn engine(&self) -> &TokenEngine {
        &self.engine
    }
}
