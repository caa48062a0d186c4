//! Configuration for the auth layer.
//!
//! Loaded once at process start from environment variables (plus `.env` in
//! debug builds) and validated before any service struct is constructed.
//! Weak or missing secrets abort startup; nothing in this layer falls back
//! to a default secret.

use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::info;

/// Minimum length for any signing secret.
const MIN_SECRET_LEN: usize = 32;

const DEFAULT_ACCESS_TTL: &str = "15m";
const DEFAULT_REFRESH_TTL: &str = "7d";
const DEFAULT_MAX_SKEW_MS: u64 = 5 * 60 * 1000;
const DEFAULT_STORE_TIMEOUT_MS: u64 = 500;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret for signing/verifying access tokens.
    pub access_token_secret: String,
    /// Secret for signing/verifying refresh tokens. Must differ from the
    /// access secret so possession of one cannot forge the other class.
    pub refresh_token_secret: String,
    /// Shared secret of the service trust domain.
    pub service_trust_secret: String,

    pub issuer: String,
    pub audience: String,

    /// Access token lifetime in seconds, parsed from a TTL string.
    pub access_token_ttl_secs: u64,
    /// Refresh token lifetime in seconds.
    pub refresh_token_ttl_secs: u64,

    pub enable_blacklist: bool,
    pub enable_session_tracking: bool,
    /// When true, a store outage during a blacklist lookup lets the request
    /// through instead of rejecting it. Security-over-availability says
    /// leave this off; it exists as an explicit deployment tradeoff.
    pub revocation_fail_open: bool,

    /// Accepted clock skew for service-to-service timestamps.
    pub max_skew_ms: u64,
    /// Reject a nonce that has already been seen inside the skew window.
    pub nonce_guard: bool,

    pub redis_url: String,
    /// Upper bound for any single store round-trip on the request path.
    pub store_timeout: Duration,
}

impl AuthConfig {
    /// Load and validate configuration from the environment.
    pub fn from_env() -> Result<Self> {
        if cfg!(debug_assertions) {
            dotenvy::dotenv().ok();
        }

        let config = Self {
            access_token_secret: env::var("AUTH_ACCESS_TOKEN_SECRET")
                .context("AUTH_ACCESS_TOKEN_SECRET must be set")?,
            refresh_token_secret: env::var("AUTH_REFRESH_TOKEN_SECRET")
                .context("AUTH_REFRESH_TOKEN_SECRET must be set")?,
            service_trust_secret: env::var("SERVICE_TRUST_SECRET")
                .context("SERVICE_TRUST_SECRET must be set")?,
            issuer: env::var("AUTH_TOKEN_ISSUER").context("AUTH_TOKEN_ISSUER must be set")?,
            audience: env::var("AUTH_TOKEN_AUDIENCE").context("AUTH_TOKEN_AUDIENCE must be set")?,
            access_token_ttl_secs: parse_ttl(
                &env::var("AUTH_ACCESS_TOKEN_TTL").unwrap_or_else(|_| DEFAULT_ACCESS_TTL.into()),
            )
            .context("Invalid AUTH_ACCESS_TOKEN_TTL")?,
            refresh_token_ttl_secs: parse_ttl(
                &env::var("AUTH_REFRESH_TOKEN_TTL").unwrap_or_else(|_| DEFAULT_REFRESH_TTL.into()),
            )
            .context("Invalid AUTH_REFRESH_TOKEN_TTL")?,
            enable_blacklist: env_bool("AUTH_ENABLE_BLACKLIST", true)?,
            enable_session_tracking: env_bool("AUTH_ENABLE_SESSION_TRACKING", true)?,
            revocation_fail_open: env_bool("AUTH_REVOCATION_FAIL_OPEN", false)?,
            max_skew_ms: env_u64("SERVICE_TRUST_MAX_SKEW_MS", DEFAULT_MAX_SKEW_MS)?,
            nonce_guard: env_bool("SERVICE_TRUST_NONCE_GUARD", true)?,
            redis_url: env::var("REDIS_URL").context("REDIS_URL must be set")?,
            store_timeout: Duration::from_millis(env_u64(
                "AUTH_STORE_TIMEOUT_MS",
                DEFAULT_STORE_TIMEOUT_MS,
            )?),
        };

        config.validate()?;
        info!(
            issuer = %config.issuer,
            audience = %config.audience,
            blacklist = config.enable_blacklist,
            sessions = config.enable_session_tracking,
            "auth configuration loaded"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        check_secret("AUTH_ACCESS_TOKEN_SECRET", &self.access_token_secret)?;
        check_secret("AUTH_REFRESH_TOKEN_SECRET", &self.refresh_token_secret)?;
        check_secret("SERVICE_TRUST_SECRET", &self.service_trust_secret)?;

        if self.access_token_secret == self.refresh_token_secret {
            bail!("AUTH_ACCESS_TOKEN_SECRET and AUTH_REFRESH_TOKEN_SECRET must differ");
        }
        if self.access_token_ttl_secs >= self.refresh_token_ttl_secs {
            bail!("access token TTL must be shorter than refresh token TTL");
        }
        Ok(())
    }
}

fn check_secret(name: &str, value: &str) -> Result<()> {
    if value.len() < MIN_SECRET_LEN {
        bail!("{name} must be at least {MIN_SECRET_LEN} characters");
    }
    Ok(())
}

/// Parse a TTL string like `"90s"`, `"15m"`, `"2h"`, `"7d"` into seconds.
///
/// Unknown units fail here, at configuration load, never at request time.
pub fn parse_ttl(raw: &str) -> Result<u64> {
    let raw = raw.trim();
    let (digits, unit) = raw.split_at(raw.len().saturating_sub(1));
    let value: u64 = digits
        .parse()
        .with_context(|| format!("invalid TTL value: {raw:?}"))?;

    let seconds = match unit {
        "s" => value,
        "m" => value * 60,
        "h" => value * 60 * 60,
        "d" => value * 60 * 60 * 24,
        _ => bail!("invalid TTL unit in {raw:?} (expected s, m, h or d)"),
    };
    if seconds == 0 {
        bail!("TTL must be positive: {raw:?}");
    }
    Ok(seconds)
}

fn env_bool(name: &str, default: bool) -> Result<bool> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("Invalid {name} (expected true or false)")),
        Err(_) => Ok(default),
    }
}

fn env_u64(name: &str, default: u64) -> Result<u64> {
    match env::var(name) {
        Ok(raw) => raw.parse().with_context(|| format!("Invalid {name}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> AuthConfig {
    AuthConfig {
        access_token_secret: "access-secret-0123456789-0123456789-01".into(),
        refresh_token_secret: "refresh-secret-0123456789-0123456789-0".into(),
        service_trust_secret: "trust-secret-0123456789-0123456789-012".into(),
        issuer: "platform".into(),
        audience: "api".into(),
        access_token_ttl_secs: 3600,
        refresh_token_ttl_secs: 7 * 24 * 3600,
        enable_blacklist: true,
        enable_session_tracking: true,
        revocation_fail_open: false,
        max_skew_ms: DEFAULT_MAX_SKEW_MS,
        nonce_guard: false,
        redis_url: "redis://127.0.0.1:6379".into(),
        store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
    }
}
