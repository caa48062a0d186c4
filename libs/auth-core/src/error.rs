use redis_utils::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuthError>;

/// Every failure the auth layer can surface to a request.
///
/// All variants are recoverable at the transport boundary: they map to a
/// 401/403/429/503-class response and never cross into business logic.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed token, bad signature, or expired. The three are collapsed
    /// into one kind so callers cannot probe which check failed; logs keep
    /// the specific cause.
    #[error("invalid token")]
    InvalidToken,

    #[error("wrong token type")]
    WrongTokenType,

    #[error("invalid issuer or audience")]
    InvalidIssuerAudience,

    #[error("token has been revoked")]
    RevokedToken,

    #[error("missing service authentication headers")]
    MissingServiceHeaders,

    #[error("request timestamp outside the accepted window")]
    StaleTimestamp,

    #[error("invalid service signature")]
    InvalidServiceSignature,

    #[error("service nonce already seen")]
    ReplayedNonce,

    #[error("service {0} not authorized")]
    ServiceNotAuthorized(String),

    #[error("invalid user context")]
    InvalidUserContext,

    #[error("rate limit exceeded, retry after {retry_after_ms}ms")]
    RateLimitExceeded { retry_after_ms: u64 },

    #[error("insufficient role")]
    InsufficientRole,

    #[error("insufficient permission")]
    InsufficientPermission,

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("internal auth error: {0}")]
    Internal(String),
}

impl AuthError {
    /// HTTP status class for the transport boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::InvalidToken
            | AuthError::WrongTokenType
            | AuthError::InvalidIssuerAudience
            | AuthError::RevokedToken
            | AuthError::MissingServiceHeaders
            | AuthError::StaleTimestamp
            | AuthError::InvalidServiceSignature
            | AuthError::ReplayedNonce
            | AuthError::InvalidUserContext => 401,
            AuthError::ServiceNotAuthorized(_)
            | AuthError::InsufficientRole
            | AuthError::InsufficientPermission => 403,
            AuthError::RateLimitExceeded { .. } => 429,
            AuthError::StoreUnavailable(_) => 503,
            AuthError::Internal(_) => 500,
        }
    }

    /// Stable machine-readable code for response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidToken => "INVALID_TOKEN",
            AuthError::WrongTokenType => "WRONG_TOKEN_TYPE",
            AuthError::InvalidIssuerAudience => "INVALID_ISSUER_AUDIENCE",
            AuthError::RevokedToken => "REVOKED_TOKEN",
            AuthError::MissingServiceHeaders => "MISSING_SERVICE_HEADERS",
            AuthError::StaleTimestamp => "STALE_TIMESTAMP",
            AuthError::InvalidServiceSignature => "INVALID_SERVICE_SIGNATURE",
            AuthError::ReplayedNonce => "REPLAYED_NONCE",
            AuthError::ServiceNotAuthorized(_) => "SERVICE_NOT_AUTHORIZED",
            AuthError::InvalidUserContext => "INVALID_USER_CONTEXT",
            AuthError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            AuthError::InsufficientRole => "INSUFFICIENT_ROLE",
            AuthError::InsufficientPermission => "INSUFFICIENT_PERMISSION",
            AuthError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to return to external callers. Store and internal
    /// details never leak past the boundary.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::StoreUnavailable(_) => "authentication backend unavailable".to_string(),
            AuthError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        tracing::error!("store operation failed: {}", err);
        AuthError::StoreUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classes() {
        assert_eq!(AuthError::InvalidToken.status_code(), 401);
        assert_eq!(AuthError::RevokedToken.status_code(), 401);
        assert_eq!(AuthError::InsufficientRole.status_code(), 403);
        assert_eq!(
            AuthError::ServiceNotAuthorized("billing".into()).status_code(),
            403
        );
        assert_eq!(
            AuthError::RateLimitExceeded { retry_after_ms: 10 }.status_code(),
            429
        );
        assert_eq!(AuthError::StoreUnavailable("down".into()).status_code(), 503);
    }

    #[test]
    fn store_details_do_not_leak() {
        let err = AuthError::StoreUnavailable("redis://10.0.0.3 refused".into());
        assert!(!err.public_message().contains("10.0.0.3"));
    }
}
