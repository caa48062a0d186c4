//! The only place auth failures become HTTP.
//!
//! Everything below the boundary speaks `AuthError`; here the kinds map to
//! 401/403/429/503 with the collapsed public messages, so nothing past the
//! guard ever handles an auth failure.

use std::fmt;

use actix_web::http::header;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use auth_core::AuthError;
use serde_json::json;

#[derive(Debug)]
pub struct AuthRejection(pub AuthError);

impl fmt::Display for AuthRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ResponseError for AuthRejection {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());
        let mut body = json!({
            "statusCode": self.0.status_code(),
            "code": self.0.code(),
            "message": self.0.public_message(),
        });

        if let AuthError::RateLimitExceeded { retry_after_ms } = &self.0 {
            let retry_after_secs = retry_after_ms.div_ceil(1000).max(1);
            builder.insert_header((header::RETRY_AFTER, retry_after_secs.to_string()));
            body["retryAfter"] = json!(retry_after_secs);
        }

        builder.json(body)
    }
}

impl From<AuthError> for AuthRejection {
    fn from(err: AuthError) -> Self {
        Self(err)
    }
}

/// Convert an auth failure into an actix error at the boundary.
pub(crate) fn reject(err: AuthError) -> actix_web::Error {
    AuthRejection(err).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_status_classes() {
        assert_eq!(
            AuthRejection(AuthError::InvalidToken).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthRejection(AuthError::InsufficientRole).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthRejection(AuthError::RateLimitExceeded { retry_after_ms: 1 }).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AuthRejection(AuthError::StoreUnavailable("down".into())).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn rate_limit_response_carries_retry_after() {
        let rejection = AuthRejection(AuthError::RateLimitExceeded {
            retry_after_ms: 1500,
        });
        let response = rejection.error_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            "2"
        );
    }
}
