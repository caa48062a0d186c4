//! Request extensions inserted by the guards, with `FromRequest`
//! extractors for handlers.

use actix_web::{FromRequest, HttpMessage, HttpRequest};
use auth_core::trust::ServiceContext;
use auth_core::{Identity, TokenClaims};
use futures::future::{ready, Ready};

/// Verified bearer principal attached by [`crate::AuthGuard`].
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub claims: TokenClaims,
}

impl AuthenticatedUser {
    pub fn identity(&self) -> &Identity {
        &self.claims.identity
    }
}

/// Verified service caller attached by [`crate::ServiceTrustGuard`].
#[derive(Debug, Clone)]
pub struct ServiceCaller(pub ServiceContext);

/// The identity a request acts as: the bearer principal, or the user
/// context forwarded by a trusted service. Rate limiting keys off this.
#[derive(Debug, Clone)]
pub struct ActingIdentity(pub Identity);

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        match req.extensions().get::<AuthenticatedUser>() {
            Some(user) => ready(Ok(user.clone())),
            None => ready(Err(actix_web::error::ErrorUnauthorized(
                "user not authenticated",
            ))),
        }
    }
}

impl FromRequest for ServiceCaller {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        match req.extensions().get::<ServiceCaller>() {
            Some(caller) => ready(Ok(caller.clone())),
            None => ready(Err(actix_web::error::ErrorUnauthorized(
                "service not authenticated",
            ))),
        }
    }
}

impl FromRequest for ActingIdentity {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        match req.extensions().get::<ActingIdentity>() {
            Some(identity) => ready(Ok(identity.clone())),
            None => ready(Err(actix_web::error::ErrorUnauthorized(
                "no acting identity on request",
            ))),
        }
    }
}
