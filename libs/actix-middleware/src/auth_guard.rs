//! Bearer authentication and authorization middleware.
//!
//! Wrapped per scope or route with the route's [`RouteRequirement`]. Public
//! routes pass straight through; everything else gets bearer verification,
//! requirement evaluation, an optional identity-keyed rate-limit check, and
//! the verified principal attached to the request.

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header;
use actix_web::{Error, HttpMessage};
use auth_core::rate_limit::identity_key;
use auth_core::{AuthError, AuthService, RateLimiter, RouteRequirement, TokenKind};
use futures::future::{ready, Ready};
use tracing::warn;

use crate::extractors::{ActingIdentity, AuthenticatedUser};
use crate::rejection::reject;

pub struct AuthGuard {
    auth: Arc<AuthService>,
    limiter: Option<Arc<RateLimiter>>,
    requirement: Rc<RouteRequirement>,
}

impl AuthGuard {
    pub fn new(auth: Arc<AuthService>, requirement: RouteRequirement) -> Self {
        Self {
            auth,
            limiter: None,
            requirement: Rc::new(requirement),
        }
    }

    /// Enforce the requirement's rate limit, keyed on the verified identity.
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthGuardService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthGuardService {
            service: Rc::new(service),
            auth: self.auth.clone(),
            limiter: self.limiter.clone(),
            requirement: self.requirement.clone(),
        }))
    }
}

pub struct AuthGuardService<S> {
    service: Rc<S>,
    auth: Arc<AuthService>,
    limiter: Option<Arc<RateLimiter>>,
    requirement: Rc<RouteRequirement>,
}

impl<S, B> Service<ServiceRequest> for AuthGuardService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let auth = self.auth.clone();
        let limiter = self.limiter.clone();
        let requirement = self.requirement.clone();

        Box::pin(async move {
            if requirement.public {
                return service.call(req).await;
            }

            let token = req
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .and_then(|h| h.strip_prefix("Bearer "))
                .map(str::to_owned)
                .ok_or_else(|| {
                    warn!("missing or malformed Authorization header");
                    reject(AuthError::InvalidToken)
                })?;

            let claims = auth
                .verify(&token, TokenKind::Access)
                .await
                .map_err(reject)?;

            requirement.evaluate(&claims.identity).map_err(reject)?;

            if let (Some(limiter), Some(rule)) = (&limiter, requirement.rate_limit) {
                let route = req
                    .match_pattern()
                    .unwrap_or_else(|| req.path().to_string());
                let key = identity_key(&claims.identity.id, &route);
                let decision = limiter
                    .check(&key, rule.max_requests, rule.window_ms)
                    .await
                    .map_err(reject)?;
                if !decision.allowed {
                    return Err(reject(AuthError::RateLimitExceeded {
                        retry_after_ms: decision.retry_after_ms,
                    }));
                }
            }

            req.extensions_mut()
                .insert(ActingIdentity(claims.identity.clone()));
            req.extensions_mut().insert(AuthenticatedUser { claims });

            service.call(req).await
        })
    }
}
