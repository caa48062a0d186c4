//! Distributed rate-limit middleware.
//!
//! Keys off the request's acting identity when one has been attached, else
//! the client IP, so unauthenticated abuse is still throttled. The check
//! itself is one atomic store round-trip (see
//! [`auth_core::rate_limit::RateLimiter`]).

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::{Error, HttpMessage};
use auth_core::rate_limit::{identity_key, ip_key};
use auth_core::{AuthError, RateLimitRule, RateLimiter};
use futures::future::{ready, Ready};
use tracing::warn;

use crate::extractors::ActingIdentity;
use crate::rejection::reject;

/// What to do when the shared store cannot answer.
///
/// Throttling is an availability protection, so the default lets the
/// request through; deployments that prefer rejecting on outage set
/// `FailClosed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    FailOpen,
    FailClosed,
}

pub struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
    rule: RateLimitRule,
    failure_mode: FailureMode,
}

impl RateLimitMiddleware {
    pub fn new(limiter: Arc<RateLimiter>, rule: RateLimitRule) -> Self {
        Self {
            limiter,
            rule,
            failure_mode: FailureMode::FailOpen,
        }
    }

    pub fn failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RateLimitMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
            rule: self.rule,
            failure_mode: self.failure_mode,
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: Rc<S>,
    limiter: Arc<RateLimiter>,
    rule: RateLimitRule,
    failure_mode: FailureMode,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
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
        let limiter = self.limiter.clone();
        let rule = self.rule;
        let failure_mode = self.failure_mode;

        Box::pin(async move {
            let route = req
                .match_pattern()
                .unwrap_or_else(|| req.path().to_string());
            let key = match req.extensions().get::<ActingIdentity>() {
                Some(acting) => identity_key(&acting.0.id, &route),
                None => {
                    let ip = req
                        .connection_info()
                        .realip_remote_addr()
                        .unwrap_or("unknown")
                        .to_string();
                    ip_key(&ip, &route)
                }
            };

            match limiter.check(&key, rule.max_requests, rule.window_ms).await {
                Ok(decision) if !decision.allowed => {
                    warn!(key = %key, "rate limit exceeded");
                    Err(reject(AuthError::RateLimitExceeded {
                        retry_after_ms: decision.retry_after_ms,
                    }))
                }
                Ok(decision) => {
                    let mut res = service.call(req).await?;
                    let headers = res.headers_mut();
                    headers.insert(
                        HeaderName::from_static("x-ratelimit-limit"),
                        HeaderValue::from(rule.max_requests),
                    );
                    headers.insert(
                        HeaderName::from_static("x-ratelimit-remaining"),
                        HeaderValue::from(decision.remaining),
                    );
                    Ok(res)
                }
                Err(err) => match failure_mode {
                    FailureMode::FailOpen => {
                        warn!("rate limit store unavailable, allowing request: {}", err);
                        service.call(req).await
                    }
                    FailureMode::FailClosed => Err(reject(err)),
                },
            }
        })
    }
}
