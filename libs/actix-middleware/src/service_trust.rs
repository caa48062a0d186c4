//! Cross-service trust middleware.
//!
//! Internal routes wrap this to require signed service headers. When the
//! endpoint restricts callers, only services on its allow-list pass; when
//! it needs a forwarded user, the decoded context becomes the request's
//! acting identity.

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, HttpMessage};
use auth_core::trust::ServiceHeaders;
use auth_core::ServiceTrust;
use futures::future::{ready, Ready};

use crate::extractors::{ActingIdentity, ServiceCaller};
use crate::rejection::reject;

pub struct ServiceTrustGuard {
    trust: Arc<ServiceTrust>,
    allowed_services: Option<Rc<Vec<String>>>,
    require_user_context: bool,
}

impl ServiceTrustGuard {
    pub fn new(trust: Arc<ServiceTrust>) -> Self {
        Self {
            trust,
            allowed_services: None,
            require_user_context: false,
        }
    }

    /// Restrict the endpoint to the named services.
    pub fn allow_services<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_services = Some(Rc::new(services.into_iter().map(Into::into).collect()));
        self
    }

    /// Demand a forwarded user context on every call.
    pub fn require_user_context(mut self) -> Self {
        self.require_user_context = true;
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for ServiceTrustGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = ServiceTrustGuardService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ServiceTrustGuardService {
            service: Rc::new(service),
            trust: self.trust.clone(),
            allowed_services: self.allowed_services.clone(),
            require_user_context: self.require_user_context,
        }))
    }
}

pub struct ServiceTrustGuardService<S> {
    service: Rc<S>,
    trust: Arc<ServiceTrust>,
    allowed_services: Option<Rc<Vec<String>>>,
    require_user_context: bool,
}

impl<S, B> Service<ServiceRequest> for ServiceTrustGuardService<S>
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
        let trust = self.trust.clone();
        let allowed_services = self.allowed_services.clone();
        let require_user_context = self.require_user_context;

        Box::pin(async move {
            let headers = ServiceHeaders::collect(|name| {
                req.headers().get(name).and_then(|v| v.to_str().ok())
            })
            .map_err(reject)?;

            let context = trust
                .verify(
                    &headers,
                    allowed_services.as_ref().map(|s| s.as_slice()),
                    require_user_context,
                )
                .await
                .map_err(reject)?;

            if let Some(user) = &context.user {
                req.extensions_mut().insert(ActingIdentity(user.clone()));
            }
            req.extensions_mut().insert(ServiceCaller(context));

            service.call(req).await
        })
    }
}
