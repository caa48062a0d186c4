//! # Actix Middleware Library
//!
//! The authorization boundary for platform services: every inbound request
//! passes through exactly one of these guards, and handlers read the
//! verified identity from request extensions.
//!
//! ## Modules
//! - `auth_guard`: bearer authentication + route requirement evaluation
//! - `service_trust`: signed service-to-service call verification
//! - `rate_limit`: distributed sliding-window throttling
//! - `extractors`: `FromRequest` access to the attached identities
//! - `rejection`: the one place auth failures become HTTP statuses

pub mod auth_guard;
pub mod extractors;
pub mod rate_limit;
pub mod rejection;
pub mod service_trust;

pub use auth_guard::AuthGuard;
pub use extractors::{ActingIdentity, AuthenticatedUser, ServiceCaller};
pub use rate_limit::{FailureMode, RateLimitMiddleware};
pub use rejection::AuthRejection;
pub use service_trust::ServiceTrustGuard;
