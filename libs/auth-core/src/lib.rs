//! # Auth Core
//!
//! Unified token authentication and cross-service trust for the platform's
//! services.
//!
//! ## Modules
//! - `identity`: principal and claim value types
//! - `token`: issuance and verification of the two token classes
//! - `revocation`: blacklist and per-identity session registry
//! - `service`: the composed auth service, including refresh rotation
//! - `rate_limit`: distributed sliding-window rate limiting
//! - `trust`: HMAC-signed service-to-service headers
//! - `authz`: per-route role/permission requirements
//! - `config`: environment configuration, validated at startup

pub mod authz;
pub mod claims;
pub mod config;
pub mod error;
pub mod identity;
pub mod rate_limit;
pub mod revocation;
pub mod service;
pub mod token;
pub mod trust;

pub use authz::RouteRequirement;
pub use claims::{RefreshRequest, RevokeAllRequest, TokenClaims, TokenKind, TokenPair};
pub use config::AuthConfig;
pub use error::{AuthError, Result};
pub use identity::Identity;
pub use rate_limit::{RateLimitDecision, RateLimitRule, RateLimiter};
pub use revocation::RevocationStore;
pub use service::AuthService;
pub use token::TokenEngine;
pub use trust::{ServiceContext, ServiceHeaders, ServiceTrust};
