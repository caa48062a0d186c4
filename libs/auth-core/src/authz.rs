//! Role/permission evaluation over verified claims.
//!
//! Routes declare what they need with an explicit [`RouteRequirement`]
//! attached at registration time; one middleware reads it. No annotation
//! metadata, no reflection.

use crate::error::{AuthError, Result};
use crate::identity::Identity;
use crate::rate_limit::RateLimitRule;

/// Declarative requirement for one route or scope.
///
/// `roles` and `permissions` are each any-of sets, and the two checks are
/// independent: a route may demand a role AND a permission, and both must
/// pass on their own. Empty sets mean any authenticated identity passes.
#[derive(Debug, Clone, Default)]
pub struct RouteRequirement {
    /// Skip authentication entirely.
    pub public: bool,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub rate_limit: Option<RateLimitRule>,
}

impl RouteRequirement {
    /// Any authenticated identity.
    pub fn authenticated() -> Self {
        Self::default()
    }

    /// No authentication at all.
    pub fn open() -> Self {
        Self {
            public: true,
            ..Self::default()
        }
    }

    pub fn any_role<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn any_permission<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    pub fn rate_limit(mut self, max_requests: u32, window_ms: u64) -> Self {
        self.rate_limit = Some(RateLimitRule {
            max_requests,
            window_ms,
        });
        self
    }

    /// Evaluate the requirement against a verified identity.
    pub fn evaluate(&self, identity: &Identity) -> Result<()> {
        if !self.roles.is_empty() && !identity.has_any_role(&self.roles) {
            return Err(AuthError::InsufficientRole);
        }
        if !self.permissions.is_empty() && !identity.has_any_permission(&self.permissions) {
            return Err(AuthError::InsufficientPermission);
        }
        Ok(())
    }
}
