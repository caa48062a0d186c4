use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Authenticated principal as embedded in tokens and forwarded contexts.
///
/// The source of truth for users lives outside this layer; an `Identity` is
/// supplied by the login flow at issuance time and is immutable once it has
/// been embedded in a token. Wire field names match the platform's existing
/// user-context payloads so `x-user-context` headers interoperate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "uid")]
    pub id: String,

    #[serde(rename = "username")]
    pub display_name: String,

    /// Tenant / trust domain the identity belongs to.
    pub domain: String,

    #[serde(default)]
    pub roles: HashSet<String>,

    #[serde(default)]
    pub permissions: HashSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl Identity {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            domain: domain.into(),
            roles: HashSet::new(),
            permissions: HashSet::new(),
            email: None,
            extra: Map::new(),
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    /// True when the identity holds at least one of the given roles.
    pub fn has_any_role<S: AsRef<str>>(&self, roles: &[S]) -> bool {
        roles.iter().any(|r| self.roles.contains(r.as_ref()))
    }

    /// True when the identity holds at least one of the given permissions.
    pub fn has_any_permission<S: AsRef<str>>(&self, permissions: &[S]) -> bool {
        permissions
            .iter()
            .any(|p| self.permissions.contains(p.as_ref()))
    }
}
