use serde::{Deserialize, Serialize};

use crate::identity::Identity;

/// Suffix correlating a refresh token's id with the pair's base id.
pub const REFRESH_ID_SUFFIX: &str = ":refresh";

/// The two token classes the engine signs, each with its own secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// Verified claim set carried by a token.
///
/// `jti` identifies one issuance event: the access token carries the base id
/// and the refresh token minted alongside it carries `"{id}:refresh"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(flatten)]
    pub identity: Identity,

    #[serde(rename = "type")]
    pub kind: TokenKind,

    pub iss: String,
    pub aud: String,

    /// Issued at (Unix seconds).
    pub iat: i64,

    /// Expiry (Unix seconds).
    pub exp: i64,

    pub jti: String,
}

impl TokenClaims {
    /// The base id shared by both tokens of the issuance event.
    pub fn pair_id(&self) -> &str {
        self.jti
            .strip_suffix(REFRESH_ID_SUFFIX)
            .unwrap_or(&self.jti)
    }
}

/// Refresh-token id correlated with a base id.
pub fn refresh_token_id(pair_id: &str) -> String {
    format!("{pair_id}{REFRESH_ID_SUFFIX}")
}

/// Freshly minted token pair. Created only by issuance and never mutated;
/// rotation mints a new pair rather than updating one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_expires_in: u64,
    pub refresh_token_expires_in: u64,
    pub token_type: String,
    pub user: Identity,
}

/// Refresh endpoint input contract.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Revoke-all endpoint/internal call input contract.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeAllRequest {
    pub identity_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_kind_wire_format() {
        assert_eq!(serde_json::to_string(&TokenKind::Access).unwrap(), r#""access""#);
        assert_eq!(serde_json::to_string(&TokenKind::Refresh).unwrap(), r#""refresh""#);
    }

    #[test]
    fn pair_id_strips_refresh_suffix() {
        let claims: TokenClaims = serde_json::from_value(serde_json::json!({
            "uid": "1",
            "username": "ada",
            "domain": "core",
            "type": "refresh",
            "iss": "platform",
            "aud": "api",
            "iat": 0,
            "exp": 60,
            "jti": "abc123:refresh",
        }))
        .unwrap();

        assert_eq!(claims.pair_id(), "abc123");
        assert_eq!(refresh_token_id("abc123"), "abc123:refresh");
    }

    #[test]
    fn claims_flatten_identity_fields() {
        let claims: TokenClaims = serde_json::from_value(serde_json::json!({
            "uid": "7",
            "username": "ada",
            "domain": "core",
            "roles": ["user"],
            "type": "access",
            "iss": "platform",
            "aud": "api",
            "iat": 100,
            "exp": 200,
            "jti": "abc",
        }))
        .unwrap();

        assert_eq!(claims.identity.id, "7");
        assert!(claims.identity.roles.contains("user"));
        assert_eq!(claims.kind, TokenKind::Access);
    }

    #[test]
    fn token_pair_uses_camel_case() {
        let pair = TokenPair {
            access_token: "a".into(),
            refresh_token: "r".into(),
            access_token_expires_in: 900,
            refresh_token_expires_in: 604_800,
            token_type: "Bearer".into(),
            user: Identity::new("1", "ada", "core"),
        };
        let json = serde_json::to_value(&pair).unwrap();

        assert_eq!(json["accessToken"], "a");
        assert_eq!(json["accessTokenExpiresIn"], 900);
        assert_eq!(json["tokenType"], "Bearer");
    }
}
