//! Token issuance and verification.
//!
//! Two token classes are signed with two distinct HS256 secrets, so holding
//! one secret cannot forge the other class. Verification here is CPU-bound
//! only; the blacklist consultation happens a layer up in
//! [`crate::service::AuthService`].

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use tracing::warn;

use crate::claims::{refresh_token_id, TokenClaims, TokenKind, TokenPair};
use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use crate::identity::Identity;

struct KeySet {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeySet {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Signs and validates both token classes.
pub struct TokenEngine {
    access_keys: KeySet,
    refresh_keys: KeySet,
    issuer: String,
    audience: String,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
}

/// Claims fields readable without signature verification.
///
/// Only revocation of caller-supplied tokens uses this; nothing read here is
/// ever trusted for authentication.
#[derive(Debug)]
pub struct PeekedToken {
    pub jti: String,
    pub exp: i64,
}

/// Result of one issuance event: the pair plus its base token id.
#[derive(Debug)]
pub struct IssuedPair {
    pub pair_id: String,
    pub pair: TokenPair,
}

impl TokenEngine {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            access_keys: KeySet::from_secret(&config.access_token_secret),
            refresh_keys: KeySet::from_secret(&config.refresh_token_secret),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_ttl_secs: config.access_token_ttl_secs,
            refresh_ttl_secs: config.refresh_token_ttl_secs,
        }
    }

    /// Mint a correlated access/refresh pair for an identity.
    pub fn issue(&self, user: &Identity) -> Result<IssuedPair> {
        let pair_id = new_token_id();
        let now = Utc::now().timestamp();

        let access_claims = TokenClaims {
            identity: user.clone(),
            kind: TokenKind::Access,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now,
            exp: now + self.access_ttl_secs as i64,
            jti: pair_id.clone(),
        };
        let refresh_claims = TokenClaims {
            identity: user.clone(),
            kind: TokenKind::Refresh,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now,
            exp: now + self.refresh_ttl_secs as i64,
            jti: refresh_token_id(&pair_id),
        };

        let header = Header::new(Algorithm::HS256);
        let access_token = encode(&header, &access_claims, &self.access_keys.encoding)
            .map_err(|e| AuthError::Internal(format!("failed to sign access token: {e}")))?;
        let refresh_token = encode(&header, &refresh_claims, &self.refresh_keys.encoding)
            .map_err(|e| AuthError::Internal(format!("failed to sign refresh token: {e}")))?;

        let pair = TokenPair {
            access_token,
            refresh_token,
            access_token_expires_in: self.access_ttl_secs,
            refresh_token_expires_in: self.refresh_ttl_secs,
            token_type: "Bearer".to_string(),
            user: user.clone(),
        };
        Ok(IssuedPair { pair_id, pair })
    }

    /// Validate a token against the expected class.
    ///
    /// Checks run in order: signature and expiry with the class's secret,
    /// then token kind, then issuer/audience. Signature and expiry failures
    /// are indistinguishable to the caller; the log line keeps the cause.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<TokenClaims> {
        let validation = self.validation();
        let keys = self.keys_for(expected);

        let data = match decode::<TokenClaims>(token, &keys.decoding, &validation) {
            Ok(data) => data,
            Err(err) => {
                match err.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                        warn!("token verification failed: expired");
                    }
                    jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                        warn!("token verification failed: bad signature");
                        // A token of the other class fails the signature
                        // check here because the secrets differ. Re-check
                        // with the sibling secret so a swapped token class
                        // reports as such rather than as tampering.
                        if let Some(kind) = self.kind_under_sibling_secret(token, expected) {
                            if kind != expected {
                                return Err(AuthError::WrongTokenType);
                            }
                        }
                    }
                    other => {
                        warn!("token verification failed: {:?}", other);
                    }
                }
                return Err(AuthError::InvalidToken);
            }
        };

        let claims = data.claims;
        if claims.kind != expected {
            warn!(
                presented = claims.kind.as_str(),
                expected = expected.as_str(),
                "token kind mismatch"
            );
            return Err(AuthError::WrongTokenType);
        }
        if claims.iss != self.issuer || claims.aud != self.audience {
            warn!(iss = %claims.iss, aud = %claims.aud, "issuer/audience mismatch");
            return Err(AuthError::InvalidIssuerAudience);
        }
        Ok(claims)
    }

    /// Read `jti`/`exp` without verifying the signature.
    pub fn peek(&self, token: &str) -> Option<PeekedToken> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let key = DecodingKey::from_secret(&[]);
        decode::<TokenClaims>(token, &key, &validation)
            .ok()
            .map(|data| PeekedToken {
                jti: data.claims.jti,
                exp: data.claims.exp,
            })
    }

    fn keys_for(&self, kind: TokenKind) -> &KeySet {
        match kind {
            TokenKind::Access => &self.access_keys,
            TokenKind::Refresh => &self.refresh_keys,
        }
    }

    fn kind_under_sibling_secret(&self, token: &str, expected: TokenKind) -> Option<TokenKind> {
        let sibling = match expected {
            TokenKind::Access => TokenKind::Refresh,
            TokenKind::Refresh => TokenKind::Access,
        };
        decode::<TokenClaims>(token, &self.keys_for(sibling).decoding, &self.validation())
            .ok()
            .map(|data| data.claims.kind)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        // iss/aud are checked manually so a mismatch surfaces as its own
        // error kind instead of a generic validation failure.
        validation.validate_aud = false;
        validation
    }
}

/// Fresh random token id: 16 bytes, hex-encoded.
pub fn new_token_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
