//! HMAC-signed service-to-service trust.
//!
//! A caller inside the trust domain presents five headers; verification
//! re-establishes trust per request from the shared secret alone, with no
//! per-caller state persisted. The signature covers
//! `"{id}:{name}:{timestamp}:{nonce}"` and the timestamp bounds the replay
//! window. The optional nonce guard closes replay inside that window; the
//! platform this layer replaced signed the nonce but never checked it, so
//! the guard can be switched off to reproduce that accepted exposure.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::RngCore;
use redis_utils::{with_timeout, SharedConnectionManager};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::error::{AuthError, Result};
use crate::identity::Identity;

type HmacSha256 = Hmac<Sha256>;

pub const SERVICE_ID_HEADER: &str = "x-service-id";
pub const SERVICE_NAME_HEADER: &str = "x-service-name";
pub const SERVICE_SIGNATURE_HEADER: &str = "x-service-signature";
pub const SERVICE_TIMESTAMP_HEADER: &str = "x-service-timestamp";
pub const SERVICE_NONCE_HEADER: &str = "x-service-nonce";
pub const USER_CONTEXT_HEADER: &str = "x-user-context";

const NONCE_PREFIX: &str = "auth:nonce:";

/// Raw header tuple presented by a calling service.
#[derive(Debug, Clone)]
pub struct ServiceHeaders {
    pub service_id: String,
    pub service_name: String,
    pub timestamp: String,
    pub nonce: String,
    pub signature: String,
    pub user_context: Option<String>,
}

impl ServiceHeaders {
    /// Collect the five required headers (plus the optional user context)
    /// through a transport-agnostic lookup.
    pub fn collect<'a, F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        let required = |name: &str| {
            get(name)
                .map(str::to_owned)
                .ok_or(AuthError::MissingServiceHeaders)
        };
        Ok(Self {
            service_id: required(SERVICE_ID_HEADER)?,
            service_name: required(SERVICE_NAME_HEADER)?,
            timestamp: required(SERVICE_TIMESTAMP_HEADER)?,
            nonce: required(SERVICE_NONCE_HEADER)?,
            signature: required(SERVICE_SIGNATURE_HEADER)?,
            user_context: get(USER_CONTEXT_HEADER).map(str::to_owned),
        })
    }
}

/// Verified caller attached to the request after a successful check.
#[derive(Debug, Clone)]
pub struct ServiceContext {
    pub service_id: String,
    pub service_name: String,
    /// Millisecond epoch from the signed timestamp header.
    pub timestamp: i64,
    /// Acting identity forwarded by the caller, when the endpoint asked
    /// for one.
    pub user: Option<Identity>,
}

/// Verifier/signer for one trust domain's shared secret.
pub struct ServiceTrust {
    secret: String,
    max_skew_ms: i64,
    nonce_guard: Option<NonceGuard>,
}

impl ServiceTrust {
    pub fn new(secret: impl Into<String>, max_skew_ms: u64) -> Self {
        Self {
            secret: secret.into(),
            max_skew_ms: max_skew_ms as i64,
            nonce_guard: None,
        }
    }

    /// Enable the replay guard: a nonce may authenticate only once within
    /// the skew window.
    pub fn with_nonce_guard(mut self, redis: SharedConnectionManager, timeout: Duration) -> Self {
        let ttl_ms = (self.max_skew_ms as u64) * 2;
        self.nonce_guard = Some(NonceGuard {
            redis,
            ttl_ms,
            timeout,
        });
        self
    }

    /// Produce the signed header set for an outbound service call.
    pub fn sign_headers(
        &self,
        service_id: &str,
        service_name: &str,
        user: Option<&Identity>,
    ) -> Result<Vec<(String, String)>> {
        let timestamp = Utc::now().timestamp_millis().to_string();
        let nonce = new_nonce();
        let signature = self.compute_signature(service_id, service_name, &timestamp, &nonce);

        let mut headers = vec![
            (SERVICE_ID_HEADER.to_string(), service_id.to_string()),
            (SERVICE_NAME_HEADER.to_string(), service_name.to_string()),
            (SERVICE_SIGNATURE_HEADER.to_string(), signature),
            (SERVICE_TIMESTAMP_HEADER.to_string(), timestamp),
            (SERVICE_NONCE_HEADER.to_string(), nonce),
        ];
        if let Some(user) = user {
            let payload = serde_json::to_vec(user)
                .map_err(|e| AuthError::Internal(format!("failed to encode user context: {e}")))?;
            headers.push((USER_CONTEXT_HEADER.to_string(), BASE64.encode(payload)));
        }
        Ok(headers)
    }

    /// Verify a presented header set and build the caller's context.
    ///
    /// Order: timestamp freshness, signature, nonce replay, allow-list,
    /// user context. The nonce is only consumed after the signature
    /// checks out, so unauthenticated traffic cannot poison the guard.
    pub async fn verify(
        &self,
        headers: &ServiceHeaders,
        allowed_services: Option<&[String]>,
        require_user_context: bool,
    ) -> Result<ServiceContext> {
        let timestamp: i64 = headers.timestamp.parse().map_err(|_| {
            warn!("service timestamp is not a millisecond epoch");
            AuthError::StaleTimestamp
        })?;
        let skew = (Utc::now().timestamp_millis() - timestamp).abs();
        if skew > self.max_skew_ms {
            warn!(skew_ms = skew, "service timestamp outside accepted window");
            return Err(AuthError::StaleTimestamp);
        }

        let expected = self.compute_signature(
            &headers.service_id,
            &headers.service_name,
            &headers.timestamp,
            &headers.nonce,
        );
        if !constant_time_eq(&expected, &headers.signature) {
            warn!(service = %headers.service_name, "service signature mismatch");
            return Err(AuthError::InvalidServiceSignature);
        }

        if let Some(guard) = &self.nonce_guard {
            if !guard
                .check_and_store(&headers.service_id, &headers.nonce)
                .await?
            {
                warn!(service = %headers.service_name, "service nonce replayed");
                return Err(AuthError::ReplayedNonce);
            }
        }

        if let Some(allowed) = allowed_services {
            if !allowed.iter().any(|s| s == &headers.service_name) {
                warn!(service = %headers.service_name, "service not in endpoint allow-list");
                return Err(AuthError::ServiceNotAuthorized(
                    headers.service_name.clone(),
                ));
            }
        }

        let user = if require_user_context {
            let raw = headers
                .user_context
                .as_deref()
                .ok_or(AuthError::InvalidUserContext)?;
            Some(decode_user_context(raw)?)
        } else {
            None
        };

        debug!(service = %headers.service_name, "cross-service authentication successful");
        Ok(ServiceContext {
            service_id: headers.service_id.clone(),
            service_name: headers.service_name.clone(),
            timestamp,
            user,
        })
    }

    fn compute_signature(
        &self,
        service_id: &str,
        service_name: &str,
        timestamp: &str,
        nonce: &str,
    ) -> String {
        let payload = format!("{service_id}:{service_name}:{timestamp}:{nonce}");
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any size");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

/// Short-lived nonce-seen set in the shared store.
struct NonceGuard {
    redis: SharedConnectionManager,
    ttl_ms: u64,
    timeout: Duration,
}

impl NonceGuard {
    /// Returns true when the nonce is fresh; records it atomically so the
    /// second presentation of the same nonce loses.
    async fn check_and_store(&self, service_id: &str, nonce: &str) -> Result<bool> {
        let key = format!("{NONCE_PREFIX}{service_id}:{nonce}");
        let mut conn = self.redis.lock().await.clone();
        let stored: Option<String> = with_timeout(self.timeout, async {
            redis::cmd("SET")
                .arg(&key)
                .arg("1")
                .arg("NX")
                .arg("PX")
                .arg(self.ttl_ms)
                .query_async(&mut conn)
                .await
        })
        .await?;
        Ok(stored.is_some())
    }
}

fn decode_user_context(raw: &str) -> Result<Identity> {
    let bytes = BASE64.decode(raw).map_err(|e| {
        warn!("user context is not valid base64: {}", e);
        AuthError::InvalidUserContext
    })?;
    serde_json::from_slice(&bytes).map_err(|e| {
        warn!("user context is not a valid identity payload: {}", e);
        AuthError::InvalidUserContext
    })
}

fn constant_time_eq(expected: &str, provided: &str) -> bool {
    expected
        .as_bytes()
        .ct_eq(provided.as_bytes())
        .unwrap_u8()
        == 1
}

fn new_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "trust-secret-0123456789-0123456789-012";

    fn trust() -> ServiceTrust {
        ServiceTrust::new(SECRET, 5 * 60 * 1000)
    }

    fn header_map(headers: &[(String, String)]) -> HashMap<String, String> {
        headers.iter().cloned().collect()
    }

    fn collect(map: &HashMap<String, String>) -> Result<ServiceHeaders> {
        ServiceHeaders::collect(|name| map.get(name).map(String::as_str))
    }

    #[tokio::test]
    async fn signed_headers_verify() {
        let trust = trust();
        let headers = header_map(&trust.sign_headers("svc-1", "billing", None).unwrap());
        let parsed = collect(&headers).unwrap();

        let ctx = trust.verify(&parsed, None, false).await.unwrap();
        assert_eq!(ctx.service_id, "svc-1");
        assert_eq!(ctx.service_name, "billing");
        assert!(ctx.user.is_none());
    }

    #[tokio::test]
    async fn missing_header_is_rejected() {
        let trust = trust();
        let mut headers = header_map(&trust.sign_headers("svc-1", "billing", None).unwrap());
        headers.remove(SERVICE_NONCE_HEADER);

        let err = collect(&headers).unwrap_err();
        assert!(matches!(err, AuthError::MissingServiceHeaders));
    }

    #[tokio::test]
    async fn tampered_signature_is_rejected() {
        let trust = trust();
        let mut headers = header_map(&trust.sign_headers("svc-1", "billing", None).unwrap());
        let sig = headers.get_mut(SERVICE_SIGNATURE_HEADER).unwrap();
        // Flip one character.
        let flipped = if sig.ends_with('0') { "1" } else { "0" };
        sig.replace_range(sig.len() - 1.., flipped);

        let parsed = collect(&headers).unwrap();
        let err = trust.verify(&parsed, None, false).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidServiceSignature));
    }

    #[tokio::test]
    async fn stale_timestamp_is_rejected() {
        let trust = trust();
        let mut headers = header_map(&trust.sign_headers("svc-1", "billing", None).unwrap());
        let old = Utc::now().timestamp_millis() - 10 * 60 * 1000;
        headers.insert(SERVICE_TIMESTAMP_HEADER.to_string(), old.to_string());

        let parsed = collect(&headers).unwrap();
        let err = trust.verify(&parsed, None, false).await.unwrap_err();
        // Rewriting the timestamp also breaks the signature, but freshness
        // is checked first.
        assert!(matches!(err, AuthError::StaleTimestamp));
    }

    #[tokio::test]
    async fn allow_list_is_enforced() {
        let trust = trust();
        let headers = header_map(&trust.sign_headers("svc-1", "billing", None).unwrap());
        let parsed = collect(&headers).unwrap();

        let allowed = vec!["reporting".to_string()];
        let err = trust
            .verify(&parsed, Some(&allowed), false)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ServiceNotAuthorized(name) if name == "billing"));

        let allowed = vec!["billing".to_string(), "reporting".to_string()];
        assert!(trust.verify(&parsed, Some(&allowed), false).await.is_ok());
    }

    #[tokio::test]
    async fn forwarded_user_context_round_trips() {
        let trust = trust();
        let user = Identity::new("7", "ada", "core").with_roles(["admin"]);
        let headers = header_map(&trust.sign_headers("svc-1", "billing", Some(&user)).unwrap());
        let parsed = collect(&headers).unwrap();

        let ctx = trust.verify(&parsed, None, true).await.unwrap();
        let acting = ctx.user.unwrap();
        assert_eq!(acting.id, "7");
        assert!(acting.roles.contains("admin"));
    }

    #[tokio::test]
    async fn required_user_context_must_be_present_and_valid() {
        let trust = trust();
        let headers = header_map(&trust.sign_headers("svc-1", "billing", None).unwrap());
        let parsed = collect(&headers).unwrap();
        let err = trust.verify(&parsed, None, true).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidUserContext));

        let mut headers = header_map(&trust.sign_headers("svc-1", "billing", None).unwrap());
        headers.insert(USER_CONTEXT_HEADER.to_string(), "!!not-base64!!".into());
        let parsed = collect(&headers).unwrap();
        let err = trust.verify(&parsed, None, true).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidUserContext));
    }
}
