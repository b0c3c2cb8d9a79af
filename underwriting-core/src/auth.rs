//! HMAC request/webhook signing and JWT bearer-token issuance/verification.
//! HMAC verification is grounded in the constant-time comparison
//! pattern webhook receivers use against forged signatures; JWTs use HS256
//! against the process-wide signing key.

use hmac::{Hmac, Mac};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("signature mismatch")]
    SignatureMismatch,
    #[error("invalid key length")]
    InvalidKeyLength,
    #[error("token error: {0}")]
    Token(String),
}

/// `signature = base64(HMAC-SHA256(secret, body))`.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, mac.finalize().into_bytes())
}

/// Deterministic HMAC over a JSON value's canonical serialization — used by
/// testable-property #1 (`sign_json` stability).
pub fn sign_json(value: &serde_json::Value, secret: &str) -> Result<String, AuthError> {
    let body = serde_json::to_vec(value).map_err(|e| AuthError::Token(e.to_string()))?;
    Ok(sign_payload(secret, &body))
}

/// Verifies `presented` (base64) against `expected = sign_payload(secret, body)`
/// in constant time.
pub fn verify_signature(secret: &str, body: &[u8], presented: &str) -> bool {
    let expected = sign_payload(secret, body);
    let expected_bytes = expected.as_bytes();
    let presented_bytes = presented.as_bytes();
    if expected_bytes.len() != presented_bytes.len() {
        return false;
    }
    expected_bytes.ct_eq(presented_bytes).into()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    pub tenant_id: String,
    pub scope: String,
    pub exp: i64,
    pub jti: String,
}

impl Claims {
    pub fn scopes(&self) -> Vec<&str> {
        self.scope.split(' ').filter(|s| !s.is_empty()).collect()
    }

    pub fn has_scope(&self, required: &str) -> bool {
        self.scopes().contains(&required)
    }
}

pub struct TokenIssuer {
    signing_key: String,
    ttl_seconds: i64,
}

impl TokenIssuer {
    pub fn new(signing_key: String, ttl_seconds: i64) -> Self {
        Self {
            signing_key,
            ttl_seconds,
        }
    }

    /// Issues `{tenant_id, scope, exp=now+TTL, jti=random}` signed HS256.
    pub fn issue(&self, tenant_id: &str, scope: &str) -> Result<(String, i64), AuthError> {
        let exp = chrono::Utc::now().timestamp() + self.ttl_seconds;
        let claims = Claims {
            tenant_id: tenant_id.to_string(),
            scope: scope.to_string(),
            exp,
            jti: random_jti(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.signing_key.as_bytes()),
        )
        .map_err(|e| AuthError::Token(e.to_string()))?;
        Ok((token, self.ttl_seconds))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.signing_key.as_bytes()),
            &validation,
        )
        .map_err(|e| AuthError::Token(e.to_string()))?;
        Ok(data.claims)
    }
}

fn random_jti() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 16] = rng.r#gen();
    hex::encode(bytes)
}

pub const SCOPE_UNDERWRITE_CREATE: &str = "underwrite:create";
pub const SCOPE_UNDERWRITE_READ: &str = "underwrite:read";
pub const SCOPE_DASHBOARD_READ: &str = "dashboard:read";
pub const SCOPE_DASHBOARD_ADMIN: &str = "dashboard:admin";

/// Scopes granted to an API-key-authenticated caller.
pub fn api_key_default_scopes() -> String {
    format!("{SCOPE_UNDERWRITE_CREATE} {SCOPE_UNDERWRITE_READ}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_payload_is_deterministic() {
        let a = sign_payload("ts", b"body-bytes");
        let b = sign_payload("ts", b"body-bytes");
        assert_eq!(a, b);
    }

    #[test]
    fn verify_signature_accepts_correct_and_rejects_wrong_secret() {
        let body = b"{\"job_id\":\"BANK-001\"}";
        let sig = sign_payload("ts", body);
        assert!(verify_signature("ts", body, &sig));
        assert!(!verify_signature("other-secret", body, &sig));
    }

    #[test]
    fn verify_signature_rejects_tampered_body() {
        let body = b"original";
        let sig = sign_payload("ts", body);
        assert!(!verify_signature("ts", b"tampered!", &sig));
    }

    #[test]
    fn token_round_trips_and_carries_scope() {
        let issuer = TokenIssuer::new("process-signing-key".into(), 3600);
        let (token, ttl) = issuer.issue("tn_acme", &api_key_default_scopes()).unwrap();
        assert_eq!(ttl, 3600);
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.tenant_id, "tn_acme");
        assert!(claims.has_scope(SCOPE_UNDERWRITE_CREATE));
        assert!(!claims.has_scope(SCOPE_DASHBOARD_ADMIN));
    }

    #[test]
    fn expired_token_fails_verification() {
        let issuer = TokenIssuer::new("process-signing-key".into(), -10);
        let (token, _) = issuer.issue("tn_acme", SCOPE_UNDERWRITE_READ).unwrap();
        assert!(issuer.verify(&token).is_err());
    }
}
