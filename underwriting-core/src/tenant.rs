//! Tenant Store. Read-only at request time: tenants are created only
//! at bootstrap from the seed file, never mutated by the request flow.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tenant {
    pub tenant_id: String,
    pub name: String,
    pub api_key_hash: Option<String>,
    pub oauth_client_id: Option<String>,
    pub oauth_client_secret_hash: Option<String>,
    pub tenant_secret: String,
    pub webhook_secret: String,
    pub rate_limit_rps: i32,
}

pub fn sha256_hex(input: &str) -> String {
    sha256_hex_bytes(input.as_bytes())
}

/// Used for `request_hash`, computed over the raw request body rather
/// than a `str`.
pub fn sha256_hex_bytes(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hex::encode(hasher.finalize())
}

/// A tenant entry as it appears in the bootstrap seed file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TenantBootstrap {
    pub name: String,
    pub tenant_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_hash: Option<String>,
    pub webhook_secret: String,
    #[serde(default)]
    pub oauth_client_id: Option<String>,
    #[serde(default)]
    pub oauth_client_secret: Option<String>,
    pub tenant_secret: String,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_rps: i32,
}

fn default_rate_limit() -> i32 {
    10
}

#[derive(Clone, Debug, Deserialize)]
pub struct BootstrapFile {
    #[serde(default)]
    pub tenants: Vec<TenantBootstrap>,
}

impl TenantBootstrap {
    pub fn into_tenant(self) -> Tenant {
        let api_key_hash = self
            .api_key_hash
            .or_else(|| self.api_key.as_deref().map(sha256_hex));
        let oauth_client_secret_hash = self.oauth_client_secret.as_deref().map(sha256_hex);
        Tenant {
            tenant_id: self.tenant_id,
            name: self.name,
            api_key_hash,
            oauth_client_id: self.oauth_client_id,
            oauth_client_secret_hash,
            tenant_secret: self.tenant_secret,
            webhook_secret: self.webhook_secret,
            rate_limit_rps: self.rate_limit_rps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_hash_is_derived_when_absent() {
        let raw = TenantBootstrap {
            name: "Acme Bank".into(),
            tenant_id: "tn_acme".into(),
            api_key: Some("plain-key".into()),
            api_key_hash: None,
            webhook_secret: "ws".into(),
            oauth_client_id: None,
            oauth_client_secret: None,
            tenant_secret: "ts".into(),
            rate_limit_rps: 5,
        };
        let tenant = raw.into_tenant();
        assert_eq!(tenant.api_key_hash.unwrap(), sha256_hex("plain-key"));
    }
}
