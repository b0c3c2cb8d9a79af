use thiserror::Error;

/// Error taxonomy for the gateway core. Variant names double as the
/// propagation policy documented alongside each one.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Surfaced as HTTP 401: missing/wrong credentials, bad HMAC, expired token.
    #[error("authentication failure: {0}")]
    AuthenticationFailure(String),

    /// Surfaced as HTTP 403: caller identity resolved but lacks a required scope.
    #[error("authorization failure: missing scopes {0:?}")]
    AuthorizationFailure(Vec<String>),

    /// Surfaced as HTTP 400: malformed canonical payload, bad completion status, unsupported grant.
    #[error("validation failure: {0}")]
    ValidationFailure(String),

    /// Surfaced as HTTP 404. Also used to hide cross-tenant access — never leak existence.
    #[error("not found: {0}")]
    NotFound(String),

    /// Surfaced as HTTP 429.
    #[error("rate limit exceeded for tenant {tenant_id}")]
    RateLimited { tenant_id: String },

    /// Recovered locally by the ingress handler: idempotency/hash match.
    #[error("duplicate admission, existing job {job_id}")]
    DuplicateAdmission { job_id: String },

    /// Recovered locally by the worker: parser/collateral/webhook hiccup, pipeline continues.
    #[error("downstream transient error: {0}")]
    DownstreamTransient(String),

    /// Surfaced as 5xx from the worker; job is marked failed.
    #[error("downstream fatal error: {0}")]
    DownstreamFatal(String),

    /// Fatal at startup (missing/invalid encryption key); a 5xx without state mutation on read.
    #[error("crypto error: {0}")]
    CryptoError(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("http error: {0}")]
    Http(String),
}

impl From<sqlx::Error> for GatewayError {
    fn from(e: sqlx::Error) -> Self {
        GatewayError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Http(e.to_string())
    }
}

impl From<config::ConfigError> for GatewayError {
    fn from(e: config::ConfigError) -> Self {
        GatewayError::Config(e.to_string())
    }
}
