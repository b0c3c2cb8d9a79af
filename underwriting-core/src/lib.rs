pub mod auth;
pub mod collaborators;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod job;
pub mod metrics;
pub mod queue;
pub mod rate_limit;
pub mod tenant;
pub mod webhook;
pub mod worker;

pub use config::GatewayConfig;
pub use crypto::{CryptoVault, VaultKey};
pub use db::Db;
pub use error::GatewayError;
pub use metrics::Metrics;
pub use queue::{InMemoryQueue, Queue};
pub use rate_limit::RateLimiter;
