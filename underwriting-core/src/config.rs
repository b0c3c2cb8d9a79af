//! Process-wide configuration, loaded once at startup and handed down via
//! `Arc` — no cached-settings singleton.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GatewayConfig {
    pub bind_addr: String,
    pub bind_port: u16,

    /// 64 hex chars, required at startup — see `crypto::VaultKey`.
    pub encryption_key: String,
    pub database_url: String,
    /// Present only when a durable broker backs the queue; absent selects the
    /// in-memory fallback.
    #[serde(default)]
    pub redis_url: Option<String>,
    pub sandbox_mode: bool,

    pub oauth2_token_ttl_seconds: i64,
    pub request_id_header: String,

    pub worker_pool_size: usize,
    #[serde(default)]
    pub bootstrap_tenants_path: Option<String>,

    #[serde(default)]
    pub collateral_endpoint: Option<String>,
    #[serde(default)]
    pub llm_endpoint: Option<String>,

    pub collateral_timeout_secs: u64,
    pub llm_timeout_secs: u64,
    pub pdf_download_timeout_secs: u64,
    pub webhook_timeout_secs: u64,

    pub webhook_max_attempts: u32,
    pub webhook_backoff_seconds: u64,

    pub bank_statement_max_bytes: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        toml::from_str(DEFAULTS).expect("default config is valid toml")
    }
}

const DEFAULTS: &str = include_str!("config_defaults.toml");

impl GatewayConfig {
    /// Loads defaults, overlays an optional config file, then environment
    /// variables prefixed `UW__` (double-underscore separator), matching the
    /// layering the teacher's `Conf::new` uses for its own TOML defaults.
    pub fn load(config_file: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULTS, config::FileFormat::Toml));

        if let Some(path) = config_file {
            builder = builder.add_source(File::with_name(path).required(false));
        }

        let conf: Self = builder
            .add_source(
                Environment::with_prefix("UW")
                    .separator("__")
                    .prefix_separator("_"),
            )
            .build()?
            .try_deserialize()?;
        Ok(conf)
    }
}
