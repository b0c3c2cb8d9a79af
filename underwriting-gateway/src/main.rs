//! Composition root: loads configuration, opens the database pool, resolves
//! the vault key, seeds bootstrap tenants, spawns the worker pool, and serves
//! the HTTP API. Grounded in the teacher's `trading-blueprint-bin/src/main.rs`
//! bootstrap shape (`setup_log`, `axum::serve` over a bound `TcpListener`),
//! stripped of the Tangle/QoS on-chain orchestration it otherwise performs.

use std::sync::Arc;

use underwriting_core::auth::TokenIssuer;
use underwriting_core::collaborators::collateral::{HttpCollateralValuator, SandboxCollateralValuator};
use underwriting_core::collaborators::llm::{HttpMemoGenerator, SandboxMemoGenerator};
use underwriting_core::collaborators::parser::SandboxParser;
use underwriting_core::collaborators::rules::DefaultRuleEvaluator;
use underwriting_core::collaborators::{BankStatementParser, CollateralValuator, MemoGenerator, RuleEvaluator};
use underwriting_core::tenant::BootstrapFile;
use underwriting_core::webhook::WebhookEmitter;
use underwriting_core::worker::{Worker, WorkerConfig};
use underwriting_core::{CryptoVault, Db, GatewayConfig, InMemoryQueue, Metrics, Queue, RateLimiter, VaultKey};
use underwriting_http_api::AppState;

#[tokio::main]
async fn main() {
    setup_log();

    let config_file = std::env::var("CONFIG_FILE").ok();
    let config = GatewayConfig::load(config_file.as_deref()).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to load configuration");
        std::process::exit(1);
    });

    // CryptoError at startup is fatal — a misconfigured vault key
    // must never let the process serve traffic.
    let vault_key = VaultKey::from_hex(&config.encryption_key).unwrap_or_else(|e| {
        tracing::error!(error = %e, "invalid ENCRYPTION_KEY, refusing to start");
        std::process::exit(1);
    });
    let vault = CryptoVault::new(vault_key);

    let db = Db::connect(&config.database_url).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to connect to database");
        std::process::exit(1);
    });
    if let Err(e) = db.migrate().await {
        tracing::error!(error = %e, "failed to run migrations");
        std::process::exit(1);
    }

    if let Some(path) = &config.bootstrap_tenants_path {
        if let Err(e) = load_bootstrap_tenants(&db, path).await {
            tracing::warn!(error = %e, path, "failed to load bootstrap tenants");
        }
    }

    let metrics = Arc::new(Metrics::new());
    let queue: Arc<dyn Queue> = Arc::new(InMemoryQueue::new());
    let rate_limiter = RateLimiter::new();
    let token_issuer = TokenIssuer::new(config.encryption_key.clone(), config.oauth2_token_ttl_seconds);

    let (parser, collateral, llm): (
        Arc<dyn BankStatementParser>,
        Arc<dyn CollateralValuator>,
        Arc<dyn MemoGenerator>,
    ) = if config.sandbox_mode {
        (
            Arc::new(SandboxParser),
            Arc::new(SandboxCollateralValuator),
            Arc::new(SandboxMemoGenerator),
        )
    } else {
        (
            Arc::new(SandboxParser),
            Arc::new(HttpCollateralValuator::new(
                config
                    .collateral_endpoint
                    .clone()
                    .unwrap_or_default(),
                std::time::Duration::from_secs(config.collateral_timeout_secs),
            )),
            Arc::new(HttpMemoGenerator::new(
                config.llm_endpoint.clone().unwrap_or_default(),
                std::time::Duration::from_secs(config.llm_timeout_secs),
            )),
        )
    };
    let rules: Arc<dyn RuleEvaluator> = Arc::new(DefaultRuleEvaluator);

    let webhook = WebhookEmitter::new(
        std::time::Duration::from_secs(config.webhook_timeout_secs),
        config.webhook_max_attempts,
        config.webhook_backoff_seconds,
    );

    let worker = Arc::new(Worker::new(
        db.clone(),
        vault.clone(),
        parser,
        collateral,
        llm,
        rules,
        webhook,
        metrics.clone(),
        WorkerConfig {
            bank_statement_max_bytes: config.bank_statement_max_bytes,
            pdf_download_timeout: std::time::Duration::from_secs(config.pdf_download_timeout_secs),
        },
    ));

    for i in 0..config.worker_pool_size.max(1) {
        let worker = worker.clone();
        let queue = queue.clone();
        tokio::spawn(async move {
            tracing::info!(worker_index = i, "underwrite worker started");
            while let Some(job_id) = queue.consume().await {
                worker.process(&job_id).await;
            }
        });
    }

    let bind_addr = config.bind_addr.clone();
    let bind_port = config.bind_port;
    let config = Arc::new(config);

    let state = Arc::new(AppState {
        db,
        vault,
        queue,
        rate_limiter,
        metrics,
        token_issuer,
        config,
    });
    let router = underwriting_http_api::build_router(state);

    let listener = tokio::net::TcpListener::bind((bind_addr.as_str(), bind_port))
        .await
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to bind listener");
            std::process::exit(1);
        });
    tracing::info!(addr = %bind_addr, port = bind_port, "underwriting gateway listening");
    if let Err(e) = axum::serve(listener, router).await {
        tracing::error!(error = %e, "server error");
    }
}

async fn load_bootstrap_tenants(db: &Db, path: &str) -> Result<(), underwriting_core::GatewayError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| underwriting_core::GatewayError::Config(e.to_string()))?;
    let file: BootstrapFile = toml::from_str(&contents)
        .map_err(|e| underwriting_core::GatewayError::Config(e.to_string()))?;
    for bootstrap in file.tenants {
        let tenant_id = bootstrap.tenant_id.clone();
        db.upsert_tenant(&bootstrap.into_tenant()).await?;
        tracing::info!(tenant_id, "bootstrap tenant loaded");
    }
    Ok(())
}

fn setup_log() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};
    if tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .is_err()
    {}
}
