use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use underwriting_core::auth::{TokenIssuer, sign_payload};
use underwriting_core::collaborators::collateral::SandboxCollateralValuator;
use underwriting_core::collaborators::llm::SandboxMemoGenerator;
use underwriting_core::collaborators::parser::{BankStatementParser, ParsedStatement, ParserError, SandboxParser};
use underwriting_core::collaborators::rules::DefaultRuleEvaluator;
use underwriting_core::tenant::Tenant;
use underwriting_core::webhook::WebhookEmitter;
use underwriting_core::worker::{Worker, WorkerConfig};
use underwriting_core::{CryptoVault, Db, GatewayConfig, InMemoryQueue, Metrics, Queue, VaultKey};
use underwriting_http_api::AppState;

pub struct Harness {
    pub state: Arc<AppState>,
    pub worker: Arc<Worker>,
}

/// Always fails — used to exercise the non-fatal parser-failure path.
pub struct FailingParser;

#[async_trait]
impl BankStatementParser for FailingParser {
    async fn parse(&self, _pdf_path: &Path) -> Result<ParsedStatement, ParserError> {
        Err(ParserError::Failed("simulated parser crash".into()))
    }
}

pub fn build_harness(pool: sqlx::PgPool) -> Harness {
    build_harness_with_parser(pool, Arc::new(SandboxParser))
}

pub fn build_harness_with_parser(
    pool: sqlx::PgPool,
    parser: Arc<dyn BankStatementParser>,
) -> Harness {
    let db = Db::from_pool(pool);
    let vault = CryptoVault::new(VaultKey::generate());
    let queue: Arc<dyn Queue> = Arc::new(InMemoryQueue::new());
    let metrics = Arc::new(Metrics::new());
    let webhook = WebhookEmitter::new(std::time::Duration::from_secs(5), 3, 0);

    let worker = Arc::new(Worker::new(
        db.clone(),
        vault.clone(),
        parser,
        Arc::new(SandboxCollateralValuator),
        Arc::new(SandboxMemoGenerator),
        Arc::new(DefaultRuleEvaluator),
        webhook,
        metrics.clone(),
        WorkerConfig {
            bank_statement_max_bytes: 20 * 1024 * 1024,
            pdf_download_timeout: std::time::Duration::from_secs(30),
        },
    ));

    let state = Arc::new(AppState {
        db,
        vault,
        queue,
        rate_limiter: underwriting_core::RateLimiter::new(),
        metrics,
        token_issuer: TokenIssuer::new("test-signing-key".into(), 3600),
        config: Arc::new(GatewayConfig::default()),
    });

    Harness { state, worker }
}

pub fn test_tenant(tenant_id: &str, rps: i32) -> Tenant {
    Tenant {
        tenant_id: tenant_id.to_string(),
        name: "Test Bank".into(),
        api_key_hash: Some(underwriting_core::tenant::sha256_hex("test-api-key")),
        oauth_client_id: Some("client-1".into()),
        oauth_client_secret_hash: Some(underwriting_core::tenant::sha256_hex("client-secret")),
        tenant_secret: "ts".into(),
        webhook_secret: "ws".into(),
        rate_limit_rps: rps,
    }
}

pub fn canonical_body(job_id: &str, callback_url: &str, tenant_id: &str) -> Vec<u8> {
    canonical_body_with_statement(job_id, callback_url, tenant_id, None)
}

pub fn canonical_body_with_statement(
    job_id: &str,
    callback_url: &str,
    tenant_id: &str,
    bank_statement_url: Option<&str>,
) -> Vec<u8> {
    let value = serde_json::json!({
        "job_id": job_id,
        "tenant_id": tenant_id,
        "applicant": {"citizen_id": "c1", "full_name": "Jane Doe", "phone": "+1-555-0100"},
        "loan": {"type": "auto", "amount": 15000.0, "term_months": 48},
        "consent_artifact": {
            "provider": "p", "reference": "r", "scopes": ["credit_check"],
            "issued_at": "2026-01-01T00:00:00Z", "expires_at": "2027-01-01T00:00:00Z", "hash": "h"
        },
        "third_party_data": {},
        "documents": {"bank_statement_url": bank_statement_url, "bank_statement_period": null},
        "collateral": {"declared_value": 12000.0},
        "callback_url": callback_url
    });
    serde_json::to_vec(&value).unwrap()
}

pub fn signature_header(secret: &str, body: &[u8]) -> String {
    sign_payload(secret, body)
}
