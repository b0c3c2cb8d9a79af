//! Underwrite Worker: orchestrates the fixed parse → enrich → fuse →
//! decide pipeline, persists the result, and emits the signed webhook.
//! Grounded in the teacher's `TradeExecutor::execute_validated_trade`
//! orchestration shape (`trading-runtime/src/executor.rs`).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;

use crate::collaborators::{BankStatementParser, CollateralValuator, MemoGenerator, RuleEvaluator};
use crate::crypto::CryptoVault;
use crate::db::Db;
use crate::job::CanonicalPayload;
use crate::metrics::Metrics;
use crate::tenant::Tenant;
use crate::webhook::{WebhookEmitter, WebhookPayload};

pub struct WorkerConfig {
    pub bank_statement_max_bytes: u64,
    pub pdf_download_timeout: Duration,
}

pub struct Worker {
    db: Db,
    vault: CryptoVault,
    parser: Arc<dyn BankStatementParser>,
    collateral: Arc<dyn CollateralValuator>,
    llm: Arc<dyn MemoGenerator>,
    rules: Arc<dyn RuleEvaluator>,
    webhook: WebhookEmitter,
    metrics: Arc<Metrics>,
    http_client: reqwest::Client,
    config: WorkerConfig,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Db,
        vault: CryptoVault,
        parser: Arc<dyn BankStatementParser>,
        collateral: Arc<dyn CollateralValuator>,
        llm: Arc<dyn MemoGenerator>,
        rules: Arc<dyn RuleEvaluator>,
        webhook: WebhookEmitter,
        metrics: Arc<Metrics>,
        config: WorkerConfig,
    ) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.pdf_download_timeout)
            .build()
            .expect("reqwest client builds with a bounded timeout");
        Self {
            db,
            vault,
            parser,
            collateral,
            llm,
            rules,
            webhook,
            metrics,
            http_client,
            config,
        }
    }

    /// Drives a single job id to a terminal state (or no-ops if the job is
    /// already terminal — redelivery safety).
    #[tracing::instrument(skip(self), fields(job_id = %job_id))]
    pub async fn process(&self, job_id: &str) {
        let Ok(Some(job)) = self.db.reserve_job_for_processing(job_id).await else {
            tracing::info!("job already terminal or missing, skipping redelivery");
            return;
        };

        let tenant = match self.db.find_tenant_by_id(&job.tenant_id).await {
            Ok(Some(tenant)) => tenant,
            _ => {
                self.fail(job_id, &job.tenant_id, "tenant not found").await;
                return;
            }
        };

        if let Err(reason) = self.run_pipeline(&job.job_id, &tenant).await {
            self.fail(job_id, &job.tenant_id, &reason).await;
        }
    }

    async fn fail(&self, job_id: &str, tenant_id: &str, reason: &str) {
        tracing::warn!(reason, "job failed");
        let _ = self.db.mark_failed(job_id, reason).await;
        self.metrics
            .jobs_failed_total
            .with_label_values(&[tenant_id])
            .inc();
    }

    async fn run_pipeline(&self, job_id: &str, tenant: &Tenant) -> Result<(), String> {
        // Step 1: load payload.
        let payload_row = self
            .db
            .get_payload(job_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or("payload missing")?;
        let payload_json = self
            .vault
            .decrypt(&payload_row.json_encrypted)
            .map_err(|_| "payload undecryptable".to_string())?;
        let payload: CanonicalPayload =
            serde_json::from_value(payload_json.clone()).map_err(|e| e.to_string())?;

        // Step 2: bank statement acquisition (non-fatal).
        let parser_timer = Instant::now();
        let parsed_statement = self.acquire_and_parse_statement(&payload).await;
        let parser_elapsed = parser_timer.elapsed().as_secs_f64();
        self.metrics
            .underwrite_duration_seconds
            .with_label_values(&[&tenant.tenant_id, "parser"])
            .observe(parser_elapsed);
        self.metrics
            .parser_seconds
            .with_label_values(&[&tenant.tenant_id])
            .observe(parser_elapsed);

        // Step 3: collateral enrichment (non-fatal).
        let collateral_timer = Instant::now();
        let collateral = self.collateral.valuate(&payload).await.ok();
        let collateral_elapsed = collateral_timer.elapsed().as_secs_f64();
        self.metrics
            .underwrite_duration_seconds
            .with_label_values(&[&tenant.tenant_id, "collateral"])
            .observe(collateral_elapsed);
        self.metrics
            .collateral_seconds
            .with_label_values(&[&tenant.tenant_id])
            .observe(collateral_elapsed);

        // Step 4: feature fusion.
        let features = json!({
            "payload": payload_json,
            "parser": parsed_statement,
            "collateral": collateral,
        });
        let sealed_features = self.vault.encrypt(&features).map_err(|e| e.to_string())?;
        self.db
            .persist_features(job_id, &sealed_features)
            .await
            .map_err(|e| e.to_string())?;

        // Step 5: decision.
        let llm_timer = Instant::now();
        let (memo_markdown, meta) = self
            .llm
            .generate(&features)
            .await
            .unwrap_or_else(|_| (String::new(), Default::default()));
        let llm_elapsed = llm_timer.elapsed().as_secs_f64();
        self.metrics
            .underwrite_duration_seconds
            .with_label_values(&[&tenant.tenant_id, "llm"])
            .observe(llm_elapsed);
        self.metrics
            .llm_seconds
            .with_label_values(&[&tenant.tenant_id])
            .observe(llm_elapsed);

        let (decision, reasons) = match &meta.decision {
            Some(decision) => (decision.clone(), Vec::new()),
            None => {
                let fallback = self.rules.evaluate(&features);
                (fallback.decision, fallback.reasons)
            }
        };

        let json_tail = json!({
            "rule_fallback_reasons": reasons,
            "raw_response": meta.raw_response,
        });
        let sealed_tail = self.vault.encrypt(&json_tail).map_err(|e| e.to_string())?;

        // Step 6: persist result.
        self.db
            .persist_result_and_succeed(
                job_id,
                &memo_markdown,
                None,
                meta.risk_score,
                &decision,
                meta.interest_rate_suggestion,
                &sealed_tail,
                "underwrite_worker",
            )
            .await
            .map_err(|e| e.to_string())?;

        // Step 7: webhook emission (not fatal to job completion).
        let job = self
            .db
            .get_job(job_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or("job disappeared after completion")?;

        let webhook_payload = WebhookPayload {
            event: "memo.generated",
            job_id: job.job_id.clone(),
            client_job_id: job.client_job_id.clone(),
            decision,
            interest_rate_suggestion: meta.interest_rate_suggestion,
            risk_score: meta.risk_score,
            llm_input: features,
            credit_memo_markdown: memo_markdown,
            attachments: Vec::new(),
            audit_ref: job.job_id.clone(),
            timestamp: chrono::Utc::now(),
        };

        match self
            .webhook
            .emit(&job.callback_url, &webhook_payload, &tenant.webhook_secret)
            .await
        {
            Ok(attempts) => {
                self.metrics
                    .webhook_attempts_total
                    .with_label_values(&[&tenant.tenant_id, "ok"])
                    .inc_by(attempts as u64);
            }
            Err(crate::webhook::WebhookError::Exhausted { attempts, .. }) => {
                self.metrics
                    .webhook_attempts_total
                    .with_label_values(&[&tenant.tenant_id, "error"])
                    .inc_by(attempts as u64);
                self.metrics
                    .webhook_failures_total
                    .with_label_values(&[&tenant.tenant_id])
                    .inc();
                tracing::warn!(job_id, "webhook delivery exhausted retries");
            }
        }

        Ok(())
    }

    async fn acquire_and_parse_statement(
        &self,
        payload: &CanonicalPayload,
    ) -> crate::collaborators::ParsedStatement {
        let Some(url) = payload.documents.bank_statement_url.clone() else {
            return Default::default();
        };

        match self.download_to_scratch(&url).await {
            Ok(scratch_path) => {
                let parsed = self
                    .parser
                    .parse(&scratch_path)
                    .await
                    .unwrap_or_default();
                let _ = std::fs::remove_file(&scratch_path); // step 8: cleanup
                parsed
            }
            Err(e) => {
                tracing::warn!(error = %e, "bank statement download failed, continuing with empty data");
                Default::default()
            }
        }
    }

    async fn download_to_scratch(&self, url: &str) -> Result<PathBuf, String> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if let Some(len) = response.content_length() {
            if len > self.config.bank_statement_max_bytes {
                return Err("bank statement exceeds size cap".into());
            }
        }

        let bytes = response.bytes().await.map_err(|e| e.to_string())?;
        if bytes.len() as u64 > self.config.bank_statement_max_bytes {
            return Err("bank statement exceeds size cap".into());
        }

        let path = std::env::temp_dir().join(format!("uw-{}.pdf", uuid::Uuid::new_v4()));
        std::fs::write(&path, &bytes).map_err(|e| e.to_string())?;
        Ok(path)
    }
}
