//! Job Store persistence. Postgres via `sqlx`, runtime-checked
//! queries (no `query!` macro — keeps the crate buildable without a live
//! database at compile time, matching the style in `hyli-org-hyliquid`'s
//! `database.rs`/`asset_service.rs`).

use chrono::Utc;
use sqlx::{Row, postgres::PgPoolOptions};

use crate::error::GatewayError;
use crate::job::{Audit, Job, JobStatus, Payload};
use crate::tenant::Tenant;

#[derive(Clone)]
pub struct Db {
    pool: sqlx::PgPool,
}

impl Db {
    pub async fn connect(database_url: &str) -> Result<Self, GatewayError> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Wraps an already-migrated pool — used by `#[sqlx::test]` fixtures,
    /// which provision and migrate a scratch database themselves.
    pub fn from_pool(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), GatewayError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| GatewayError::Database(e.to_string()))
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }

    // ---- Tenant Store -------------------------------------------------

    pub async fn upsert_tenant(&self, tenant: &Tenant) -> Result<(), GatewayError> {
        sqlx::query(
            "INSERT INTO tenants
                (tenant_id, name, api_key_hash, oauth_client_id, oauth_client_secret_hash, tenant_secret, webhook_secret, rate_limit_rps)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (tenant_id) DO UPDATE SET
                name = EXCLUDED.name,
                api_key_hash = EXCLUDED.api_key_hash,
                oauth_client_id = EXCLUDED.oauth_client_id,
                oauth_client_secret_hash = EXCLUDED.oauth_client_secret_hash,
                tenant_secret = EXCLUDED.tenant_secret,
                webhook_secret = EXCLUDED.webhook_secret,
                rate_limit_rps = EXCLUDED.rate_limit_rps",
        )
        .bind(&tenant.tenant_id)
        .bind(&tenant.name)
        .bind(&tenant.api_key_hash)
        .bind(&tenant.oauth_client_id)
        .bind(&tenant.oauth_client_secret_hash)
        .bind(&tenant.tenant_secret)
        .bind(&tenant.webhook_secret)
        .bind(tenant.rate_limit_rps)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_tenant_by_api_key_hash(
        &self,
        hash: &str,
    ) -> Result<Option<Tenant>, GatewayError> {
        let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE api_key_hash = $1")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tenant)
    }

    pub async fn find_tenant_by_oauth_client(
        &self,
        client_id: &str,
        secret_hash: &str,
    ) -> Result<Option<Tenant>, GatewayError> {
        let tenant = sqlx::query_as::<_, Tenant>(
            "SELECT * FROM tenants WHERE oauth_client_id = $1 AND oauth_client_secret_hash = $2",
        )
        .bind(client_id)
        .bind(secret_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(tenant)
    }

    pub async fn find_tenant_by_id(&self, tenant_id: &str) -> Result<Option<Tenant>, GatewayError> {
        let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tenant)
    }

    pub async fn list_tenants(&self) -> Result<Vec<Tenant>, GatewayError> {
        let tenants = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants ORDER BY tenant_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(tenants)
    }

    // ---- Ingress Handler admission ------------------------------------

    pub async fn find_job_by_idempotency(
        &self,
        tenant_id: &str,
        idempotency_hash: &str,
    ) -> Result<Option<Job>, GatewayError> {
        let job = sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs WHERE tenant_id = $1 AND idempotency_key = $2",
        )
        .bind(tenant_id)
        .bind(idempotency_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    pub async fn find_job_by_request_hash(
        &self,
        tenant_id: &str,
        request_hash: &str,
    ) -> Result<Option<Job>, GatewayError> {
        let job = sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs WHERE tenant_id = $1 AND request_hash = $2",
        )
        .bind(tenant_id)
        .bind(request_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    /// Creates Job (status=queued) + Payload (encrypted) + Audit in a single
    /// transaction.
    pub async fn admit_job(
        &self,
        job_id: &str,
        tenant_id: &str,
        client_job_id: &str,
        callback_url: &str,
        request_hash: &str,
        idempotency_key: Option<&str>,
        payload_sealed: &[u8],
    ) -> Result<Job, GatewayError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO jobs
                (job_id, tenant_id, client_job_id, status, idempotency_key, callback_url, request_hash, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)",
        )
        .bind(job_id)
        .bind(tenant_id)
        .bind(client_job_id)
        .bind(JobStatus::Queued.as_str())
        .bind(idempotency_key)
        .bind(callback_url)
        .bind(request_hash)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO payloads (job_id, json_encrypted) VALUES ($1, $2)")
            .bind(job_id)
            .bind(payload_sealed)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO audits (job_id, actor, action, hash, created_at) VALUES ($1, 'api', 'job_queued', $2, $3)",
        )
        .bind(job_id)
        .bind(request_hash)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Job {
            job_id: job_id.to_string(),
            tenant_id: tenant_id.to_string(),
            client_job_id: client_job_id.to_string(),
            status: JobStatus::Queued.as_str().to_string(),
            idempotency_key: idempotency_key.map(str::to_string),
            callback_url: callback_url.to_string(),
            request_hash: request_hash.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    // ---- Job Query / dashboard lookups ---------------------------------------

    pub async fn get_job(&self, job_id: &str) -> Result<Option<Job>, GatewayError> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    /// Cross-tenant access must look like "not found".
    pub async fn get_job_for_tenant(
        &self,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<Option<Job>, GatewayError> {
        let job = sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs WHERE job_id = $1 AND tenant_id = $2",
        )
        .bind(job_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    pub async fn get_payload(&self, job_id: &str) -> Result<Option<Payload>, GatewayError> {
        let payload = sqlx::query_as::<_, Payload>("SELECT * FROM payloads WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(payload)
    }

    pub async fn get_features(&self, job_id: &str) -> Result<Option<Vec<u8>>, GatewayError> {
        let row = sqlx::query("SELECT json_encrypted FROM features WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<Vec<u8>, _>("json_encrypted")))
    }

    pub async fn persist_features(
        &self,
        job_id: &str,
        sealed: &[u8],
    ) -> Result<(), GatewayError> {
        sqlx::query(
            "INSERT INTO features (job_id, json_encrypted) VALUES ($1, $2)
             ON CONFLICT (job_id) DO UPDATE SET json_encrypted = EXCLUDED.json_encrypted",
        )
        .bind(job_id)
        .bind(sealed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Picks up a job for processing, enforcing the worker's state machine
    ///: re-entry from any non-terminal state is legal; entering when
    /// already terminal is a no-op (returns `None`).
    pub async fn reserve_job_for_processing(
        &self,
        job_id: &str,
    ) -> Result<Option<Job>, GatewayError> {
        let mut tx = self.pool.begin().await?;
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE job_id = $1 FOR UPDATE")
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(job) = job else {
            tx.commit().await?;
            return Ok(None);
        };

        if job.status().is_terminal() {
            tx.commit().await?;
            return Ok(None);
        }

        let now = Utc::now();
        sqlx::query("UPDATE jobs SET status = $1, updated_at = $2 WHERE job_id = $3")
            .bind(JobStatus::Processing.as_str())
            .bind(now)
            .bind(job_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Some(Job {
            status: JobStatus::Processing.as_str().to_string(),
            updated_at: now,
            ..job
        }))
    }

    /// Atomically claims up to `max_jobs` oldest queued jobs for `tenant_id`
    /// and transitions them to `processing`.
    pub async fn pull_next_jobs(
        &self,
        tenant_id: &str,
        max_jobs: i64,
    ) -> Result<Vec<Job>, GatewayError> {
        let mut tx = self.pool.begin().await?;

        let jobs = sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs
             WHERE tenant_id = $1 AND status = 'queued'
             ORDER BY created_at ASC
             LIMIT $2
             FOR UPDATE SKIP LOCKED",
        )
        .bind(tenant_id)
        .bind(max_jobs)
        .fetch_all(&mut *tx)
        .await?;

        let now = Utc::now();
        let mut claimed = Vec::with_capacity(jobs.len());
        for job in jobs {
            sqlx::query("UPDATE jobs SET status = $1, updated_at = $2 WHERE job_id = $3")
                .bind(JobStatus::Processing.as_str())
                .bind(now)
                .bind(&job.job_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "INSERT INTO audits (job_id, actor, action, created_at) VALUES ($1, 'polling_worker', 'job_pulled', $2)",
            )
            .bind(&job.job_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            claimed.push(Job {
                status: JobStatus::Processing.as_str().to_string(),
                updated_at: now,
                ..job
            });
        }

        tx.commit().await?;
        Ok(claimed)
    }

    /// Persists Result, sets status=succeeded, appends the completion audit
    /// in a single transaction.
    pub async fn persist_result_and_succeed(
        &self,
        job_id: &str,
        memo_markdown: &str,
        memo_pdf_url: Option<&str>,
        risk_score: Option<f64>,
        decision: &str,
        interest_rate_suggestion: Option<f64>,
        json_tail_encrypted: &[u8],
        actor: &str,
    ) -> Result<(), GatewayError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO results
                (job_id, memo_markdown, memo_pdf_url, risk_score, decision, interest_rate_suggestion, json_tail_encrypted)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (job_id) DO UPDATE SET
                memo_markdown = EXCLUDED.memo_markdown,
                memo_pdf_url = EXCLUDED.memo_pdf_url,
                risk_score = EXCLUDED.risk_score,
                decision = EXCLUDED.decision,
                interest_rate_suggestion = EXCLUDED.interest_rate_suggestion,
                json_tail_encrypted = EXCLUDED.json_tail_encrypted",
        )
        .bind(job_id)
        .bind(memo_markdown)
        .bind(memo_pdf_url)
        .bind(risk_score)
        .bind(decision)
        .bind(interest_rate_suggestion)
        .bind(json_tail_encrypted)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE jobs SET status = $1, updated_at = $2 WHERE job_id = $3")
            .bind(JobStatus::Succeeded.as_str())
            .bind(now)
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO audits (job_id, actor, action, created_at) VALUES ($1, $2, 'job_completed', $3)",
        )
        .bind(job_id)
        .bind(actor)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Marks a job `failed` and appends the audit row.
    pub async fn mark_failed(&self, job_id: &str, reason: &str) -> Result<(), GatewayError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        sqlx::query("UPDATE jobs SET status = $1, updated_at = $2 WHERE job_id = $3")
            .bind(JobStatus::Failed.as_str())
            .bind(now)
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO audits (job_id, actor, action, hash, created_at) VALUES ($1, 'underwrite_worker', 'job_failed', $2, $3)",
        )
        .bind(job_id)
        .bind(reason)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn append_audit(
        &self,
        job_id: &str,
        actor: &str,
        action: &str,
        hash: Option<&str>,
    ) -> Result<(), GatewayError> {
        sqlx::query(
            "INSERT INTO audits (job_id, actor, action, hash, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(job_id)
        .bind(actor)
        .bind(action)
        .bind(hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_audits(&self, job_id: &str) -> Result<Vec<Audit>, GatewayError> {
        let audits = sqlx::query_as::<_, Audit>(
            "SELECT * FROM audits WHERE job_id = $1 ORDER BY created_at ASC",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(audits)
    }

    pub async fn get_result(
        &self,
        job_id: &str,
    ) -> Result<Option<crate::job::ResultRecord>, GatewayError> {
        let result = sqlx::query_as::<_, crate::job::ResultRecord>(
            "SELECT * FROM results WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(result)
    }

    // ---- Polling completion -------------------------------------------

    /// Only the owning tenant may complete a job; always updates status,
    /// persists Result on `succeeded`, appends the completion audit.
    pub async fn complete_job(
        &self,
        tenant_id: &str,
        job_id: &str,
        status: JobStatus,
        decision: Option<&str>,
        risk_score: Option<f64>,
        interest_rate_suggestion: Option<f64>,
        memo_markdown: Option<&str>,
        json_tail_encrypted: Option<&[u8]>,
    ) -> Result<Job, GatewayError> {
        let job = self
            .get_job_for_tenant(tenant_id, job_id)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("job {job_id}")))?;

        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        if status == JobStatus::Succeeded {
            sqlx::query(
                "INSERT INTO results
                    (job_id, memo_markdown, memo_pdf_url, risk_score, decision, interest_rate_suggestion, json_tail_encrypted)
                 VALUES ($1, $2, NULL, $3, $4, $5, $6)
                 ON CONFLICT (job_id) DO UPDATE SET
                    memo_markdown = EXCLUDED.memo_markdown,
                    risk_score = EXCLUDED.risk_score,
                    decision = EXCLUDED.decision,
                    interest_rate_suggestion = EXCLUDED.interest_rate_suggestion,
                    json_tail_encrypted = EXCLUDED.json_tail_encrypted",
            )
            .bind(job_id)
            .bind(memo_markdown.unwrap_or_default())
            .bind(risk_score)
            .bind(decision.unwrap_or("REVIEW"))
            .bind(interest_rate_suggestion)
            .bind(json_tail_encrypted.unwrap_or(&[]))
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE jobs SET status = $1, updated_at = $2 WHERE job_id = $3")
            .bind(status.as_str())
            .bind(now)
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO audits (job_id, actor, action, created_at) VALUES ($1, 'polling_worker', 'job_complete', $2)",
        )
        .bind(job_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Job {
            status: status.as_str().to_string(),
            updated_at: now,
            ..job
        })
    }

    // ---- Dashboard Views ----------------------------------------------

    pub async fn list_jobs_for_tenant(
        &self,
        tenant_id: &str,
        status_filter: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Job>, GatewayError> {
        let jobs = match status_filter {
            Some(status) => {
                sqlx::query_as::<_, Job>(
                    "SELECT * FROM jobs WHERE tenant_id = $1 AND status = $2
                     ORDER BY created_at DESC LIMIT $3",
                )
                .bind(tenant_id)
                .bind(status)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Job>(
                    "SELECT * FROM jobs WHERE tenant_id = $1 ORDER BY created_at DESC LIMIT $2",
                )
                .bind(tenant_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(jobs)
    }

    pub async fn list_jobs_all_tenants(
        &self,
        status_filter: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Job>, GatewayError> {
        let jobs = match status_filter {
            Some(status) => {
                sqlx::query_as::<_, Job>(
                    "SELECT * FROM jobs WHERE status = $1 ORDER BY created_at DESC LIMIT $2",
                )
                .bind(status)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Job>("SELECT * FROM jobs ORDER BY created_at DESC LIMIT $1")
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(jobs)
    }

    /// Counts + failure rate for the admin tenant roll-up, over the last 24h.
    pub async fn tenant_counts_since(
        &self,
        tenant_id: &str,
        since: chrono::DateTime<Utc>,
    ) -> Result<(i64, i64, f64), GatewayError> {
        let row = sqlx::query(
            "SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                COALESCE(AVG(EXTRACT(EPOCH FROM (updated_at - created_at)))
                    FILTER (WHERE status IN ('succeeded', 'failed')), 0.0) AS avg_processing_seconds
             FROM jobs WHERE tenant_id = $1 AND created_at >= $2",
        )
        .bind(tenant_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        let avg_processing_seconds: f64 = row.get("avg_processing_seconds");
        Ok((row.get("total"), row.get("failed"), avg_processing_seconds))
    }
}
