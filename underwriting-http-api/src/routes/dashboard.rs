//! Dashboard Views. Tenant-scoped routes require `dashboard:read`;
//! admin routes require `dashboard:admin`. The redaction rule is enforced structurally: `JobDetail::llm_input` only exists on the
//! type the admin handlers construct.

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use underwriting_core::GatewayError;
use underwriting_core::auth::{SCOPE_DASHBOARD_ADMIN, SCOPE_DASHBOARD_READ};
use underwriting_core::job::Job;

use crate::AppState;
use crate::api_error::ApiError;
use crate::auth_middleware::AuthContext;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/dashboard/tenant/jobs", get(tenant_jobs))
        .route("/v1/dashboard/tenant/jobs/{id}", get(tenant_job_detail))
        .route("/v1/dashboard/tenant/summary", get(tenant_summary))
        .route("/v1/dashboard/admin/tenants", get(admin_tenants))
        .route("/v1/dashboard/admin/jobs", get(admin_jobs))
        .route("/v1/dashboard/admin/jobs/{id}", get(admin_job_detail))
}

#[derive(Deserialize)]
struct JobListQuery {
    status: Option<String>,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    20
}

#[derive(Serialize)]
struct JobSummary {
    job_id: String,
    tenant_id: String,
    client_job_id: String,
    status: String,
    decision: Option<String>,
    risk_score: Option<f64>,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
    processing_seconds: f64,
}

#[derive(Serialize)]
struct RollUp {
    total: i64,
    succeeded: i64,
    failed: i64,
    average_processing_seconds: f64,
}

#[derive(Serialize)]
struct JobListResponse {
    jobs: Vec<JobSummary>,
    rollup: RollUp,
}

fn require_scope(ctx: &AuthContext, scope: &str) -> Result<(), ApiError> {
    if ctx.has_scope(scope) {
        Ok(())
    } else {
        Err(GatewayError::AuthorizationFailure(vec![scope.to_string()]).into())
    }
}

async fn summarize(
    state: &AppState,
    jobs: Vec<Job>,
) -> Result<JobListResponse, ApiError> {
    let mut summaries = Vec::with_capacity(jobs.len());
    let (mut succeeded, mut failed) = (0i64, 0i64);
    let mut total_processing_seconds = 0.0;
    let mut terminal_count = 0i64;

    for job in jobs {
        let result = state.db.get_result(&job.job_id).await?;
        let processing_seconds = (job.updated_at - job.created_at).num_milliseconds() as f64 / 1000.0;
        match job.status.as_str() {
            "succeeded" => {
                succeeded += 1;
                terminal_count += 1;
                total_processing_seconds += processing_seconds;
            }
            "failed" => {
                failed += 1;
                terminal_count += 1;
                total_processing_seconds += processing_seconds;
            }
            _ => {}
        }
        summaries.push(JobSummary {
            job_id: job.job_id,
            tenant_id: job.tenant_id,
            client_job_id: job.client_job_id,
            status: job.status,
            decision: result.as_ref().map(|r| r.decision.clone()),
            risk_score: result.as_ref().and_then(|r| r.risk_score),
            created_at: job.created_at,
            updated_at: job.updated_at,
            processing_seconds,
        });
    }

    let average_processing_seconds = if terminal_count > 0 {
        total_processing_seconds / terminal_count as f64
    } else {
        0.0
    };

    Ok(JobListResponse {
        rollup: RollUp {
            total: summaries.len() as i64,
            succeeded,
            failed,
            average_processing_seconds,
        },
        jobs: summaries,
    })
}

async fn tenant_jobs(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<JobListQuery>,
) -> Result<Json<JobListResponse>, ApiError> {
    require_scope(&ctx, SCOPE_DASHBOARD_READ)?;
    let limit = query.limit.clamp(1, 200);
    let jobs = state
        .db
        .list_jobs_for_tenant(&ctx.tenant.tenant_id, query.status.as_deref(), limit)
        .await?;
    Ok(Json(summarize(&state, jobs).await?))
}

#[derive(Serialize)]
struct JobDetail {
    job_id: String,
    status: String,
    raw_input: serde_json::Value,
    llm_output: Option<LlmOutput>,
    audits: Vec<AuditEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    llm_input: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct LlmOutput {
    memo_markdown: String,
    decision: String,
    risk_score: Option<f64>,
    interest_rate_suggestion: Option<f64>,
}

#[derive(Serialize)]
struct AuditEntry {
    actor: String,
    action: String,
    hash: Option<String>,
    created_at: chrono::DateTime<Utc>,
}

async fn job_detail(
    state: &AppState,
    job: Job,
    include_features: bool,
) -> Result<JobDetail, ApiError> {
    let payload = state
        .db
        .get_payload(&job.job_id)
        .await?
        .ok_or_else(|| GatewayError::DownstreamFatal("payload missing".into()))?;
    let raw_input = state
        .vault
        .decrypt(&payload.json_encrypted)
        .map_err(|e| GatewayError::CryptoError(e.to_string()))?;

    let result = state.db.get_result(&job.job_id).await?;
    let llm_output = result.as_ref().map(|r| LlmOutput {
        memo_markdown: r.memo_markdown.clone(),
        decision: r.decision.clone(),
        risk_score: r.risk_score,
        interest_rate_suggestion: r.interest_rate_suggestion,
    });

    let audits = state
        .db
        .list_audits(&job.job_id)
        .await?
        .into_iter()
        .map(|a| AuditEntry {
            actor: a.actor,
            action: a.action,
            hash: a.hash,
            created_at: a.created_at,
        })
        .collect();

    let llm_input = if include_features {
        state
            .db
            .get_features(&job.job_id)
            .await?
            .map(|sealed| state.vault.decrypt(&sealed))
            .transpose()
            .map_err(|e| GatewayError::CryptoError(e.to_string()))?
    } else {
        None
    };

    Ok(JobDetail {
        job_id: job.job_id,
        status: job.status,
        raw_input,
        llm_output,
        audits,
        llm_input,
    })
}

async fn tenant_job_detail(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(job_id): Path<String>,
) -> Result<Json<JobDetail>, ApiError> {
    require_scope(&ctx, SCOPE_DASHBOARD_READ)?;
    let job = state
        .db
        .get_job_for_tenant(&ctx.tenant.tenant_id, &job_id)
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("job {job_id}")))?;
    Ok(Json(job_detail(&state, job, false).await?))
}

#[derive(Deserialize)]
struct SummaryQuery {
    #[serde(default = "default_lookback_hours")]
    lookback_hours: i64,
}

fn default_lookback_hours() -> i64 {
    24
}

#[derive(Serialize)]
struct TenantSummaryResponse {
    tenant_id: String,
    lookback_hours: i64,
    total_jobs: i64,
    failed_jobs: i64,
    failure_rate: f64,
    average_processing_seconds: f64,
}

async fn tenant_summary(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<TenantSummaryResponse>, ApiError> {
    require_scope(&ctx, SCOPE_DASHBOARD_READ)?;
    let since = Utc::now() - Duration::hours(query.lookback_hours);
    let (total, failed, average_processing_seconds) = state
        .db
        .tenant_counts_since(&ctx.tenant.tenant_id, since)
        .await?;
    let failure_rate = if total > 0 {
        (failed as f64 / total as f64) * 100.0
    } else {
        0.0
    };
    Ok(Json(TenantSummaryResponse {
        tenant_id: ctx.tenant.tenant_id.clone(),
        lookback_hours: query.lookback_hours,
        total_jobs: total,
        failed_jobs: failed,
        failure_rate: (failure_rate * 100.0).round() / 100.0,
        average_processing_seconds: (average_processing_seconds * 100.0).round() / 100.0,
    }))
}

#[derive(Serialize)]
struct AdminTenantRow {
    tenant_id: String,
    name: String,
    total_jobs_24h: i64,
    failure_rate_24h: f64,
    average_processing_seconds_24h: f64,
}

async fn admin_tenants(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Vec<AdminTenantRow>>, ApiError> {
    require_scope(&ctx, SCOPE_DASHBOARD_ADMIN)?;
    let since = Utc::now() - Duration::hours(24);
    let tenants = state.db.list_tenants().await?;

    let mut rows = Vec::with_capacity(tenants.len());
    for tenant in tenants {
        let (total, failed, average_processing_seconds) =
            state.db.tenant_counts_since(&tenant.tenant_id, since).await?;
        let failure_rate = if total > 0 {
            ((failed as f64 / total as f64) * 100.0 * 100.0).round() / 100.0
        } else {
            0.0
        };
        rows.push(AdminTenantRow {
            tenant_id: tenant.tenant_id,
            name: tenant.name,
            total_jobs_24h: total,
            failure_rate_24h: failure_rate,
            average_processing_seconds_24h: (average_processing_seconds * 100.0).round() / 100.0,
        });
    }
    Ok(Json(rows))
}

async fn admin_jobs(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<JobListQuery>,
) -> Result<Json<JobListResponse>, ApiError> {
    require_scope(&ctx, SCOPE_DASHBOARD_ADMIN)?;
    let limit = query.limit.clamp(1, 200);
    let jobs = state
        .db
        .list_jobs_all_tenants(query.status.as_deref(), limit)
        .await?;
    Ok(Json(summarize(&state, jobs).await?))
}

async fn admin_job_detail(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(job_id): Path<String>,
) -> Result<Json<JobDetail>, ApiError> {
    require_scope(&ctx, SCOPE_DASHBOARD_ADMIN)?;
    let job = state
        .db
        .get_job(&job_id)
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("job {job_id}")))?;
    Ok(Json(job_detail(&state, job, true).await?))
}
