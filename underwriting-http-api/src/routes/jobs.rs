//! Job query and polling protocol.

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use underwriting_core::GatewayError;
use underwriting_core::auth::{SCOPE_UNDERWRITE_CREATE, SCOPE_UNDERWRITE_READ};
use underwriting_core::job::JobStatus;

use crate::AppState;
use crate::api_error::ApiError;
use crate::auth_middleware::AuthContext;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/jobs/{id}", get(get_job))
        .route("/v1/jobs/pull", post(pull_jobs))
        .route("/v1/jobs/complete", post(complete_job))
}

#[derive(Serialize)]
struct JobView {
    job_id: String,
    status: String,
    client_job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    decision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    risk_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    interest_rate_suggestion: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    memo_markdown: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    memo_pdf_url: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Serialize)]
struct JobQueryResponse {
    data: JobView,
}

/// `GET /v1/jobs/{id}` — cross-tenant access must look identical to
/// not-found, so the lookup is always tenant-scoped.
async fn get_job(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(job_id): Path<String>,
) -> Result<Json<JobQueryResponse>, ApiError> {
    if !ctx.has_scope(SCOPE_UNDERWRITE_READ) {
        return Err(
            GatewayError::AuthorizationFailure(vec![SCOPE_UNDERWRITE_READ.to_string()]).into(),
        );
    }

    let job = state
        .db
        .get_job_for_tenant(&ctx.tenant.tenant_id, &job_id)
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("job {job_id}")))?;

    let result = state.db.get_result(&job.job_id).await?;

    Ok(Json(JobQueryResponse {
        data: JobView {
            job_id: job.job_id,
            status: job.status,
            client_job_id: job.client_job_id,
            decision: result.as_ref().map(|r| r.decision.clone()),
            risk_score: result.as_ref().and_then(|r| r.risk_score),
            interest_rate_suggestion: result.as_ref().and_then(|r| r.interest_rate_suggestion),
            memo_markdown: result.as_ref().map(|r| r.memo_markdown.clone()),
            memo_pdf_url: result.as_ref().and_then(|r| r.memo_pdf_url.clone()),
            created_at: job.created_at,
            updated_at: job.updated_at,
        },
    }))
}

#[derive(Deserialize)]
struct PullRequest {
    max_jobs: i64,
}

#[derive(Serialize)]
struct PulledJob {
    job_id: String,
    payload_plain: serde_json::Value,
}

/// `POST /v1/jobs/pull` — atomic claim, serialized per tenant by the
/// underlying `FOR UPDATE SKIP LOCKED` select.
async fn pull_jobs(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<PullRequest>,
) -> Result<Json<Vec<PulledJob>>, ApiError> {
    if !ctx.has_scope(SCOPE_UNDERWRITE_READ) {
        return Err(
            GatewayError::AuthorizationFailure(vec![SCOPE_UNDERWRITE_READ.to_string()]).into(),
        );
    }
    if !(1..=5).contains(&req.max_jobs) {
        return Err(GatewayError::ValidationFailure("max_jobs must be in 1..=5".into()).into());
    }

    let jobs = state
        .db
        .pull_next_jobs(&ctx.tenant.tenant_id, req.max_jobs)
        .await?;

    let mut pulled = Vec::with_capacity(jobs.len());
    for job in jobs {
        let payload_row = state
            .db
            .get_payload(&job.job_id)
            .await?
            .ok_or_else(|| GatewayError::DownstreamFatal("payload missing".into()))?;
        let payload_plain = state
            .vault
            .decrypt(&payload_row.json_encrypted)
            .map_err(|e| GatewayError::CryptoError(e.to_string()))?;
        pulled.push(PulledJob {
            job_id: job.job_id,
            payload_plain,
        });
    }

    Ok(Json(pulled))
}

#[derive(Deserialize)]
struct CompleteRequest {
    job_id: String,
    status: String,
    #[serde(default)]
    decision: Option<String>,
    #[serde(default)]
    risk_score: Option<f64>,
    #[serde(default)]
    interest_rate_suggestion: Option<f64>,
    #[serde(default)]
    memo_markdown: Option<String>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct CompleteResponse {
    job_id: String,
    status: String,
}

/// `POST /v1/jobs/complete` — reuses the same persistence path the
/// Underwrite Worker uses on success; ownership is enforced inside `Db::complete_job`.
async fn complete_job(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<CompleteRequest>,
) -> Result<Json<CompleteResponse>, ApiError> {
    if !ctx.has_scope(SCOPE_UNDERWRITE_CREATE) {
        return Err(
            GatewayError::AuthorizationFailure(vec![SCOPE_UNDERWRITE_CREATE.to_string()]).into(),
        );
    }

    let status = JobStatus::parse(&req.status)
        .ok_or_else(|| GatewayError::ValidationFailure(format!("invalid status {}", req.status)))?;

    let sealed_tail = match &req.metadata {
        Some(value) => Some(
            state
                .vault
                .encrypt(value)
                .map_err(|e| GatewayError::CryptoError(e.to_string()))?,
        ),
        None => None,
    };

    let job = state
        .db
        .complete_job(
            &ctx.tenant.tenant_id,
            &req.job_id,
            status,
            req.decision.as_deref(),
            req.risk_score,
            req.interest_rate_suggestion,
            req.memo_markdown.as_deref(),
            sealed_tail.as_deref(),
        )
        .await?;

    Ok(Json(CompleteResponse {
        job_id: job.job_id,
        status: job.status,
    }))
}
