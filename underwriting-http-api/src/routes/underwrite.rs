//! Ingress Handler. Preconditions enforced in order: identity (by the
//! auth middleware), HMAC signature, rate limit, then body parsing.

use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};
use serde::Serialize;
use std::sync::Arc;

use underwriting_core::GatewayError;
use underwriting_core::auth::{SCOPE_UNDERWRITE_CREATE, verify_signature};
use underwriting_core::job::{CanonicalPayload, prefixed_id};
use underwriting_core::tenant::sha256_hex_bytes;

use crate::AppState;
use crate::api_error::ApiError;
use crate::auth_middleware::AuthContext;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/v1/underwrite", post(underwrite))
}

#[derive(Serialize)]
struct AdmissionResponse {
    job_id: String,
    status: String,
}

async fn underwrite(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    if !ctx.has_scope(SCOPE_UNDERWRITE_CREATE) {
        return Err(
            GatewayError::AuthorizationFailure(vec![SCOPE_UNDERWRITE_CREATE.to_string()]).into(),
        );
    }

    let presented_signature = headers
        .get("X-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| GatewayError::AuthenticationFailure("missing X-Signature".into()))?;
    if !verify_signature(&ctx.tenant.tenant_secret, &body, presented_signature) {
        return Err(GatewayError::AuthenticationFailure("signature mismatch".into()).into());
    }

    if !state
        .rate_limiter
        .allow(&ctx.tenant.tenant_id, ctx.tenant.rate_limit_rps)
    {
        return Err(GatewayError::RateLimited {
            tenant_id: ctx.tenant.tenant_id.clone(),
        }
        .into());
    }

    let payload: CanonicalPayload = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::ValidationFailure(format!("malformed payload: {e}")))?;
    if payload.tenant_id != ctx.tenant.tenant_id {
        return Err(GatewayError::ValidationFailure(
            "tenant_id does not match authenticated tenant".into(),
        )
        .into());
    }

    let request_hash = sha256_hex_bytes(&body);
    let idempotency_key = headers
        .get("X-Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(sha256_hex_bytes_from_str);

    if let Some(key) = &idempotency_key {
        if let Some(existing) = state
            .db
            .find_job_by_idempotency(&ctx.tenant.tenant_id, key)
            .await?
        {
            return Ok((
                StatusCode::ACCEPTED,
                Json(AdmissionResponse {
                    job_id: existing.job_id,
                    status: existing.status,
                }),
            ));
        }
    } else if let Some(existing) = state
        .db
        .find_job_by_request_hash(&ctx.tenant.tenant_id, &request_hash)
        .await?
    {
        return Ok((
            StatusCode::ACCEPTED,
            Json(AdmissionResponse {
                job_id: existing.job_id,
                status: existing.status,
            }),
        ));
    }

    let job_id = prefixed_id("uwo_");
    let payload_value = serde_json::to_value(&payload).map_err(GatewayError::from)?;
    let sealed = state.vault.encrypt(&payload_value).map_err(|e| {
        GatewayError::CryptoError(e.to_string())
    })?;

    let job = state
        .db
        .admit_job(
            &job_id,
            &ctx.tenant.tenant_id,
            &payload.job_id,
            &payload.callback_url,
            &request_hash,
            idempotency_key.as_deref(),
            &sealed,
        )
        .await?;

    state
        .metrics
        .jobs_created_total
        .with_label_values(&[&ctx.tenant.tenant_id])
        .inc();
    state.queue.submit(job.job_id.clone()).await;
    state.metrics.queue_backlog.set(state.queue.backlog() as i64);

    Ok((
        StatusCode::ACCEPTED,
        Json(AdmissionResponse {
            job_id: job.job_id,
            status: job.status,
        }),
    ))
}

fn sha256_hex_bytes_from_str(s: &str) -> String {
    sha256_hex_bytes(s.as_bytes())
}
