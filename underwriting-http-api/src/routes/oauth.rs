//! Token issuance. Public — the caller has no token yet.

use axum::{Json, Router, extract::State, routing::post};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use underwriting_core::GatewayError;
use underwriting_core::auth::api_key_default_scopes;
use underwriting_core::tenant::sha256_hex;

use crate::AppState;
use crate::api_error::ApiError;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/oauth/token", post(issue_token))
}

#[derive(Deserialize)]
struct TokenRequest {
    grant_type: String,
    client_id: String,
    client_secret: String,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Serialize)]
struct TokenResponse {
    access_token: String,
    token_type: &'static str,
    expires_in: i64,
    scope: String,
}

async fn issue_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    if req.grant_type != "client_credentials" {
        return Err(GatewayError::ValidationFailure(format!(
            "unsupported grant type: {}",
            req.grant_type
        ))
        .into());
    }

    let secret_hash = sha256_hex(&req.client_secret);
    let tenant = state
        .db
        .find_tenant_by_oauth_client(&req.client_id, &secret_hash)
        .await?
        .ok_or_else(|| GatewayError::AuthenticationFailure("unknown client credentials".into()))?;

    let scope = req.scope.unwrap_or_else(api_key_default_scopes);
    let (access_token, expires_in) = state
        .token_issuer
        .issue(&tenant.tenant_id, &scope)
        .map_err(|e| GatewayError::AuthenticationFailure(e.to_string()))?;

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer",
        expires_in,
        scope,
    }))
}
