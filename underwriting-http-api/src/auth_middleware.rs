//! Credential resolution middleware. Grounded in the teacher's
//! `auth_middleware` (`trading-http-api/src/auth.rs`): a thin layer that
//! resolves a caller identity and stashes it on the request's extensions for
//! downstream handlers, rather than performing full authorization itself.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use underwriting_core::auth::api_key_default_scopes;
use underwriting_core::tenant::{Tenant, sha256_hex};

use crate::AppState;

/// Resolved caller identity, inserted into request extensions by
/// [`auth_middleware`]. Route handlers read this to enforce scopes
/// and to scope queries to the caller's own tenant.
#[derive(Clone)]
pub struct AuthContext {
    pub tenant: Tenant,
    pub scopes: Vec<String>,
}

impl AuthContext {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

const PUBLIC_PATHS: &[&str] = &["/healthz", "/readyz", "/metrics", "/oauth/token"];

pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let path = request.uri().path().to_string();
    if PUBLIC_PATHS.contains(&path.as_str()) {
        return Ok(next.run(request).await);
    }

    let api_key = request
        .headers()
        .get("X-Api-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let bearer = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);

    let context = if let Some(key) = api_key {
        resolve_api_key(&state, &key).await
    } else if let Some(token) = bearer {
        resolve_bearer(&state, &token).await
    } else {
        None
    };

    match context {
        Some(ctx) => {
            request.extensions_mut().insert(ctx);
            Ok(next.run(request).await)
        }
        None => Err(StatusCode::UNAUTHORIZED),
    }
}

async fn resolve_api_key(state: &AppState, key: &str) -> Option<AuthContext> {
    let hash = sha256_hex(key);
    let tenant = state.db.find_tenant_by_api_key_hash(&hash).await.ok()??;
    let scopes = api_key_default_scopes()
        .split(' ')
        .map(str::to_string)
        .collect();
    Some(AuthContext { tenant, scopes })
}

async fn resolve_bearer(state: &AppState, token: &str) -> Option<AuthContext> {
    let claims = state.token_issuer.verify(token).ok()?;
    let tenant = state.db.find_tenant_by_id(&claims.tenant_id).await.ok()??;
    let scopes = claims.scopes().into_iter().map(str::to_string).collect();
    Some(AuthContext { tenant, scopes })
}
