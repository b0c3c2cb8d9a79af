//! Maps `GatewayError` onto the HTTP status codes the API contract fixes
//! for each failure kind.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use underwriting_core::GatewayError;

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    missing_scopes: Option<Vec<String>>,
}

pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self.0 {
            GatewayError::AuthenticationFailure(detail) => (
                StatusCode::UNAUTHORIZED,
                ErrorBody { detail, missing_scopes: None },
            ),
            GatewayError::AuthorizationFailure(missing) => (
                StatusCode::FORBIDDEN,
                ErrorBody {
                    detail: "missing required scope".to_string(),
                    missing_scopes: Some(missing),
                },
            ),
            GatewayError::ValidationFailure(detail) => (
                StatusCode::BAD_REQUEST,
                ErrorBody { detail, missing_scopes: None },
            ),
            GatewayError::NotFound(detail) => (
                StatusCode::NOT_FOUND,
                ErrorBody { detail, missing_scopes: None },
            ),
            GatewayError::RateLimited { tenant_id } => (
                StatusCode::TOO_MANY_REQUESTS,
                ErrorBody {
                    detail: format!("rate limit exceeded for tenant {tenant_id}"),
                    missing_scopes: None,
                },
            ),
            GatewayError::DuplicateAdmission { .. } => (
                StatusCode::ACCEPTED,
                ErrorBody {
                    detail: "duplicate admission".to_string(),
                    missing_scopes: None,
                },
            ),
            other => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody { detail: other.to_string(), missing_scopes: None },
            ),
        };
        (status, Json(body)).into_response()
    }
}
