use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use leadscout_core::LeadScoutError;
use serde_json::json;
use tracing::error;

/// A JSON error body with a stable machine-readable code.
pub fn json_error(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(json!({"error": {"code": code, "message": message}})),
    )
        .into_response()
}

/// Makes [`LeadScoutError`] usable as a handler error.
///
/// Handlers return `ApiResult<T>` and propagate with `?`; the conversion
/// here decides the status code and the error code in the body.
pub struct ApiError(pub LeadScoutError);

impl From<LeadScoutError> for ApiError {
    fn from(err: LeadScoutError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            LeadScoutError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            LeadScoutError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            LeadScoutError::Overloaded(_) => (StatusCode::TOO_MANY_REQUESTS, "overloaded"),
            LeadScoutError::Cancelled(_) => (StatusCode::CONFLICT, "cancelled"),
            LeadScoutError::PlatformUnavailable(_) => {
                (StatusCode::BAD_GATEWAY, "platform_unavailable")
            }
            LeadScoutError::JobTimedOut(_) => (StatusCode::GATEWAY_TIMEOUT, "job_timed_out"),
            LeadScoutError::Export(_) => (StatusCode::GONE, "export_expired"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }
        json_error(status, code, &self.0.to_string())
    }
}

/// Handler result alias.
pub type ApiResult<T> = Result<T, ApiError>;
