//! HTTP error response conversion.
//!
//! Handlers return `Result<impl IntoResponse, HttpAppError>`; pipeline errors
//! become a consistent JSON body (status, stable error code, details) here.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use noteworthy_core::{LogLevel, PipelineError};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Stable machine-readable error code.
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Wrapper type for PipelineError to implement IntoResponse.
/// Needed because of Rust's orphan rules: IntoResponse is external and
/// PipelineError lives in noteworthy-core.
#[derive(Debug)]
pub struct HttpAppError(pub PipelineError);

impl From<PipelineError> for HttpAppError {
    fn from(err: PipelineError) -> Self {
        HttpAppError(err)
    }
}

fn log_error(error: &PipelineError) {
    match error.log_level() {
        LogLevel::Debug => {
            tracing::debug!(error = %error, kind = error.kind(), "Request failed");
        }
        LogLevel::Warn => {
            tracing::warn!(error = %error, kind = error.kind(), "Request failed");
        }
        LogLevel::Error => {
            tracing::error!(error = %error, kind = error.kind(), "Request failed");
        }
    }
}

impl IntoResponse for HttpAppError {
    fn into_response(self) -> Response {
        let err = &self.0;
        let status = StatusCode::from_u16(err.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        log_error(err);

        // Internal details stay out of responses; service diagnostics (like a
        // compiler log) are the useful payload and go through as-is.
        let details = match err {
            PipelineError::Internal(_) => None,
            _ => Some(err.detail()),
        };
        let body = Json(ErrorResponse {
            error: err.kind().to_string(),
            details,
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compilation_error_maps_to_422_with_details() {
        let err = HttpAppError(PipelineError::Compilation {
            diagnostic: "! Undefined control sequence.".to_string(),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_internal_error_hides_details() {
        let err = HttpAppError(PipelineError::Internal("spool write failed".to_string()));
        let details = match &err.0 {
            PipelineError::Internal(_) => None,
            other => Some(other.detail()),
        };
        assert!(details.is_none());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
