//! Waymark API — error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use waymark_core::error::EngineError;

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer error wrapper around `EngineError`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The periodic trigger presented a wrong or missing shared secret.
    #[error("unauthorized")]
    Unauthorized,

    /// A domain error from the engine.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Self::Engine(engine) => match engine {
                EngineError::ChapterNotFound(_) => (StatusCode::NOT_FOUND, "chapter_not_found"),
                EngineError::StepNotFound(_) => (StatusCode::NOT_FOUND, "step_not_found"),
                EngineError::Precondition(_) => (StatusCode::CONFLICT, "precondition_failed"),
                EngineError::Config(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error")
                }
                EngineError::Delivery(_) => (StatusCode::BAD_GATEWAY, "delivery_failed"),
                // Retryable and explicitly distinguishable from any
                // "no active chapter" response.
                EngineError::StoreUnavailable(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable")
                }
            },
        };

        let body = ErrorBody {
            error: error_code,
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
