use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Terminal failure: {0}")]
    Terminal(String),
}

impl AppError {
    /// Whether a job that failed with this error is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Transient(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AppError::PolicyViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Terminal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidArgument(format!("Malformed record: {}", err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::InvalidArgument(msg)
            | AppError::PolicyViolation(msg)
            | AppError::Transient(msg)
            | AppError::Terminal(msg) => msg.clone(),
        };

        tracing::error!("Error: {}: {}", status, message);

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
