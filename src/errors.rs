use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde_json::json;
use thiserror::Error;

/// Service-level error taxonomy.
///
/// Validation and input errors surface verbatim to the client; external
/// provider errors are recoverable wherever a fallback exists and only reach
/// the wire when every provider in a chain has failed.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    /// Status code the error maps to on the wire.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::ValidationError(_) | ServiceError::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            ServiceError::PaymentFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::DatabaseError(_) | ServiceError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(errors.to_string())
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        ServiceError::ExternalServiceError(err.to_string())
    }
}

/// Error bodies use the `{"error": "..."}` contract shared with the admin
/// tooling; database detail never leaves the process.
impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            ServiceError::DatabaseError(err) => {
                tracing::error!(error = %err, "database error");
                "Database operation failed".to_string()
            }
            ServiceError::InternalError(msg) => {
                tracing::error!(error = %msg, "internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_bad_request() {
        let err = ServiceError::ValidationError("missing required address fields".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn persistence_errors_map_to_internal_server_error() {
        let err = ServiceError::DatabaseError(DbErr::Custom("boom".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn database_detail_never_reaches_the_wire() {
        use http_body_util::BodyExt;

        let err = ServiceError::DatabaseError(DbErr::Custom("password=hunter2".into()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Database operation failed");
    }
}
