use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use planetflare_sdk::SdkError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, PublisherError>;

#[derive(Error, Debug)]
pub enum PublisherError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid future payment")]
    Authentication,

    /// Attempted to extend a future payment that does not verify
    #[error("Future payment integrity violation: {0}")]
    Integrity(String),

    #[error("Token store error: {0}")]
    Storage(String),

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<SdkError> for PublisherError {
    fn from(err: SdkError) -> Self {
        match err {
            SdkError::InvalidInput(msg) => PublisherError::InvalidRequest(msg),
            SdkError::Crypto(msg) => PublisherError::Crypto(msg),
            other => PublisherError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for PublisherError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            PublisherError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            PublisherError::Authentication => (StatusCode::UNAUTHORIZED, self.to_string()),
            PublisherError::Integrity(_)
            | PublisherError::Storage(_)
            | PublisherError::Crypto(_)
            | PublisherError::Internal(_) => {
                // Detail stays in the log, the caller gets a generic failure
                error!(error = %self, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "success": false,
            "error": message,
        }));

        (status, body).into_response()
    }
}
