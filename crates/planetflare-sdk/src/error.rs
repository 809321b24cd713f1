use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SdkError>;

#[derive(Error, Debug)]
pub enum SdkError {
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Publisher rejected request ({status}): {message}")]
    Publisher { status: u16, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Error body returned by the publisher for any non-2xx response
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}
