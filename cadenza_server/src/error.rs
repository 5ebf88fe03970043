//! Error types for the HTTP front end.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind listener: {0}")]
    Bind(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("No file part")]
    NoFilePart,

    #[error("No selected file")]
    NoSelectedFile,

    #[error("Upload exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Invalid server configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Core(#[from] cadenza_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
