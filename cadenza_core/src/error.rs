//! Error types for melody continuation.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Seed melody contains no notes")]
    EmptySeed,

    #[error("Invalid seed: {0}")]
    InvalidSeed(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("MIDI error: {0}")]
    Midi(String),

    #[error("Unsupported MIDI file: {0}")]
    MidiUnsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Generation cancelled")]
    Cancelled,

    #[error("Generation deadline exceeded")]
    DeadlineExceeded,
}

impl From<midly::Error> for Error {
    fn from(e: midly::Error) -> Self {
        Error::Midi(e.to_string())
    }
}

impl Error {
    /// True for errors caused by the uploaded seed rather than by the
    /// models or the host.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Error::EmptySeed | Error::InvalidSeed(_) | Error::Midi(_) | Error::MidiUnsupported(_)
        )
    }
}
