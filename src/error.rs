//! Error types for mindwave-inference.

use std::time::Duration;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
///
/// Failures from the pipeline or trainer are carried through unmodified as
/// [`Error::Backend`]; nothing here tries to tell a bad prompt from a GPU
/// out-of-memory condition.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request failed boundary validation (bad duration, empty model name, ...).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Inference or training collaborator failed.
    #[error("backend: {0}")]
    Backend(String),

    /// Audio encoding or decoding error (WAV read, MP3 encode).
    #[error("audio: {0}")]
    Audio(String),

    /// Model cache volume problem (missing mount, missing base model).
    #[error("volume: {0}")]
    Volume(String),

    /// Invalid or unreadable deployment configuration.
    #[error("config: {0}")]
    Config(String),

    /// Generation manager is gone or dropped a reply.
    #[error("manager: {0}")]
    Manager(String),

    /// Operation exceeded its wall-clock cap and was terminated.
    #[error("{function} exceeded its {}s timeout", .limit.as_secs())]
    Timeout {
        function: &'static str,
        limit: Duration,
    },

    /// Remote invocation failed (connection, non-success status).
    #[error("remote: {0}")]
    Remote(String),

    /// I/O error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<hound::Error> for Error {
    fn from(error: hound::Error) -> Self {
        Error::Audio(error.to_string())
    }
}

impl From<figment::Error> for Error {
    fn from(error: figment::Error) -> Self {
        Error::Config(error.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Error::Remote(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_names_function_and_limit() {
        let err = Error::Timeout {
            function: "train_lora",
            limit: Duration::from_secs(3600),
        };
        assert_eq!(err.to_string(), "train_lora exceeded its 3600s timeout");
    }
}
