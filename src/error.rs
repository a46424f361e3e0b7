//! Error types for the tutor voice pipeline

use std::time::Duration;

use thiserror::Error;

use crate::audio::DecodeError;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while requesting speech or replies
#[derive(Debug, Error)]
pub enum Error {
    /// Caller supplied empty or whitespace-only input
    #[error("{0} cannot be empty")]
    EmptyInput(&'static str),

    /// Configuration error (missing credential, bad URL)
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP transport error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("backend returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    /// Backend did not answer in time
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Request aborted by the caller
    #[error("request cancelled")]
    Cancelled,

    /// IO error (reading a returned audio location)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Response did not have the expected shape
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Speech backend returned neither audio nor an audio location
    #[error("backend returned no audio")]
    EmptyResult,

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Returned audio could not be decoded
    #[error("decode failed: {0}")]
    DecodeFailed(#[from] DecodeError),

    /// Audio export error
    #[error("audio error: {0}")]
    Audio(String),
}

/// Coarse error category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid caller input, reported immediately
    Input,
    /// Missing credential or URL, reported before any network attempt
    Config,
    /// Connection failure, bad status, timeout or cancellation
    Transport,
    /// Unexpected response shape
    Protocol,
    /// Malformed audio container
    Decode,
}

impl Error {
    /// Category of this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyInput(_) => ErrorKind::Input,
            Self::Config(_) => ErrorKind::Config,
            Self::Http(e) if e.is_builder() => ErrorKind::Config,
            Self::Http(_) | Self::Status { .. } | Self::Timeout(_) | Self::Cancelled | Self::Io(_) => {
                ErrorKind::Transport
            }
            Self::MalformedResponse(_) | Self::EmptyResult | Self::Serialization(_) => {
                ErrorKind::Protocol
            }
            Self::DecodeFailed(_) | Self::Audio(_) => ErrorKind::Decode,
        }
    }

    /// Whether an explicit retry wrapper may try the call again
    ///
    /// Connection failures, timeouts, 5xx, 408 and 429 only. Never cancellation,
    /// and never a request that could not be built.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => !e.is_builder(),
            Self::Timeout(_) => true,
            Self::Status { status, .. } => {
                status.is_server_error()
                    || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
                    || *status == reqwest::StatusCode::REQUEST_TIMEOUT
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(Error::EmptyInput("text").kind(), ErrorKind::Input);
        assert_eq!(Error::Config("no key".into()).kind(), ErrorKind::Config);
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Transport);
        assert_eq!(
            Error::Timeout(Duration::from_secs(1)).kind(),
            ErrorKind::Transport
        );
        assert_eq!(Error::EmptyResult.kind(), ErrorKind::Protocol);
        assert_eq!(
            Error::DecodeFailed(DecodeError::TooShort { len: 3 }).kind(),
            ErrorKind::Decode
        );
    }

    #[test]
    fn only_transport_failures_retry() {
        assert!(Error::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(
            Error::Status {
                status: reqwest::StatusCode::BAD_GATEWAY,
                body: String::new(),
            }
            .is_retryable()
        );
        assert!(
            !Error::Status {
                status: reqwest::StatusCode::NOT_FOUND,
                body: String::new(),
            }
            .is_retryable()
        );
        assert!(!Error::Cancelled.is_retryable());
        assert!(!Error::EmptyInput("prompt").is_retryable());
        assert!(!Error::MalformedResponse("no choices".into()).is_retryable());
    }

    #[test]
    fn unbuildable_request_is_config_error() {
        let err = Error::from(
            reqwest::Client::new()
                .get("not a url")
                .build()
                .unwrap_err(),
        );
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(!err.is_retryable());
    }

    #[test]
    fn empty_input_message_names_field() {
        assert_eq!(Error::EmptyInput("text").to_string(), "text cannot be empty");
    }
}
