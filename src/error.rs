//! Error types for hls-uploader
//!
//! This module provides the error taxonomy for the library:
//! - Precondition violations (invalid arguments, duplicate items, bad configuration)
//! - Transient I/O failures (network, pipe, process spawn)
//! - Cancellation, kept distinct from ordinary failure
//! - Internal invariant violations, which signal a bug rather than a user error
//! - Transcoder result errors (diagnostic parse failures, non-zero exit)

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for hls-uploader operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for hls-uploader
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "concurrent_downloads")
        key: Option<String>,
    },

    /// An argument failed a precondition before any work was started
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument {
        /// Name of the offending argument
        name: &'static str,
        /// Why the argument was rejected
        reason: String,
    },

    /// The same work item appears more than once in an ordered batch
    #[error("duplicate item at position {index} (first seen at {first_index})")]
    DuplicateItem {
        /// Position of the repeated item
        index: usize,
        /// Position where the item was first seen
        first_index: usize,
    },

    /// The operation was cancelled through its cancellation token
    #[error("operation cancelled")]
    Cancelled,

    /// An internal invariant was violated (this is a bug)
    #[error("internal invariant violated: {0}")]
    Internal(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The writer side of the transcoder input pipe can no longer accept data
    #[error("pipe closed: {0}")]
    PipeClosed(String),

    /// External tool execution failed (ffmpeg could not be started, etc.)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Transcoder run or result error
    #[error("transcode error: {0}")]
    Transcode(#[from] TranscodeError),

    /// Publishing the finished video failed
    #[error("upload failed: {0}")]
    Upload(String),
}

/// Transcoder-related errors
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// An operation that needs a running transcoder was called before `run`
    #[error("transcoder is not running")]
    NotRunning,

    /// `run` was called twice on the same transcoder
    #[error("transcoder already started for {path}")]
    AlreadyStarted {
        /// Output path of the existing run
        path: PathBuf,
    },

    /// The transcoder was already disposed
    #[error("transcoder already disposed")]
    Disposed,

    /// The diagnostic output contained no resolution marker
    #[error("no video resolution found in transcoder output")]
    MissingResolution,

    /// The diagnostic output contained no progress time marker
    #[error("no duration found in transcoder output")]
    MissingDuration,

    /// A matched marker held a value that does not fit the target type
    #[error("invalid {field} value {value:?} in transcoder output")]
    InvalidMarker {
        /// Which marker field failed to parse
        field: &'static str,
        /// The raw matched text
        value: String,
    },

    /// The transcoder exited with a non-zero status
    #[error("transcoder exited with {status}: {last_line}")]
    ProcessFailed {
        /// Exit status as reported by the OS
        status: String,
        /// Last non-empty diagnostic line, if any
        last_line: String,
    },
}

impl Error {
    /// Returns `true` if this error represents cancellation rather than failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::InvalidArgument { .. } => "invalid_argument",
            Error::DuplicateItem { .. } => "duplicate_item",
            Error::Cancelled => "cancelled",
            Error::Internal(_) => "internal_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::PipeClosed(_) => "pipe_closed",
            Error::ExternalTool(_) => "external_tool_error",
            Error::Transcode(e) => match e {
                TranscodeError::NotRunning => "transcoder_not_running",
                TranscodeError::AlreadyStarted { .. } => "transcoder_already_started",
                TranscodeError::Disposed => "transcoder_disposed",
                TranscodeError::MissingResolution => "missing_resolution",
                TranscodeError::MissingDuration => "missing_duration",
                TranscodeError::InvalidMarker { .. } => "invalid_marker",
                TranscodeError::ProcessFailed { .. } => "transcoder_failed",
            },
            Error::Upload(_) => "upload_error",
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            Error::Cancelled
        } else {
            Error::Internal(format!("background task panicked: {err}"))
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_maps_to_expected_error_code() {
        let cases: Vec<(Error, &str)> = vec![
            (
                Error::Config {
                    message: "must be at least 1".into(),
                    key: Some("concurrent_downloads".into()),
                },
                "config_error",
            ),
            (
                Error::InvalidArgument {
                    name: "concurrency",
                    reason: "must be at least 1".into(),
                },
                "invalid_argument",
            ),
            (
                Error::DuplicateItem {
                    index: 3,
                    first_index: 1,
                },
                "duplicate_item",
            ),
            (Error::Cancelled, "cancelled"),
            (Error::Internal("unconsumed".into()), "internal_error"),
            (
                Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")),
                "io_error",
            ),
            (Error::PipeClosed("reader dropped".into()), "pipe_closed"),
            (
                Error::ExternalTool("ffmpeg not found".into()),
                "external_tool_error",
            ),
            (
                Error::Transcode(TranscodeError::MissingResolution),
                "missing_resolution",
            ),
            (
                Error::Transcode(TranscodeError::MissingDuration),
                "missing_duration",
            ),
            (
                Error::Transcode(TranscodeError::ProcessFailed {
                    status: "exit status: 1".into(),
                    last_line: "pipe:0: Invalid data".into(),
                }),
                "transcoder_failed",
            ),
            (Error::Upload("chat not found".into()), "upload_error"),
        ];

        for (error, expected) in cases {
            assert_eq!(error.error_code(), expected, "wrong code for {error}");
        }
    }

    #[test]
    fn only_cancelled_reports_is_cancelled() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::Internal("x".into()).is_cancelled());
        assert!(!Error::PipeClosed("x".into()).is_cancelled());
    }

    #[test]
    fn duplicate_item_message_names_both_positions() {
        let err = Error::DuplicateItem {
            index: 4,
            first_index: 0,
        };
        assert_eq!(
            err.to_string(),
            "duplicate item at position 4 (first seen at 0)"
        );
    }

    #[test]
    fn transcode_error_converts_into_error() {
        let err: Error = TranscodeError::NotRunning.into();
        assert!(matches!(err, Error::Transcode(TranscodeError::NotRunning)));
        assert_eq!(err.to_string(), "transcode error: transcoder is not running");
    }

    #[tokio::test]
    async fn panicked_task_maps_to_internal() {
        let handle = tokio::spawn(async { panic!("boom") });
        let join_err = handle.await.unwrap_err();
        let err: Error = join_err.into();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[tokio::test]
    async fn aborted_task_maps_to_cancelled() {
        let handle = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        });
        handle.abort();
        let join_err = handle.await.unwrap_err();
        let err: Error = join_err.into();
        assert!(err.is_cancelled());
    }
}
