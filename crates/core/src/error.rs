//! Unified error types for wbdiff.
//!
//! Every variant renders with a stable upper-case code prefix so callers can
//! match on the kind of failure without parsing free text.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the wbdiff service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed URL, year or timestamp.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// The archive listed nothing for the request, or nothing is stored for the year.
    #[error("NO_CAPTURES: {0}")]
    NoCaptures(String),

    /// The year was processed but the requested timestamp is not among its captures.
    #[error("CAPTURE_NOT_FOUND: {0}")]
    CaptureNotFound(String),

    /// Network or IO failure talking to the archive.
    #[error("TRANSPORT_ERROR: {0}")]
    Transport(String),

    /// Unreadable body or unparseable markup.
    #[error("DECODE_ERROR: {0}")]
    Decode(String),

    /// The archive answered with a non-success status.
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),
}

impl Error {
    /// The stable code for this error, e.g. `NO_CAPTURES`.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "INVALID_INPUT",
            Error::NoCaptures(_) => "NO_CAPTURES",
            Error::CaptureNotFound(_) => "CAPTURE_NOT_FOUND",
            Error::Transport(_) => "TRANSPORT_ERROR",
            Error::Decode(_) => "DECODE_ERROR",
            Error::HttpError(_) => "HTTP_ERROR",
            Error::Database(_) | Error::MigrationFailed(_) => "CACHE_ERROR",
        }
    }

    /// The message without the code prefix.
    pub fn message(&self) -> String {
        match self {
            Error::InvalidInput(msg)
            | Error::NoCaptures(msg)
            | Error::CaptureNotFound(msg)
            | Error::Transport(msg)
            | Error::Decode(msg)
            | Error::HttpError(msg)
            | Error::MigrationFailed(msg) => msg.clone(),
            Error::Database(e) => e.to_string(),
        }
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let code = match &err {
            Error::InvalidInput(_) => -32602,
            Error::NoCaptures(_) => -32001,
            Error::CaptureNotFound(_) => -32003,
            Error::Transport(_) => -32004,
            Error::Decode(_) => -32005,
            Error::HttpError(_) => -32008,
            Error::Database(_) | Error::MigrationFailed(_) => -32002,
        };

        McpError { code: ErrorCode(code), message: err.message().into(), data: None }
    }
}
