//! Error type definitions for the EPG merge engine
//!
//! This module defines the error types used throughout the crate. Per-feed
//! failures are modelled by [`SourceError`] so the merge engine can classify
//! them without string matching; everything else is folded into [`AppError`].

use thiserror::Error;

/// Top-level application error type
///
/// Uses `thiserror` to provide the error trait implementations and proper
/// error chaining from the lower layers.
#[derive(Error, Debug)]
pub enum AppError {
    /// Guide feed errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Filesystem errors from the snapshot store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Guide feed specific errors
///
/// Every variant carries enough context to produce a report line; the URL is
/// stored as given and obfuscated only when rendered into logs.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Request did not complete within the configured timeout
    #[error("Connection timeout: {url}")]
    Timeout { url: String },

    /// Connection, TLS or body transfer failure
    #[error("Transport error: {url} - {message}")]
    Transport { url: String, message: String },

    /// Non-success HTTP status from the feed host
    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    /// Payload advertised or sniffed as compressed but failed to inflate
    #[error("Decompression failed: {message}")]
    Decompression { message: String },

    /// Local guide file missing
    #[error("File not found: {path}")]
    NotFound { path: String },

    /// Body does not look like a guide document
    #[error("Unrecognized format: {location} (starts with: {preview})")]
    UnrecognizedFormat { location: String, preview: String },

    /// Structurally invalid guide document
    #[error("Parse error: {source_type} - {message}")]
    ParseError { source_type: String, message: String },
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl SourceError {
    /// Create a timeout error
    pub fn timeout<U: Into<String>>(url: U) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Create a transport error
    pub fn transport<U: Into<String>, M: Into<String>>(url: U, message: M) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse_error<S: Into<String>, M: Into<String>>(source_type: S, message: M) -> Self {
        Self::ParseError {
            source_type: source_type.into(),
            message: message.into(),
        }
    }

    /// Whether a fetch that failed with this error may be attempted again.
    ///
    /// Only failures of the transfer itself qualify; a body that arrived but
    /// is unusable will not improve on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Transport { .. } | Self::Http { .. }
        )
    }
}
