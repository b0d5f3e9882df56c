//! Centralized error handling for the EPG merge engine
//!
//! # Error Categories
//!
//! - **Source Errors**: guide feed download, decoding, classification and parsing
//! - **I/O / Serialization Errors**: snapshot store failures
//! - **Validation Errors**: caller input problems
//!
//! Per-record validation failures inside a feed (missing ids, end before
//! start) are not errors at all: the parser drops those records silently.
//! Likewise a channel that cannot be matched to guide data is a normal
//! `None`, never an error.
//!
//! # Usage
//!
//! ```rust
//! use epg_merge::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     Ok("success".to_string())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for Source Results
pub type SourceResult<T> = Result<T, SourceError>;
