//! Utility functions for the EPG merge engine
//!
//! - `utils::datetime` for XMLTV timestamp parsing
//! - `utils::decompression` for gzip sniffing and inflation
//! - `utils::normalize` for identifier and title normalization
//! - `utils::url` for host extraction and log-safe URLs

pub mod datetime;
pub mod decompression;
pub mod normalize;
pub mod url;
