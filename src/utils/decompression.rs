use flate2::read::MultiGzDecoder;
use std::io::Read;

use crate::errors::{SourceError, SourceResult};

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// Check for the gzip magic bytes at the start of a payload
pub fn looks_like_gzip(data: &[u8]) -> bool {
    data.starts_with(&GZIP_MAGIC)
}

/// Decompress gzip data, including multi-member streams
pub fn decompress_gzip(data: &[u8]) -> SourceResult<Vec<u8>> {
    let mut decoder = MultiGzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| SourceError::Decompression {
            message: format!("Failed to decompress gzip data: {e}"),
        })?;
    Ok(decompressed)
}

/// Inflate the payload when it is gzip, either by name or by content.
///
/// Some hosts serve `.xml.gz` files without a content encoding, others serve
/// compressed bodies under a plain `.xml` name, so the magic bytes are
/// checked regardless of what the location claims.
pub fn maybe_decompress(location: &str, data: Vec<u8>) -> SourceResult<Vec<u8>> {
    let named_gz = location
        .split(['?', '#'])
        .next()
        .is_some_and(|path| path.to_ascii_lowercase().ends_with(".gz"));

    if looks_like_gzip(&data) {
        decompress_gzip(&data)
    } else if named_gz && !data.is_empty() {
        // Transport-level decoding may already have inflated it
        match decompress_gzip(&data) {
            Ok(inflated) => Ok(inflated),
            Err(_) => Ok(data),
        }
    } else {
        Ok(data)
    }
}
