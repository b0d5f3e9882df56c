//! XMLTV timestamp handling
//!
//! Guide feeds carry times as `YYYYMMDDhhmmss` optionally followed by a
//! `±hhmm` offset. Stamps with an offset map directly to UTC; stamps without
//! one are read in the host machine's local time zone.
//!
//! # Usage
//!
//! ```rust
//! use epg_merge::utils::datetime::parse_xmltv_time;
//!
//! let start = parse_xmltv_time("20240101180000 +0100").unwrap();
//! assert_eq!(start.to_rfc3339(), "2024-01-01T17:00:00+00:00");
//! ```

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

const STAMP_LEN: usize = 14;
const STAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Errors that can occur while reading a guide timestamp
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DateTimeError {
    /// Fewer than fourteen leading digits, or not a calendar time
    #[error("Invalid XMLTV time: '{input}'")]
    InvalidFormat { input: String },

    /// Offset present but not of the form `±hhmm`
    #[error("Invalid XMLTV offset: '{input}'")]
    InvalidOffset { input: String },

    /// Local time that does not exist on the host (DST gap)
    #[error("Local time does not exist: {input}")]
    NonexistentLocalTime { input: String },
}

/// Parse an XMLTV `start`/`stop` attribute into a UTC instant.
///
/// Anything after the first fourteen characters is treated as the offset
/// with surrounding and embedded spaces removed. A suffix that is not shaped
/// like `±hhmm` (a zone name, a truncated offset) is ignored and the stamp is
/// read as host local time. Ambiguous local times resolve to the earlier instant.
pub fn parse_xmltv_time(value: &str) -> Result<DateTime<Utc>, DateTimeError> {
    let trimmed = value.trim();
    let stamp = trimmed.get(..STAMP_LEN).ok_or_else(|| DateTimeError::InvalidFormat {
        input: value.to_string(),
    })?;

    let naive = NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).map_err(|_| {
        DateTimeError::InvalidFormat {
            input: value.to_string(),
        }
    })?;

    let suffix: String = trimmed[STAMP_LEN..].chars().filter(|c| !c.is_whitespace()).collect();

    if let Some(offset) = parse_offset(&suffix)? {
        return offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or(DateTimeError::InvalidOffset { input: suffix });
    }

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| DateTimeError::NonexistentLocalTime {
            input: stamp.to_string(),
        })
}

/// `Ok(None)` when the suffix is not shaped like `±hhmm`.
fn parse_offset(suffix: &str) -> Result<Option<FixedOffset>, DateTimeError> {
    let bytes = suffix.as_bytes();
    let shaped = bytes.len() == 5
        && (bytes[0] == b'+' || bytes[0] == b'-')
        && bytes[1..].iter().all(u8::is_ascii_digit);
    if !shaped {
        return Ok(None);
    }

    let digit = |i: usize| i32::from(bytes[i] - b'0');
    let hours = digit(1) * 10 + digit(2);
    let minutes = digit(3) * 10 + digit(4);
    let seconds = hours * 3600 + minutes * 60;
    let seconds = if bytes[0] == b'-' { -seconds } else { seconds };

    FixedOffset::east_opt(seconds)
        .map(Some)
        .ok_or_else(|| DateTimeError::InvalidOffset {
            input: suffix.to_string(),
        })
}
