//! Now/next and timeline queries over one channel's programme list
//!
//! Every function here expects `programs` sorted ascending by start, as the
//! resolution index stores them.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

use crate::models::Program;
use crate::utils::normalize::normalize_title;

/// Programme airing at a given instant and the one after it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NowNext {
    pub now: Option<Program>,
    pub next: Option<Program>,
}

/// A timeline entry with its live state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineItem {
    pub program: Program,
    pub is_now: bool,
    /// Elapsed share of the airing programme, 0 to 100; 0 when not airing
    pub progress: u8,
}

/// Find the airing programme and its successor.
///
/// Without an airing programme, `next` is the first one starting after
/// `now`. With one, `next` is the first starting at or after its end, so
/// overlapping entries from sloppy feeds are skipped.
pub fn now_next(programs: &[Program], now: DateTime<Utc>) -> NowNext {
    match programs.iter().find(|p| p.is_airing_at(now)) {
        Some(current) => NowNext {
            now: Some(current.clone()),
            next: programs.iter().find(|p| p.start >= current.end).cloned(),
        },
        None => NowNext {
            now: None,
            next: programs.iter().find(|p| p.start > now).cloned(),
        },
    }
}

/// Programmes overlapping `(now - past, now + future)`, deduplicated.
///
/// Negative windows count as zero. A programme ending exactly at the lower
/// bound or starting exactly at the upper bound is outside the window.
/// Windows reaching past the representable range are clamped to it.
pub fn timeline(programs: &[Program], now: DateTime<Utc>, past: Duration, future: Duration) -> Vec<Program> {
    let from = now
        .checked_sub_signed(past.max(Duration::zero()))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let to = now
        .checked_add_signed(future.max(Duration::zero()))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    let windowed: Vec<Program> = programs
        .iter()
        .take_while(|p| p.start < to)
        .filter(|p| p.end > from)
        .cloned()
        .collect();

    dedup_programs(windowed)
}

/// [`timeline`] with each entry flagged as airing and its progress.
pub fn timeline_items(
    programs: &[Program],
    now: DateTime<Utc>,
    past: Duration,
    future: Duration,
) -> Vec<TimelineItem> {
    timeline(programs, now, past, future)
        .into_iter()
        .map(|program| {
            let is_now = program.is_airing_at(now);
            let progress = if is_now { progress_percent(&program, now) } else { 0 };
            TimelineItem {
                program,
                is_now,
                progress,
            }
        })
        .collect()
}

fn progress_percent(program: &Program, now: DateTime<Utc>) -> u8 {
    let total = (program.end - program.start).num_milliseconds();
    if total <= 0 {
        return 0;
    }
    let done = (now - program.start).num_milliseconds();
    (done.saturating_mul(100) / total).clamp(0, 100) as u8
}

/// Exact-duplicate removal keyed by channel, start, end and normalized title.
///
/// Channel ids compare case-insensitively. The first occurrence is kept and
/// the result is sorted by start (stable, so equal starts keep their order).
pub fn dedup_programs(programs: Vec<Program>) -> Vec<Program> {
    let mut seen = HashSet::with_capacity(programs.len());
    let mut result: Vec<Program> = programs
        .into_iter()
        .filter(|p| {
            seen.insert((
                p.channel_id.trim().to_lowercase(),
                p.start,
                p.end,
                normalize_title(&p.title),
            ))
        })
        .collect();

    result.sort_by_key(|p| p.start);
    result
}
