//! Per-feed outcomes of a merge run and the operator-facing report

use std::fmt;

use crate::models::MergeSummary;
use crate::utils::url::UrlUtils;

/// How one feed URL fared during a merge run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedOutcome {
    Ok { programs: usize, channels: usize },
    /// Transfer failed after retries, or the body was empty
    DownloadFailed,
    /// Body arrived but is not guide markup
    NotGuideFormat { preview: String },
    /// Body looked like guide markup but could not be parsed
    ParseFailed,
}

impl FeedOutcome {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Ok { .. } => "OK",
            Self::DownloadFailed => "DL_FAIL",
            Self::NotGuideFormat { .. } => "NOT_XML",
            Self::ParseFailed => "PARSE_FAIL",
        }
    }
}

/// One line per processed URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLine {
    pub url: String,
    pub outcome: FeedOutcome,
}

impl fmt::Display for ReportLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let url = UrlUtils::obfuscate_credentials(&self.url);
        match &self.outcome {
            FeedOutcome::Ok { programs, channels } => {
                write!(f, "OK {url} programs={programs} channels={channels}")
            }
            FeedOutcome::NotGuideFormat { preview } => {
                write!(f, "NOT_XML {url} (head: {preview})")
            }
            other => write!(f, "{} {url}", other.tag()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiagnosticReport {
    lines: Vec<ReportLine>,
}

impl DiagnosticReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, url: impl Into<String>, outcome: FeedOutcome) {
        self.lines.push(ReportLine {
            url: url.into(),
            outcome,
        });
    }

    /// Rendered lines in sorted order, independent of completion order
    pub fn sorted_lines(&self) -> Vec<String> {
        let mut rendered: Vec<String> = self.lines.iter().map(ToString::to_string).collect();
        rendered.sort();
        rendered
    }

    /// Outcome counts plus the merged totals
    pub fn summary(&self, programs: usize, channels: usize) -> MergeSummary {
        let mut summary = MergeSummary {
            programs,
            channels,
            ..Default::default()
        };
        for line in &self.lines {
            match line.outcome {
                FeedOutcome::Ok { .. } => summary.ok += 1,
                FeedOutcome::DownloadFailed => summary.download_failed += 1,
                FeedOutcome::NotGuideFormat { .. } => summary.not_guide_format += 1,
                FeedOutcome::ParseFailed => summary.parse_failed += 1,
            }
        }
        summary
    }
}
