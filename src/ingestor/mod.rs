//! Guide ingestion: multi-source merging, run reports and refresh events

pub mod events;
pub mod merge;
pub mod report;

pub use events::{EpgEvent, EpgEventBus, EventReceiver, EventSender};
pub use merge::{MergeOutcome, SourceMergeEngine};
pub use report::{DiagnosticReport, FeedOutcome, ReportLine};
