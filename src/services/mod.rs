//! Guide services: programme queries, lookups and provider refreshes

pub mod epg_service;
pub mod programs;
pub mod provider_epg;

pub use epg_service::EpgService;
pub use programs::{NowNext, TimelineItem};
pub use provider_epg::{GuidePlan, ProviderEpgService};
