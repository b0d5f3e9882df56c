//! Guide feed inputs: parsing, URL discovery, playlist reading and fetching

pub mod fetcher;
pub mod m3u_catalog;
pub mod m3u_header;
pub mod xmltv;

pub use fetcher::{FeedFetcher, HttpFeedFetcher, RetrySchedule};
pub use xmltv::{classify_document, parse_xmltv, DocumentKind, XmltvDocument};
