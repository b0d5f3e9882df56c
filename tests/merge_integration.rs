use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use epg_merge::config::MergeConfig;
use epg_merge::errors::{SourceError, SourceResult};
use epg_merge::ingestor::SourceMergeEngine;
use epg_merge::repositories::{MemorySnapshotStore, SnapshotStore};
use epg_merge::sources::FeedFetcher;

#[derive(Clone)]
enum Reply {
    Body(String),
    Unreachable,
}

/// In-process feed host: fixed replies per URL plus concurrency tracking
#[derive(Default)]
struct FakeFeeds {
    replies: HashMap<String, Reply>,
    latency: Option<std::time::Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeFeeds {
    fn with(mut self, url: &str, reply: Reply) -> Self {
        self.replies.insert(url.to_string(), reply);
        self
    }
}

#[async_trait]
impl FeedFetcher for FakeFeeds {
    async fn fetch_text(&self, location: &str) -> SourceResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.replies.get(location) {
            Some(Reply::Body(body)) => Ok(body.clone()),
            Some(Reply::Unreachable) | None => Err(SourceError::transport(location, "connection refused")),
        }
    }
}

/// Guide document with `count` consecutive half-hour programmes per channel
fn guide(tag: &str, channels: &[(&str, usize)]) -> String {
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<tv>\n");

    for (channel, _) in channels {
        xml.push_str(&format!(
            "  <channel id=\"{channel}\"><display-name>{channel} {tag}</display-name></channel>\n"
        ));
    }
    for (channel, count) in channels {
        for i in 0..*count {
            let start = base + Duration::minutes(30 * i as i64);
            let stop = start + Duration::minutes(30);
            xml.push_str(&format!(
                "  <programme channel=\"{channel}\" start=\"{} +0000\" stop=\"{} +0000\"><title>{tag} {channel} {i}</title></programme>\n",
                start.format("%Y%m%d%H%M%S"),
                stop.format("%Y%m%d%H%M%S"),
            ));
        }
    }

    xml.push_str("</tv>\n");
    xml
}

fn quick_config() -> MergeConfig {
    MergeConfig {
        restricted_stagger_ms: 0,
        retry_delays_ms: vec![0, 0, 0],
        ..Default::default()
    }
}

fn engine(feeds: Arc<FakeFeeds>, store: Arc<MemorySnapshotStore>, config: MergeConfig) -> SourceMergeEngine {
    SourceMergeEngine::new(feeds, store, config)
}

#[tokio::test]
async fn test_winner_per_channel_end_to_end() {
    let feeds = Arc::new(
        FakeFeeds::default()
            .with("http://a/guide.xml", Reply::Body(guide("A", &[("X", 50)])))
            .with("http://b/guide.xml", Reply::Body(guide("B", &[("X", 30), ("Y", 20)]))),
    );
    let store = Arc::new(MemorySnapshotStore::new());
    let urls = vec!["http://a/guide.xml".to_string(), "http://b/guide.xml".to_string()];

    let outcome = engine(feeds, Arc::clone(&store), quick_config())
        .merge("p1", &urls)
        .await
        .unwrap();

    let snapshot = &outcome.snapshot;
    let x: Vec<_> = snapshot.programs.iter().filter(|p| p.channel_id == "X").collect();
    let y: Vec<_> = snapshot.programs.iter().filter(|p| p.channel_id == "Y").collect();

    assert_eq!(x.len(), 50);
    assert!(x.iter().all(|p| p.title.starts_with("A ")));
    assert_eq!(y.len(), 20);
    assert!(y.iter().all(|p| p.title.starts_with("B ")));
    assert!(snapshot.programs.iter().all(|p| p.end > p.start));

    assert_eq!(snapshot.channels.len(), 2);
    let x_channel = snapshot.channels.iter().find(|c| c.id == "X").unwrap();
    assert_eq!(x_channel.display_names, vec!["X A", "X B"]);

    assert_eq!(outcome.summary.ok, 2);
    assert_eq!(outcome.summary.programs, 70);
    assert_eq!(outcome.summary.channels, 2);

    let stored = store.load("p1").await.unwrap().unwrap();
    assert_eq!(stored.id, snapshot.id);
}

#[tokio::test]
async fn test_tie_goes_to_first_listed_url() {
    let feeds = Arc::new(
        FakeFeeds::default()
            .with("http://first/guide.xml", Reply::Body(guide("FIRST", &[("X", 10)])))
            .with("http://second/guide.xml", Reply::Body(guide("SECOND", &[("X", 10)]))),
    );
    let store = Arc::new(MemorySnapshotStore::new());

    for _ in 0..3 {
        let urls = vec!["http://first/guide.xml".to_string(), "http://second/guide.xml".to_string()];
        let outcome = engine(Arc::clone(&feeds), Arc::clone(&store), quick_config())
            .merge("p1", &urls)
            .await
            .unwrap();

        assert_eq!(outcome.snapshot.programs.len(), 10);
        assert!(outcome.snapshot.programs.iter().all(|p| p.title.starts_with("FIRST ")));
    }
}

#[tokio::test]
async fn test_failures_are_classified_and_reported() {
    let broken = "<tv><programme channel=\"X\" start=\"20240501000000 +0000\" stop=\"20240501003000 +0000\"><title>T</programme></tv>";
    let feeds = Arc::new(
        FakeFeeds::default()
            .with("http://ok/guide.xml", Reply::Body(guide("OK", &[("X", 4)])))
            .with("http://down/guide.xml", Reply::Unreachable)
            .with("http://blank/guide.xml", Reply::Body("  \r\n".to_string()))
            .with("http://html/guide.xml", Reply::Body("<html><body>Forbidden</body></html>".to_string()))
            .with("http://broken/guide.xml", Reply::Body(broken.to_string())),
    );
    let store = Arc::new(MemorySnapshotStore::new());
    let urls: Vec<String> = ["ok", "down", "blank", "html", "broken"]
        .iter()
        .map(|host| format!("http://{host}/guide.xml"))
        .collect();

    let outcome = engine(Arc::clone(&feeds), Arc::clone(&store), quick_config())
        .merge("p1", &urls)
        .await
        .unwrap();

    let summary = outcome.summary;
    assert_eq!(summary.ok, 1);
    assert_eq!(summary.download_failed, 2);
    assert_eq!(summary.not_guide_format, 1);
    assert_eq!(summary.parse_failed, 1);
    assert_eq!(summary.programs, 4);

    // Unreachable host is tried once per scheduled attempt, the others once
    assert_eq!(feeds.calls.load(Ordering::SeqCst), 3 + 4);

    let report = store.report("p1").await.unwrap();
    assert_eq!(report, outcome.report);
    assert_eq!(report.len(), 5);
    let mut sorted = report.clone();
    sorted.sort();
    assert_eq!(report, sorted);
    assert!(report.contains(&"OK http://ok/guide.xml programs=4 channels=1".to_string()));
    assert!(report.contains(&"DL_FAIL http://down/guide.xml".to_string()));
    assert!(report.contains(&"DL_FAIL http://blank/guide.xml".to_string()));
    assert!(report.contains(&"PARSE_FAIL http://broken/guide.xml".to_string()));
    assert!(report
        .iter()
        .any(|line| line.starts_with("NOT_XML http://html/guide.xml (head: <html><body>")));
}

#[tokio::test]
async fn test_all_sources_failing_yields_empty_snapshot() {
    let feeds = Arc::new(FakeFeeds::default());
    let store = Arc::new(MemorySnapshotStore::new());
    let urls = vec!["http://gone/1.xml".to_string(), "http://gone/2.xml".to_string()];

    let outcome = engine(feeds, Arc::clone(&store), quick_config())
        .merge("p1", &urls)
        .await
        .unwrap();

    assert!(outcome.snapshot.programs.is_empty());
    assert!(outcome.snapshot.channels.is_empty());
    assert_eq!(outcome.summary.download_failed, 2);
    assert_eq!(
        outcome.summary.to_string(),
        "EPG: OK=0, DL_FAIL=2, PARSE_FAIL=0, NOT_XML=0, Programs=0, Channels=0"
    );

    let stored = store.load("p1").await.unwrap().unwrap();
    assert!(stored.programs.is_empty());
}

#[tokio::test]
async fn test_duplicate_urls_fetched_once() {
    let feeds = Arc::new(FakeFeeds::default().with("http://a/guide.xml", Reply::Body(guide("A", &[("X", 2)]))));
    let store = Arc::new(MemorySnapshotStore::new());
    let urls = vec!["http://a/guide.xml".to_string(), "HTTP://A/GUIDE.XML".to_string()];

    let outcome = engine(Arc::clone(&feeds), store, quick_config())
        .merge("p1", &urls)
        .await
        .unwrap();

    assert_eq!(feeds.calls.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.summary.sources_total(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_restricted_hosts_share_a_small_pool() {
    let mut feeds = FakeFeeds {
        latency: Some(std::time::Duration::from_millis(500)),
        ..Default::default()
    };
    let urls: Vec<String> = (0..6)
        .map(|i| format!("https://epgshare01.online/epgshare01/guide_{i}.xml"))
        .collect();
    for (i, url) in urls.iter().enumerate() {
        let channel = format!("C{i}");
        feeds = feeds.with(url, Reply::Body(guide(&format!("S{i}"), &[(channel.as_str(), 3)])));
    }
    let feeds = Arc::new(feeds);
    let store = Arc::new(MemorySnapshotStore::new());

    let outcome = engine(Arc::clone(&feeds), store, MergeConfig::default())
        .merge("p1", &urls)
        .await
        .unwrap();

    assert_eq!(outcome.summary.ok, 6);
    assert_eq!(outcome.snapshot.channels.len(), 6);
    assert!(feeds.max_in_flight.load(Ordering::SeqCst) <= 2);
}
