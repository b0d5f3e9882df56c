use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::{Args, Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use epg_merge::{
    config::{Config, QueryConfig},
    ingestor::{EpgEvent, EpgEventBus},
    models::{PlaylistChannel, ProviderEpgConfig},
    repositories::JsonSnapshotStore,
    services::{EpgService, ProviderEpgService},
    sources::{m3u_catalog::parse_playlist, m3u_header::extract_epg_urls, FeedFetcher, HttpFeedFetcher},
    utils::url::UrlUtils,
};

#[derive(Parser)]
#[command(name = "epg-merge")]
#[command(version)]
#[command(about = "Merge XMLTV guide feeds per provider and query what is on")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Data directory (overrides config file)
    #[arg(short = 'd', long, value_name = "DIR")]
    data_dir: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the guide URLs advertised by a playlist header
    Discover {
        /// Playlist URL or file path
        playlist: String,
    },
    /// Fetch and merge a provider's guide feeds into a new snapshot
    Refresh {
        #[arg(short, long)]
        provider: String,
        /// Playlist URL or file path used for guide URL discovery
        #[arg(long)]
        playlist: Option<String>,
        /// Guide feed URL; repeatable, comma separated lists accepted
        #[arg(short, long = "url")]
        urls: Vec<String>,
        /// Single local guide file, used instead of any URLs
        #[arg(short, long)]
        file: Option<String>,
    },
    /// Show the programme airing now and the one after it
    NowNext(ChannelArgs),
    /// Show programmes around now
    Timeline {
        #[command(flatten)]
        channel: ChannelArgs,
        /// Minutes before now (defaults to config)
        #[arg(long)]
        past: Option<i64>,
        /// Minutes after now (defaults to config)
        #[arg(long)]
        future: Option<i64>,
    },
    /// Print now/next for every channel in a playlist
    Guide {
        #[arg(short, long)]
        provider: String,
        /// Playlist URL or file path
        playlist: String,
    },
}

#[derive(Args)]
struct ChannelArgs {
    #[arg(short, long)]
    provider: String,
    /// Channel display name as listed in the playlist
    #[arg(short, long, default_value = "")]
    name: String,
    /// External guide id (tvg-id)
    #[arg(short, long)]
    tvg_id: Option<String>,
}

impl ChannelArgs {
    fn to_channel(&self) -> PlaylistChannel {
        PlaylistChannel {
            provider_id: self.provider.clone(),
            category_name: String::new(),
            name: self.name.clone(),
            tvg_id: self.tvg_id.clone(),
            logo_url: None,
            stream_url: String::new(),
        }
    }
}

fn format_time(at: DateTime<chrono::Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("epg_merge={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting EPG merge v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);

    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir.into();
    }

    let store = Arc::new(JsonSnapshotStore::new(&config.storage.data_dir));
    let fetcher: Arc<dyn FeedFetcher> = Arc::new(
        HttpFeedFetcher::new(&config.http).context("Failed to build HTTP client")?,
    );

    match cli.command {
        Command::Discover { playlist } => {
            let text = fetcher.fetch_text(&playlist).await?;
            let urls = extract_epg_urls(&text);
            if urls.is_empty() {
                println!("No guide URLs found in playlist header");
            }
            for url in urls {
                println!("{}", UrlUtils::obfuscate_credentials(&url));
            }
        }
        Command::Refresh {
            provider,
            playlist,
            urls,
            file,
        } => {
            let playlist_text = match playlist {
                Some(location) => Some(fetcher.fetch_text(&location).await?),
                None => None,
            };

            let bus = EpgEventBus::default();
            let mut events = bus.subscribe();
            let service = ProviderEpgService::new(Arc::clone(&fetcher), store, bus, config.merge.clone());

            let provider_config = ProviderEpgConfig {
                provider_id: provider,
                xmltv_urls: urls,
                xmltv_file_path: file,
            };

            if let Some(outcome) = service.refresh(&provider_config, playlist_text.as_deref()).await? {
                for line in &outcome.report {
                    println!("{line}");
                }
            }

            while let Ok(event) = events.try_recv() {
                if let EpgEvent::Notification { message, .. } = event {
                    println!("{message}");
                }
            }
        }
        Command::NowNext(args) => {
            let service = EpgService::new(store);
            let channel = args.to_channel();
            let result = service.now_next(&channel, Local::now()).await?;

            match result.now {
                Some(p) => println!("Now:  {} - {}  {}", format_time(p.start), format_time(p.end), p.title),
                None => println!("Now:  (no guide data)"),
            }
            if let Some(p) = result.next {
                println!("Next: {} - {}  {}", format_time(p.start), format_time(p.end), p.title);
            }
        }
        Command::Timeline {
            channel,
            past,
            future,
        } => {
            let service = EpgService::new(store);
            let past = past
                .map(QueryConfig::window)
                .unwrap_or_else(|| config.query.past_window());
            let future = future
                .map(QueryConfig::window)
                .unwrap_or_else(|| config.query.future_window());

            let items = service
                .timeline_items(&channel.to_channel(), Local::now(), past, future)
                .await?;
            if items.is_empty() {
                println!("(no guide data)");
            }
            for item in items {
                let marker = if item.is_now {
                    format!(" [{}%]", item.progress)
                } else {
                    String::new()
                };
                println!(
                    "{} - {}  {}{}",
                    format_time(item.program.start),
                    format_time(item.program.end),
                    item.program.title,
                    marker
                );
            }
        }
        Command::Guide { provider, playlist } => {
            let text = fetcher.fetch_text(&playlist).await?;
            let channels = parse_playlist(&provider, &text);
            let service = EpgService::new(store);
            let now = Local::now();

            let mut unmatched = 0usize;
            for channel in &channels {
                let result = service.now_next(channel, now).await?;
                match (result.now, result.next) {
                    (None, None) => unmatched += 1,
                    (now, next) => println!(
                        "{:<32} {:<40} {}",
                        channel.name,
                        now.map(|p| p.title).unwrap_or_default(),
                        next.map(|p| p.title).unwrap_or_default()
                    ),
                }
            }
            if unmatched > 0 {
                warn!("{} of {} channel(s) have no guide data", unmatched, channels.len());
            }
        }
    }

    Ok(())
}
