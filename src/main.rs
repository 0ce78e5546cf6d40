//! # Topic Tracker
//!
//! Tracks the "featured topics" bar that news homepages show near their
//! masthead, for a group's own sites and for the competitors each of them
//! watches.
//!
//! ## Features
//!
//! - Registers sites (own or competitor) and competitor links between them
//! - Scrapes each homepage's topic bar, resolving the right CSS selector per site
//! - Keeps a ledger of every (site, topic name, topic url) with first/last seen
//!   times and whether it is currently on the page
//! - Classifies topics as fresh / aging / stale by how long they have been live
//! - Serves everything as JSON over HTTP and runs hourly scans plus a weekly purge
//!
//! ## Usage
//!
//! ```sh
//! topic_tracker seed
//! topic_tracker serve --bind 0.0.0.0:5000
//! topic_tracker scan --competitors-of "La Nueva España"
//! ```
//!
//! ## Architecture
//!
//! 1. **Resolve**: pick the topic-bar selector for a site (explicit, known host, own template, fallback)
//! 2. **Extract**: pull (name, url) pairs out of the homepage, dropping boilerplate labels
//! 3. **Record**: reset the site's visibility, then upsert each pair into SQLite
//! 4. **Serve**: list topics with freshness computed at read time

use clap::Parser;
use serde::Serialize;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod extract;
mod fetch;
mod freshness;
mod http;
mod models;
mod resolver;
mod scanner;
mod scheduler;
mod seed;
mod store;
mod utils;

use cli::{Cli, Command};
use config::Settings;
use fetch::{FetchError, HttpFetcher, RetryFetch};
use http::AppState;
use models::{NewSite, TopicFilter};
use scanner::{ScanOptions, Scanner};
use scheduler::Scheduler;
use store::{Store, StoreError};

type BoxError = Box<dyn Error + Send + Sync>;
type LiveScanner = Scanner<RetryFetch<HttpFetcher>>;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), BoxError> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("topic_tracker starting up");

    let args = Cli::parse();
    debug!(?args.command, ?args.config, "Parsed CLI arguments");

    let mut settings = Settings::load(args.config.as_deref())?;
    settings.apply_cli(&args);

    let store = Arc::new(Store::open(&settings.database_path)?);

    match args.command {
        Command::Serve { bind } => {
            serve(store, &settings, bind.as_deref()).await?;
        }
        Command::Scan { competitors_of } => {
            let scanner = build_scanner(store.clone(), &settings)?;
            let summary = match competitors_of {
                Some(name) => {
                    let site = find_site(&store, &name)?;
                    scanner.scan_competitors_of(site.id).await?
                }
                None => scanner.scan_all().await?,
            };
            print_json(&summary)?;
        }
        Command::Purge { days } => {
            let days = days.unwrap_or(settings.retention_days);
            let removed = store.purge_topics(days)?;
            info!(removed, days, "Purge complete");
        }
        Command::Seed => {
            let summary = seed::seed_sites(&store)?;
            print_json(&summary)?;
        }
        Command::AddSite {
            name,
            url,
            kind,
            selector,
        } => {
            let mut site = NewSite::new(&name, &url, kind);
            if let Some(selector) = selector.as_deref() {
                site = site.with_selector(selector);
            }
            let site = store.add_site(&site)?;
            print_json(&site)?;
        }
        Command::Link { parent, competitor } => {
            let parent = find_site(&store, &parent)?;
            let competitor = find_site(&store, &competitor)?;
            store.link_competitor(parent.id, competitor.id)?;
            info!(parent = %parent.name, competitor = %competitor.name, "Linked");
        }
        Command::Sites => {
            print_json(&store.list_sites()?)?;
        }
        Command::Topics {
            kind,
            site_id,
            domain,
            limit,
        } => {
            let filter = TopicFilter {
                kind,
                site_id,
                domain,
                limit: Some(limit),
                ..TopicFilter::default()
            };
            print_json(&store.list_topics(&filter, chrono::Utc::now())?)?;
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}

fn build_scanner(store: Arc<Store>, settings: &Settings) -> Result<Arc<LiveScanner>, FetchError> {
    let fetcher = RetryFetch::new(
        HttpFetcher::from_settings(settings)?,
        settings.fetch_retries,
        Duration::from_secs(1),
    );
    Ok(Arc::new(Scanner::new(
        store,
        fetcher,
        ScanOptions::from_settings(settings),
    )))
}

fn find_site(store: &Store, name: &str) -> Result<models::Site, StoreError> {
    store
        .find_site_by_name(name)?
        .ok_or_else(|| StoreError::NotFound(format!("site '{name}'")))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run the HTTP API and the periodic jobs until Ctrl-C.
async fn serve(store: Arc<Store>, settings: &Settings, bind: Option<&str>) -> Result<(), BoxError> {
    let scanner = build_scanner(store.clone(), settings)?;
    let scheduler = Arc::new(Scheduler::start(scanner, store.clone(), settings));
    let router = http::build_router(
        AppState {
            store,
            scheduler: scheduler.clone(),
        },
        &settings.allowed_origins,
    );

    let bind = bind.unwrap_or(&settings.bind);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(bind, "HTTP API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Could not install Ctrl-C handler; running until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
