//! Command-line interface definitions for Topic Tracker.
//!
//! This module defines the CLI arguments and subcommands using the `clap` crate.
//! Global options can also be provided via environment variables.

use crate::models::SiteKind;
use clap::{Parser, Subcommand};

/// Command-line arguments for the Topic Tracker application.
///
/// # Examples
///
/// ```sh
/// # Run the API server with the hourly scanner and weekly purge
/// topic_tracker serve --bind 127.0.0.1:5000
///
/// # One-off scan of every registered site
/// topic_tracker --database ./topics.db scan
///
/// # Register a competitor and link it to one of our sites
/// topic_tracker add-site --name "El Mundo" --url https://www.elmundo.es/ --kind competitor
/// topic_tracker link --parent "La Nueva España" --competitor "El Mundo"
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML settings file
    #[arg(short, long, env = "TOPIC_TRACKER_CONFIG")]
    pub config: Option<String>,

    /// SQLite database path (overrides the settings file)
    #[arg(short, long, env = "TOPIC_TRACKER_DB")]
    pub database: Option<String>,

    /// Scan immediately when serving instead of waiting one interval
    #[arg(long)]
    pub scan_on_start: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Serve the HTTP API and run the scan/purge schedule
    Serve {
        /// Listen address (overrides the settings file)
        #[arg(short, long, env = "TOPIC_TRACKER_BIND")]
        bind: Option<String>,
    },
    /// Scan once and print the summary as JSON
    Scan {
        /// Only scan the competitors linked to this site (by name)
        #[arg(long)]
        competitors_of: Option<String>,
    },
    /// Delete topics not seen within the retention window
    Purge {
        /// Retention window in days (defaults to the settings value)
        #[arg(long)]
        days: Option<u32>,
    },
    /// Register the starter list of group sites
    Seed,
    /// Register a site
    AddSite {
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
        /// own | competitor
        #[arg(long, value_parser = parse_kind)]
        kind: SiteKind,
        /// Explicit CSS selector for the topic bar
        #[arg(long)]
        selector: Option<String>,
    },
    /// Track `competitor` as a competitor of `parent` (both by name)
    Link {
        #[arg(long)]
        parent: String,
        #[arg(long)]
        competitor: String,
    },
    /// List registered sites as JSON
    Sites,
    /// List tracked topics as JSON
    Topics {
        #[arg(long, value_parser = parse_kind)]
        kind: Option<SiteKind>,
        #[arg(long)]
        site_id: Option<i64>,
        /// Substring of the site's host
        #[arg(long)]
        domain: Option<String>,
        #[arg(long, default_value_t = 100)]
        limit: u32,
    },
}

fn parse_kind(s: &str) -> Result<SiteKind, String> {
    s.parse()
}
