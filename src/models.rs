//! Data models for monitored sites, observed topics and scan reports.
//!
//! - [`Site`]: a monitored homepage, either one of our own or a competitor
//! - [`Topic`]: one featured-topic entry as stored in the ledger
//! - [`TopicView`]: a topic joined with its site and a freshness computed at read time
//! - [`ScanSummary`], [`RegisterSummary`], [`Stats`]: report objects returned to callers
//!
//! Site kinds are persisted with their historical Spanish labels
//! (`propio`, `competencia`) but serialize over the API as `own` / `competitor`.

use crate::freshness::Freshness;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether a site belongs to our own group or is tracked as a competitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteKind {
    Own,
    Competitor,
}

impl SiteKind {
    /// Label stored in the `medios.tipo` column.
    pub fn as_db(&self) -> &'static str {
        match self {
            SiteKind::Own => "propio",
            SiteKind::Competitor => "competencia",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "propio" => Some(SiteKind::Own),
            "competencia" => Some(SiteKind::Competitor),
            _ => None,
        }
    }
}

impl FromStr for SiteKind {
    type Err = String;

    /// Accepts both the API spelling and the stored label.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "own" | "propio" => Ok(SiteKind::Own),
            "competitor" | "competencia" => Ok(SiteKind::Competitor),
            other => Err(format!("unknown site kind '{other}' (expected own or competitor)")),
        }
    }
}

impl fmt::Display for SiteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiteKind::Own => write!(f, "own"),
            SiteKind::Competitor => write!(f, "competitor"),
        }
    }
}

/// A monitored news homepage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub kind: SiteKind,
    /// Explicit extraction rule; overrides every resolver default when set.
    pub selector: Option<String>,
}

/// Registration payload for a new site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSite {
    pub name: String,
    pub url: String,
    pub kind: SiteKind,
    #[serde(default)]
    pub selector: Option<String>,
}

impl NewSite {
    pub fn new(name: &str, url: &str, kind: SiteKind) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            kind,
            selector: None,
        }
    }

    pub fn with_selector(mut self, selector: &str) -> Self {
        self.selector = Some(selector.to_string());
        self
    }
}

/// A `(name, absolute url)` pair pulled out of a homepage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtractedTopic {
    pub name: String,
    pub url: String,
}

/// A topic row as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Topic {
    pub id: i64,
    pub site_id: i64,
    pub name: String,
    pub url: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub visible: bool,
}

/// A topic joined with its owning site, as surfaced by read paths.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicView {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub visible: bool,
    pub site_id: i64,
    pub site_name: String,
    pub site_url: String,
    pub site_kind: SiteKind,
    pub hours_live: f64,
    pub freshness: Freshness,
    pub color: &'static str,
}

/// Filters accepted by topic listings. Everything is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopicFilter {
    pub kind: Option<SiteKind>,
    pub site_id: Option<i64>,
    /// Substring matched against the site's normalized host.
    pub domain: Option<String>,
    pub visible: Option<bool>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Aggregate result of one pass of the scan orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanSummary {
    pub sites_processed: usize,
    pub batches: usize,
    pub sites_empty: usize,
    pub topics_found: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Outcome of seeding or bulk registration; conflicts count as `existing`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegisterSummary {
    pub added: usize,
    pub existing: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SiteStats {
    pub total: usize,
    pub own: usize,
    pub competitor: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub sites: SiteStats,
    pub topics: usize,
}
