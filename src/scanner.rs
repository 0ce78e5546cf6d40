//! Scan orchestration across the site registry.
//!
//! A scan walks a list of sites in fixed-size batches. For each site it
//! resets topic visibility, fetches the homepage, extracts topics and upserts
//! every pair into the ledger. A short pause follows each site and a longer one
//! each batch, bounding the request rate against the whole target set.
//!
//! Failure isolation: a site that times out, returns an error status or yields
//! nothing is logged and skipped. Only store failures abort a scan, since
//! continuing without a working store would just repeat the same error.
//!
//! A [`Scanner`] is meant to be shared behind an `Arc`. Overlapping scans
//! (scheduled + manual) are safe: the only writes are idempotent upserts.

use crate::config::Settings;
use crate::extract;
use crate::fetch::PageFetcher;
use crate::models::{ScanSummary, Site};
use crate::store::{Store, StoreError};
use chrono::Utc;
use rand::{Rng, rng};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// Batching and throttling knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOptions {
    pub batch_size: usize,
    pub site_pause: Duration,
    pub batch_pause: Duration,
    pub pause_jitter_ms: u64,
}

impl ScanOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            batch_size: settings.batch_size.max(1),
            site_pause: settings.site_pause(),
            batch_pause: settings.batch_pause(),
            pause_jitter_ms: settings.pause_jitter_ms,
        }
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

pub struct Scanner<F> {
    store: Arc<Store>,
    fetcher: F,
    options: ScanOptions,
}

impl<F> Scanner<F>
where
    F: PageFetcher,
{
    pub fn new(store: Arc<Store>, fetcher: F, options: ScanOptions) -> Self {
        Self {
            store,
            fetcher,
            options,
        }
    }

    /// Scan every registered site.
    #[instrument(level = "info", skip_all)]
    pub async fn scan_all(&self) -> Result<ScanSummary, StoreError> {
        let sites = self.store.list_sites()?;
        self.scan_sites(sites).await
    }

    /// Scan only the sites linked as competitors of `site_id`.
    #[instrument(level = "info", skip(self))]
    pub async fn scan_competitors_of(&self, site_id: i64) -> Result<ScanSummary, StoreError> {
        if self.store.get_site(site_id)?.is_none() {
            return Err(StoreError::NotFound(format!("site {site_id}")));
        }
        let sites = self.store.competitors_of(site_id)?;
        self.scan_sites(sites).await
    }

    /// Scan the competitors of the own site serving `domain` (or a parent of it).
    /// Scans nothing when no own site matches.
    #[instrument(level = "info", skip(self))]
    pub async fn scan_competitors_for_domain(&self, domain: &str) -> Result<ScanSummary, StoreError> {
        match self.store.own_site_for_domain(domain)? {
            Some(site) => {
                info!(site = %site.name, "Resolved own site for domain");
                let sites = self.store.competitors_of(site.id)?;
                self.scan_sites(sites).await
            }
            None => {
                warn!("No own site matches domain; nothing to scan");
                self.scan_sites(Vec::new()).await
            }
        }
    }

    /// Scan the given sites in order, in batches.
    pub async fn scan_sites(&self, sites: Vec<Site>) -> Result<ScanSummary, StoreError> {
        let started_at = Utc::now();
        let t0 = Instant::now();
        let total = sites.len();
        let batch_size = self.options.batch_size.max(1);
        let batch_count = total.div_ceil(batch_size);

        info!(sites = total, batch_size, batches = batch_count, "Scan starting");

        let mut summary = ScanSummary {
            sites_processed: 0,
            batches: 0,
            sites_empty: 0,
            topics_found: 0,
            started_at,
            finished_at: started_at,
        };

        for (batch_idx, batch) in sites.chunks(batch_size).enumerate() {
            debug!(batch = batch_idx + 1, of = batch_count, "Scanning batch");
            summary.batches += 1;
            for site in batch {
                let found = self.scan_site(site).await?;
                summary.sites_processed += 1;
                if found == 0 {
                    summary.sites_empty += 1;
                    warn!(
                        progress = format!("{}/{}", summary.sites_processed, total),
                        site = %site.name,
                        "No topics found"
                    );
                } else {
                    summary.topics_found += found;
                    info!(
                        progress = format!("{}/{}", summary.sites_processed, total),
                        site = %site.name,
                        count = found,
                        "Topics recorded"
                    );
                }
                self.pause(self.options.site_pause, self.options.pause_jitter_ms).await;
            }
            if batch_idx + 1 < batch_count {
                self.pause(self.options.batch_pause, 0).await;
            }
        }

        summary.finished_at = Utc::now();
        info!(
            sites_processed = summary.sites_processed,
            batches = summary.batches,
            sites_empty = summary.sites_empty,
            topics_found = summary.topics_found,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Scan complete"
        );
        Ok(summary)
    }

    /// Reset, fetch, extract and upsert one site. Returns the number of topics
    /// recorded; fetch problems count as zero.
    #[instrument(level = "info", skip_all, fields(site = %site.name, url = %site.url))]
    async fn scan_site(&self, site: &Site) -> Result<usize, StoreError> {
        self.store.reset_visibility(site.id)?;

        let html = match self.fetcher.fetch(&site.url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(error = %e, "Fetch failed; treating as empty");
                return Ok(0);
            }
        };

        let topics = extract::topics_for_site(&html, site);
        let now = Utc::now();
        for topic in &topics {
            self.store.upsert_topic(site.id, &topic.name, &topic.url, now)?;
        }
        Ok(topics.len())
    }

    async fn pause(&self, base: Duration, jitter_ms: u64) {
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rng().random_range(0..=jitter_ms))
        } else {
            Duration::ZERO
        };
        let delay = base + jitter;
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }
}
