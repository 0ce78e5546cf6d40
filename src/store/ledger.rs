//! The topic ledger: per-site visibility reset, observation upsert, retention
//! purge, and the read queries built on top of them.
//!
//! Every scan of a site goes `reset_visibility` → fetch → `upsert` for each
//! extracted pair, so after a scan `visible = true` means "on the homepage
//! right now" and `visible = false` means "seen recently, rotated off".
//!
//! The upsert is a single `INSERT … ON CONFLICT DO UPDATE` statement keyed on
//! `(medio_id, nombre, url)`. It is idempotent, never moves `ultima_vez`
//! backwards, and cannot create duplicates under overlapping scans.

use super::{Store, StoreError, from_db_time, to_db_time};
use crate::freshness::{Freshness, hours_live};
use crate::models::{SiteKind, Stats, Topic, TopicFilter, TopicView};
use crate::utils::normalize_host;
use chrono::{DateTime, Duration, Utc};
use rusqlite::params;
use tracing::{debug, info, instrument, warn};

/// Default page size for topic listings.
pub const DEFAULT_LIMIT: u32 = 100;
pub const MAX_LIMIT: u32 = 1000;

impl Store {
    /// Mark every topic of `site_id` as not currently visible.
    #[instrument(level = "debug", skip(self))]
    pub fn reset_visibility(&self, site_id: i64) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let n = conn.execute("UPDATE temas SET visible = 0 WHERE medio_id = ?1", [site_id])?;
        debug!(rows = n, "Reset topic visibility");
        Ok(n)
    }

    /// Record an observation at `now`: bump `ultima_vez` and set visible for a
    /// known triple, or insert it with `primera_vez = ultima_vez = now`.
    pub fn upsert_topic(
        &self,
        site_id: i64,
        name: &str,
        url: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO temas (medio_id, nombre, url, primera_vez, ultima_vez, visible)
             VALUES (?1, ?2, ?3, ?4, ?4, 1)
             ON CONFLICT (medio_id, nombre, url) DO UPDATE SET
                 ultima_vez = MAX(temas.ultima_vez, excluded.ultima_vez),
                 visible = 1",
            params![site_id, name, url, to_db_time(now)],
        )?;
        Ok(())
    }

    /// Delete topics not seen within the last `retention_days`.
    pub fn purge_topics(&self, retention_days: u32) -> Result<usize, StoreError> {
        self.purge_before(Utc::now() - Duration::days(i64::from(retention_days)))
    }

    /// Delete every topic whose `ultima_vez` is older than `cutoff`.
    #[instrument(level = "info", skip(self))]
    pub fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM temas WHERE ultima_vez < ?1", [to_db_time(cutoff)])?;
        info!(deleted = n, "Purged stale topics");
        Ok(n)
    }

    /// Raw ledger rows for one site, oldest first.
    pub fn topics_for_site(&self, site_id: i64) -> Result<Vec<Topic>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, medio_id, nombre, url, primera_vez, ultima_vez, visible
             FROM temas WHERE medio_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map([site_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, bool>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, site_id, name, url, first, last, visible)| {
                let (Some(first_seen), Some(last_seen)) = (from_db_time(&first), from_db_time(&last))
                else {
                    warn!(id, %first, %last, "Skipping topic with malformed timestamps");
                    return None;
                };
                Some(Topic { id, site_id, name, url, first_seen, last_seen, visible })
            })
            .collect())
    }

    /// Topics joined with their sites, most recently seen first, with
    /// freshness computed against `now`.
    ///
    /// # Arguments
    ///
    /// * `filter` - Optional kind, site id, host substring and visibility
    ///   filters. `limit` defaults to [`DEFAULT_LIMIT`] and is capped at
    ///   [`MAX_LIMIT`].
    /// * `now` - Reference instant for `hours_live` and freshness.
    ///
    /// Rows with unreadable timestamps are logged and skipped.
    #[instrument(level = "debug", skip(self))]
    pub fn list_topics(&self, filter: &TopicFilter, now: DateTime<Utc>) -> Result<Vec<TopicView>, StoreError> {
        let limit = filter.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT) as usize;
        let offset = filter.offset.unwrap_or(0) as usize;
        let domain = filter
            .domain
            .as_deref()
            .map(normalize_host)
            .filter(|d| !d.is_empty());

        // The domain filter runs on normalized hosts in Rust, so paging has to
        // happen after it in that case.
        let (sql_limit, sql_offset): (i64, i64) = match domain {
            Some(_) => (-1, 0),
            None => (limit as i64, offset as i64),
        };

        let rows = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "SELECT t.id, t.nombre, t.url, t.primera_vez, t.ultima_vez, t.visible,
                        m.id, m.nombre, m.url, m.tipo
                 FROM temas t
                 JOIN medios m ON t.medio_id = m.id
                 WHERE (?1 IS NULL OR m.tipo = ?1)
                   AND (?2 IS NULL OR m.id = ?2)
                   AND (?3 IS NULL OR t.visible = ?3)
                 ORDER BY t.ultima_vez DESC, t.id DESC
                 LIMIT ?4 OFFSET ?5",
            )?;
            let rows = stmt.query_map(
                params![
                    filter.kind.map(|k| k.as_db()),
                    filter.site_id,
                    filter.visible,
                    sql_limit,
                    sql_offset
                ],
                |row| {
                    Ok(TopicRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        url: row.get(2)?,
                        first_seen: row.get(3)?,
                        last_seen: row.get(4)?,
                        visible: row.get(5)?,
                        site_id: row.get(6)?,
                        site_name: row.get(7)?,
                        site_url: row.get(8)?,
                        site_kind: row.get(9)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let views = rows
            .into_iter()
            .filter(|row| match &domain {
                Some(d) => normalize_host(&row.site_url).contains(d.as_str()),
                None => true,
            })
            .filter_map(|row| row.into_view(now));

        Ok(match domain {
            Some(_) => views.skip(offset).take(limit).collect(),
            None => views.collect(),
        })
    }

    /// Number of rows in the ledger, visible or not.
    pub fn topic_count(&self) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM temas", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Aggregate counts for the dashboard and `/api/stats`.
    ///
    /// # Returns
    ///
    /// Sites broken down by kind, plus the total number of tracked topics.
    pub fn stats(&self) -> Result<Stats, StoreError> {
        Ok(Stats {
            sites: self.site_stats()?,
            topics: self.topic_count()?,
        })
    }
}

struct TopicRow {
    id: i64,
    name: String,
    url: String,
    first_seen: String,
    last_seen: String,
    visible: bool,
    site_id: i64,
    site_name: String,
    site_url: String,
    site_kind: String,
}

impl TopicRow {
    /// Best effort: rows with unreadable timestamps or kinds are logged and skipped.
    fn into_view(self, now: DateTime<Utc>) -> Option<TopicView> {
        let (Some(first_seen), Some(last_seen), Some(site_kind)) = (
            from_db_time(&self.first_seen),
            from_db_time(&self.last_seen),
            SiteKind::from_db(&self.site_kind),
        ) else {
            warn!(
                id = self.id,
                first_seen = %self.first_seen,
                last_seen = %self.last_seen,
                kind = %self.site_kind,
                "Skipping malformed topic row"
            );
            return None;
        };
        let freshness = Freshness::since(first_seen, now);
        Some(TopicView {
            id: self.id,
            name: self.name,
            url: self.url,
            first_seen,
            last_seen,
            visible: self.visible,
            site_id: self.site_id,
            site_name: self.site_name,
            site_url: self.site_url,
            site_kind,
            hours_live: hours_live(first_seen, now),
            freshness,
            color: freshness.color(),
        })
    }
}
