//! Site registry and competitor links.
//!
//! Duplicate names and duplicate links are rejected with
//! [`StoreError::Conflict`]; callers decide whether that is an error (the
//! registration endpoint) or just "already exists" (seeding).

use super::{Store, StoreError, is_constraint_violation};
use crate::models::{NewSite, Site, SiteKind, SiteStats};
use crate::utils::{is_same_or_subdomain, normalize_host};
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, params};
use tracing::{info, instrument};

const SITE_COLUMNS: &str = "id, nombre, url, tipo, selector";

fn site_from_row(row: &Row<'_>) -> rusqlite::Result<Site> {
    let tipo: String = row.get(3)?;
    let kind = SiteKind::from_db(&tipo).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(3, Type::Text, format!("unknown tipo '{tipo}'").into())
    })?;
    Ok(Site {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        kind,
        selector: row.get(4)?,
    })
}

impl Store {
    /// Register a site.
    ///
    /// # Arguments
    ///
    /// * `site` - Name, homepage URL, kind and optional selector. Name, URL and
    ///   selector are trimmed; a blank selector is stored as `NULL`.
    ///
    /// # Returns
    ///
    /// The stored site with its new id. Fails with `Invalid` when the name or
    /// URL is blank and with `Conflict` when the name is taken.
    #[instrument(level = "info", skip_all, fields(name = %site.name))]
    pub fn add_site(&self, site: &NewSite) -> Result<Site, StoreError> {
        let name = site.name.trim();
        let url = site.url.trim();
        if name.is_empty() || url.is_empty() {
            return Err(StoreError::Invalid("site name and url are required".to_string()));
        }
        let selector = site
            .selector
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let conn = self.conn()?;
        match conn.execute(
            "INSERT INTO medios (nombre, url, tipo, selector) VALUES (?1, ?2, ?3, ?4)",
            params![name, url, site.kind.as_db(), selector],
        ) {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                return Err(StoreError::Conflict(format!("site '{name}'")));
            }
            Err(e) => return Err(e.into()),
        }
        let id = conn.last_insert_rowid();
        info!(id, kind = %site.kind, "Registered site");
        Ok(Site {
            id,
            name: name.to_string(),
            url: url.to_string(),
            kind: site.kind,
            selector: selector.map(str::to_string),
        })
    }

    /// Every registered site, in registration order.
    pub fn list_sites(&self) -> Result<Vec<Site>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {SITE_COLUMNS} FROM medios ORDER BY id"))?;
        let sites = stmt
            .query_map([], site_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sites)
    }

    /// Look a site up by id. `Ok(None)` when it does not exist.
    pub fn get_site(&self, id: i64) -> Result<Option<Site>, StoreError> {
        let conn = self.conn()?;
        let site = conn
            .query_row(
                &format!("SELECT {SITE_COLUMNS} FROM medios WHERE id = ?1"),
                [id],
                site_from_row,
            )
            .optional()?;
        Ok(site)
    }

    /// Look a site up by its exact (trimmed) display name.
    pub fn find_site_by_name(&self, name: &str) -> Result<Option<Site>, StoreError> {
        let conn = self.conn()?;
        let site = conn
            .query_row(
                &format!("SELECT {SITE_COLUMNS} FROM medios WHERE nombre = ?1"),
                [name.trim()],
                site_from_row,
            )
            .optional()?;
        Ok(site)
    }

    /// Record that `parent_id` tracks `competitor_id` as a competitor.
    #[instrument(level = "info", skip(self))]
    pub fn link_competitor(&self, parent_id: i64, competitor_id: i64) -> Result<(), StoreError> {
        if parent_id == competitor_id {
            return Err(StoreError::Invalid("a site cannot be its own competitor".to_string()));
        }
        for id in [parent_id, competitor_id] {
            if self.get_site(id)?.is_none() {
                return Err(StoreError::NotFound(format!("site {id}")));
            }
        }
        let conn = self.conn()?;
        match conn.execute(
            "INSERT INTO competidores (medio_padre_id, medio_competidor_id) VALUES (?1, ?2)",
            params![parent_id, competitor_id],
        ) {
            Ok(_) => {
                info!("Linked competitor");
                Ok(())
            }
            Err(e) if is_constraint_violation(&e) => Err(StoreError::Conflict(format!(
                "competitor link {parent_id} -> {competitor_id}"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Sites linked as competitors of `parent_id`, in registration order.
    pub fn competitors_of(&self, parent_id: i64) -> Result<Vec<Site>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT m.id, m.nombre, m.url, m.tipo, m.selector
             FROM competidores c
             JOIN medios m ON c.medio_competidor_id = m.id
             WHERE c.medio_padre_id = ?1
             ORDER BY m.id",
        )?;
        let sites = stmt
            .query_map([parent_id], site_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sites)
    }

    /// The own site serving `domain` (e.g. the page a browser extension is
    /// currently showing).
    ///
    /// # Arguments
    ///
    /// * `domain` - A bare host or full URL. It matches a site whose normalized
    ///   host equals it or is a parent domain of it on a label boundary, so
    ///   `m.lne.es` finds `lne.es` but `notlne.es` does not.
    ///
    /// # Returns
    ///
    /// The first matching own site in registration order, or `None`.
    pub fn own_site_for_domain(&self, domain: &str) -> Result<Option<Site>, StoreError> {
        let domain = normalize_host(domain);
        if domain.is_empty() {
            return Ok(None);
        }
        let site = self.list_sites()?.into_iter().find(|s| {
            let host = normalize_host(&s.url);
            s.kind == SiteKind::Own && !host.is_empty() && is_same_or_subdomain(&domain, &host)
        });
        Ok(site)
    }

    /// Site counts, total and per kind.
    pub fn site_stats(&self) -> Result<SiteStats, StoreError> {
        let conn = self.conn()?;
        let (total, own, competitor): (i64, i64, i64) = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(tipo = 'propio'), 0),
                    COALESCE(SUM(tipo = 'competencia'), 0)
             FROM medios",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(SiteStats {
            total: total as usize,
            own: own as usize,
            competitor: competitor as usize,
        })
    }
}
