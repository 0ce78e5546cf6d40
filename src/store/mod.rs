//! SQLite-backed persistent store for sites, competitor links and topics.
//!
//! The store is the only shared mutable resource in the process. It wraps a
//! single [`rusqlite::Connection`] behind a mutex; every operation takes the
//! lock for one short statement (or transaction) and never across an `.await`.
//!
//! # Schema
//!
//! Table and column names keep the labels the existing databases use:
//!
//! ```text
//! medios(id, nombre UNIQUE, url, tipo ∈ {propio, competencia}, selector NULL)
//! temas(id, medio_id → medios, nombre, url, primera_vez, ultima_vez, visible,
//!       UNIQUE(medio_id, nombre, url))
//! competidores(medio_padre_id → medios, medio_competidor_id → medios,
//!              PRIMARY KEY(medio_padre_id, medio_competidor_id))
//! ```
//!
//! The `(medio_id, nombre, url)` constraint is what makes concurrent scans
//! safe: two overlapping upserts of the same triple resolve to one row.
//!
//! Timestamps are fixed-width RFC 3339 UTC text (`2025-01-01T12:00:00.000000Z`),
//! so string order is chronological order.

pub mod ledger;
pub mod sites;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, ErrorCode};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{info, instrument};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS medios (
    id       INTEGER PRIMARY KEY,
    nombre   TEXT NOT NULL UNIQUE,
    url      TEXT NOT NULL,
    tipo     TEXT NOT NULL CHECK (tipo IN ('propio', 'competencia')),
    selector TEXT
);

CREATE TABLE IF NOT EXISTS temas (
    id          INTEGER PRIMARY KEY,
    medio_id    INTEGER NOT NULL REFERENCES medios(id),
    nombre      TEXT NOT NULL,
    url         TEXT NOT NULL,
    primera_vez TEXT NOT NULL,
    ultima_vez  TEXT NOT NULL,
    visible     INTEGER NOT NULL DEFAULT 1,
    UNIQUE (medio_id, nombre, url)
);

CREATE INDEX IF NOT EXISTS idx_temas_ultima_vez ON temas(ultima_vez);
CREATE INDEX IF NOT EXISTS idx_temas_medio ON temas(medio_id);

CREATE TABLE IF NOT EXISTS competidores (
    medio_padre_id      INTEGER NOT NULL REFERENCES medios(id),
    medio_competidor_id INTEGER NOT NULL REFERENCES medios(id),
    PRIMARY KEY (medio_padre_id, medio_competidor_id)
);
"#;

/// Errors specific to store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("already exists: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("store lock poisoned")]
    Poisoned,
}

#[derive(Debug)]
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if needed) the database file and ensure the schema exists.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        let store = Self::init(conn)?;
        info!("Opened topic store");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

/// Canonical text form for stored timestamps.
pub fn to_db_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn from_db_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}
