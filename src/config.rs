//! Runtime settings.
//!
//! Settings come from an optional YAML file; every field has a default so an
//! empty (or missing) file is valid. Command-line flags are applied on top in
//! `main` via [`Settings::apply_cli`].
//!
//! ```yaml
//! database_path: /var/data/topic_tracker.db
//! bind: 0.0.0.0:5000
//! scan_interval_secs: 3600
//! purge_interval_secs: 604800
//! retention_days: 7
//! batch_size: 5
//! site_pause_ms: 2000
//! batch_pause_ms: 10000
//! allowed_origins: []   # empty = any origin (browser extension)
//! ```

use crate::cli::Cli;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SQLite database file.
    pub database_path: String,
    /// Address the HTTP API listens on.
    pub bind: String,
    pub scan_interval_secs: u64,
    pub purge_interval_secs: u64,
    /// Topics not seen for this many days are purged.
    pub retention_days: u32,
    /// Sites scanned per batch before the longer pause.
    pub batch_size: usize,
    pub site_pause_ms: u64,
    pub batch_pause_ms: u64,
    /// Upper bound of random jitter added to each per-site pause.
    pub pause_jitter_ms: u64,
    pub fetch_timeout_secs: u64,
    pub fetch_retries: usize,
    pub user_agent: String,
    /// Run a scan right after startup instead of waiting a full interval.
    pub scan_on_start: bool,
    /// Origins allowed to call the API from a browser. Empty allows any.
    pub allowed_origins: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: "topic_tracker.db".to_string(),
            bind: "0.0.0.0:5000".to_string(),
            scan_interval_secs: 60 * 60,
            purge_interval_secs: 7 * 24 * 60 * 60,
            retention_days: 7,
            batch_size: 5,
            site_pause_ms: 2_000,
            batch_pause_ms: 10_000,
            pause_jitter_ms: 250,
            fetch_timeout_secs: 15,
            fetch_retries: 1,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            scan_on_start: false,
            allowed_origins: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings from a YAML file, or defaults when no path is given.
    #[instrument(level = "info")]
    pub fn load(path: Option<&str>) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(Path::new(path))?;
        let settings = Self::from_yaml(&raw)?;
        info!(path, "Loaded settings file");
        Ok(settings)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    /// Command-line flags win over the file.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(db) = &cli.database {
            self.database_path = db.clone();
        }
        if cli.scan_on_start {
            self.scan_on_start = true;
        }
        self.batch_size = self.batch_size.max(1);
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs.max(1))
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs.max(1))
    }

    pub fn site_pause(&self) -> Duration {
        Duration::from_millis(self.site_pause_ms)
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.batch_size, 5);
        assert_eq!(s.retention_days, 7);
        assert_eq!(s.scan_interval(), Duration::from_secs(3600));
        assert_eq!(s.purge_interval(), Duration::from_secs(604_800));
        assert_eq!(s.fetch_timeout_secs, 15);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let s = Settings::from_yaml("batch_size: 10\nsite_pause_ms: 0\n").unwrap();
        assert_eq!(s.batch_size, 10);
        assert_eq!(s.site_pause_ms, 0);
        assert_eq!(s.retention_days, 7);
        assert_eq!(s.bind, "0.0.0.0:5000");
        assert!(s.allowed_origins.is_empty());
    }

    #[test]
    fn test_allowed_origins_from_yaml() {
        let s = Settings::from_yaml("allowed_origins:\n  - https://www.lne.es\n").unwrap();
        assert_eq!(s.allowed_origins, vec!["https://www.lne.es".to_string()]);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(Settings::from_yaml("  \n").unwrap(), Settings::default());
    }

    #[test]
    fn test_bad_yaml_is_error() {
        assert!(Settings::from_yaml("batch_size: [oops").is_err());
    }

    #[test]
    fn test_load_without_path() {
        assert_eq!(Settings::load(None).unwrap(), Settings::default());
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut s = Settings::from_yaml("database_path: from_file.db\nbatch_size: 0\n").unwrap();
        let cli = Cli::parse_from(["topic_tracker", "--database", "from_cli.db", "sites"]);
        s.apply_cli(&cli);
        assert_eq!(s.database_path, "from_cli.db");
        assert_eq!(s.batch_size, 1);
    }
}
