//! Freshness classification for tracked topics.
//!
//! A topic's freshness is derived from how long ago it was first observed.
//! It is always computed at read time and never persisted, since it depends
//! on "now".
//!
//! | Elapsed since first seen | State   | Colour    |
//! |--------------------------|---------|-----------|
//! | `< 4h`                   | `fresh` | `#4caf50` |
//! | `[4h, 24h)`              | `aging` | `#ffc107` |
//! | `>= 24h`                 | `stale` | `#f44336` |

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

const AGING_AFTER_HOURS: i64 = 4;
const STALE_AFTER_HOURS: i64 = 24;

/// How long a topic has been live on a homepage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Fresh,
    Aging,
    Stale,
}

impl Freshness {
    /// Classify an elapsed duration. Negative durations (clock skew between
    /// writer and reader) count as fresh.
    pub fn classify(elapsed: Duration) -> Self {
        if elapsed < Duration::hours(AGING_AFTER_HOURS) {
            Freshness::Fresh
        } else if elapsed < Duration::hours(STALE_AFTER_HOURS) {
            Freshness::Aging
        } else {
            Freshness::Stale
        }
    }

    pub fn since(first_seen: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self::classify(now - first_seen)
    }

    /// Display colour used by dashboards and the browser extension badge.
    pub fn color(&self) -> &'static str {
        match self {
            Freshness::Fresh => "#4caf50",
            Freshness::Aging => "#ffc107",
            Freshness::Stale => "#f44336",
        }
    }
}

/// Hours between two instants, rounded to one decimal place.
pub fn hours_live(first_seen: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let hours = (now - first_seen).num_seconds() as f64 / 3600.0;
    (hours * 10.0).round() / 10.0
}
