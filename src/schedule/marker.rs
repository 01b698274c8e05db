//! Execution marker: persisted mapping from calendar date to the last hour
//! that fired on that date.
//!
//! The marker makes the hourly gate idempotent across process restarts. It
//! is read before the gate decision and written only after a run (batch,
//! retries, report) completes, so a crash mid-run never falsely marks the
//! hour as done.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use tracing::{debug, warn};

/// Default marker file name, kept in the working directory.
pub const MARKER_FILE: &str = "last_run.json";

/// Entries older than this many days are pruned on save.
const RETENTION_DAYS: i64 = 7;

/// Marker persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum MarkerError {
    #[error("failed to write marker file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize marker: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Persisted record of which (date, hour) pairs have already fired.
#[derive(Debug, Clone, Default)]
pub struct RunMarker {
    entries: BTreeMap<String, u32>,
    /// Old-format marker: a bare date string meaning "this date already ran".
    legacy_date: Option<String>,
}

impl RunMarker {
    /// Load the marker from disk.
    ///
    /// A missing, unreadable or corrupt file yields an empty marker: the
    /// gate fails open so a broken file cannot silently drop a whole day.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                debug!("No marker file at {:?}: {}", path, e);
                return Self::default();
            }
        };

        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Self::default();
        }

        match serde_json::from_str::<BTreeMap<String, u32>>(trimmed) {
            Ok(entries) => Self { entries, legacy_date: None },
            Err(_) if looks_like_date(trimmed) => {
                debug!("Marker file {:?} uses the legacy date-only format", path);
                Self {
                    entries: BTreeMap::new(),
                    legacy_date: Some(trimmed.to_string()),
                }
            }
            Err(e) => {
                warn!("Marker file {:?} is corrupt, treating as empty: {}", path, e);
                Self::default()
            }
        }
    }

    /// Whether a run has already fired for this (date, hour) pair.
    pub fn has_fired(&self, date: &str, hour: u32) -> bool {
        if self.legacy_date.as_deref() == Some(date) {
            return true;
        }
        self.entries.get(date) == Some(&hour)
    }

    /// Record a completed run for this (date, hour) pair.
    pub fn record(&mut self, date: &str, hour: u32) {
        self.entries.insert(date.to_string(), hour);
        // A fresh record supersedes the legacy whole-day marker.
        if self.legacy_date.as_deref() == Some(date) {
            self.legacy_date = None;
        }
    }

    /// Drop entries older than the retention window so the file does not
    /// grow without bound. Behavior for the current day is unchanged.
    pub fn prune(&mut self, today: NaiveDate) {
        self.entries.retain(|date, _| {
            NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map(|d| (today - d).num_days() <= RETENTION_DAYS)
                .unwrap_or(false)
        });
    }

    /// Persist the marker, overwriting the previous file.
    pub fn save(&self, path: &Path) -> Result<(), MarkerError> {
        let content = serde_json::to_string(&self.entries)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Number of recorded (date, hour) entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.legacy_date.is_none()
    }
}

/// Loose check for the legacy `YYYY-MM-DD` payload.
fn looks_like_date(content: &str) -> bool {
    content.len() == 10
        && content.chars().enumerate().all(|(i, c)| match i {
            4 | 7 => c == '-',
            _ => c.is_ascii_digit(),
        })
}
