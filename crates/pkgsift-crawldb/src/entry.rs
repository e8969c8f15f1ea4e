//! Per-identifier crawl state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// When an identifier is next due, under which policy version it was
/// scheduled, and the validator for a conditional fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlingEntry {
    pub schedule_time: DateTime<Utc>,
    pub version: u32,
    /// Empty means "fetch unconditionally".
    #[serde(default)]
    pub etag: String,
}

impl CrawlingEntry {
    pub fn due_at(schedule_time: DateTime<Utc>, version: u32) -> Self {
        Self {
            schedule_time,
            version,
            etag: String::new(),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.schedule_time <= now
    }
}
