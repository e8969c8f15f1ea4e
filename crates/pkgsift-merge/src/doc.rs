//! Document records and delta actions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One package document as stored in the baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocInfo {
    /// Natural id, e.g. `github.com/acme/widgets`. Partition key.
    pub package: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub synopsis: String,
    #[serde(default)]
    pub description: String,
    /// Cache validator from the last fetch.
    #[serde(default)]
    pub etag: String,
    #[serde(default)]
    pub imports: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

impl DocInfo {
    /// Minimal document carrying only the id and timestamp.
    pub fn new(package: impl Into<String>, last_updated: DateTime<Utc>) -> Self {
        Self {
            package: package.into(),
            name: String::new(),
            synopsis: String::new(),
            description: String::new(),
            etag: String::new(),
            imports: Vec::new(),
            last_updated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Record read from the current baseline.
    Original,
    /// Fresh crawl result.
    Update,
    /// Tombstone: drop the package whatever else arrives.
    Del,
}

/// Wire shape of a delta line: `{"action": ..., "doc": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDocAction {
    pub action: Action,
    pub doc: DocInfo,
}

impl NewDocAction {
    pub fn original(doc: DocInfo) -> Self {
        Self {
            action: Action::Original,
            doc,
        }
    }

    pub fn update(doc: DocInfo) -> Self {
        Self {
            action: Action::Update,
            doc,
        }
    }

    pub fn del(package: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            action: Action::Del,
            doc: DocInfo::new(package, at),
        }
    }

    pub fn package(&self) -> &str {
        &self.doc.package
    }
}
