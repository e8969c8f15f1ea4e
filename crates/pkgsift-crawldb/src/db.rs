//! The crawler database: package and person schedules
//!
//! ```text
//! {root}/crawler/
//! ├── package.json    # package path → CrawlingEntry
//! └── person.json     # site:username → CrawlingEntry
//! ```

use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use pkgsift_core::WorkSignal;
use pkgsift_store::MemDb;
use rand::Rng;

use crate::entry::CrawlingEntry;
use crate::ident::{RemotePathCheck, person_id, trim_package_name};
use crate::policy::SchedulePolicy;

const PACKAGE_FILE: &str = "package.json";
const PERSON_FILE: &str = "person.json";

/// Result of [`CrawlerDb::append_package`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Empty after trimming, or rejected by the path check.
    Invalid,
    /// Not tracked yet, but the baseline already has a document for it.
    SkippedInDocs,
    /// Scheduled in the future and documented; left alone.
    Unchanged,
    /// Already tracked; made due now.
    Rescheduled(String),
    /// First sighting; due now.
    Scheduled(String),
}

impl AppendOutcome {
    /// The stored id, for outcomes that wrote an entry.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Rescheduled(id) | Self::Scheduled(id) => Some(id),
            _ => None,
        }
    }
}

/// Totals for `pkgsift status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DbCounts {
    pub packages: usize,
    pub packages_due: usize,
    pub persons: usize,
    pub persons_due: usize,
}

pub struct CrawlerDb {
    packages: MemDb<CrawlingEntry>,
    persons: MemDb<CrawlingEntry>,
    policy: SchedulePolicy,
    validator: Box<dyn RemotePathCheck>,
}

impl CrawlerDb {
    /// Load both snapshots under `dir`. Missing files start empty.
    pub fn open(
        dir: &Path,
        policy: SchedulePolicy,
        validator: impl RemotePathCheck + 'static,
    ) -> Result<Self> {
        let packages = MemDb::load(dir.join(PACKAGE_FILE))?;
        let persons = MemDb::load(dir.join(PERSON_FILE))?;
        log::info!(
            "crawler db: {} packages, {} persons (policy v{})",
            packages.count(),
            persons.count(),
            policy.version
        );
        Ok(Self {
            packages,
            persons,
            policy,
            validator: Box::new(validator),
        })
    }

    pub fn policy(&self) -> &SchedulePolicy {
        &self.policy
    }

    pub fn packages(&self) -> &MemDb<CrawlingEntry> {
        &self.packages
    }

    pub fn persons(&self) -> &MemDb<CrawlingEntry> {
        &self.persons
    }

    /// Record a sighting of `raw` (from an import list, a person page, ...).
    ///
    /// `in_docs` tells whether the baseline already holds a document for it.
    pub fn append_package(&self, raw: &str, in_docs: bool, now: DateTime<Utc>) -> AppendOutcome {
        let id = trim_package_name(raw);
        if id.is_empty() || !self.validator.is_valid_remote_path(id) {
            log::debug!("dropping invalid package path {raw:?}");
            return AppendOutcome::Invalid;
        }
        match self.packages.get(id) {
            None if in_docs => AppendOutcome::SkippedInDocs,
            None => {
                self.packages
                    .put(id, CrawlingEntry::due_at(now, self.policy.version));
                AppendOutcome::Scheduled(id.to_string())
            }
            Some(entry) if in_docs && entry.schedule_time > now => AppendOutcome::Unchanged,
            Some(mut entry) => {
                entry.schedule_time = now;
                self.packages.put(id, entry);
                AppendOutcome::Rescheduled(id.to_string())
            }
        }
    }

    pub fn package_entry(&self, id: &str) -> Option<CrawlingEntry> {
        self.packages.get(id)
    }

    /// After a successful crawl, changed or not. `etag: None` keeps the
    /// stored one. Untracked ids stay untracked; returns whether `id` was
    /// rescheduled.
    pub fn schedule_package_success<R: Rng + ?Sized>(
        &self,
        id: &str,
        now: DateTime<Utc>,
        etag: Option<String>,
        rng: &mut R,
    ) -> bool {
        let Some(mut entry) = self.packages.get(id) else {
            return false;
        };
        entry.schedule_time = self.policy.next_after_success(now, rng);
        entry.version = self.policy.version;
        if let Some(etag) = etag {
            entry.etag = etag;
        }
        self.packages.put(id, entry);
        true
    }

    /// After a transient failure. The etag of an entry from an older policy
    /// version is dropped so the retry fetches unconditionally.
    pub fn schedule_package_failure(&self, id: &str, now: DateTime<Utc>) -> bool {
        let Some(entry) = self.packages.get(id) else {
            return false;
        };
        self.packages.put(id, self.failed_entry(entry, now));
        true
    }

    fn failed_entry(&self, mut entry: CrawlingEntry, now: DateTime<Utc>) -> CrawlingEntry {
        entry.schedule_time = self.policy.next_after_failure(now);
        if entry.version < self.policy.version {
            entry.etag.clear();
        }
        entry
    }

    /// Stop tracking `id`. Returns whether it was tracked.
    pub fn remove_package(&self, id: &str) -> bool {
        self.packages.delete(id).is_some()
    }

    /// Make a tracked package due at `now`. Returns false if unknown.
    pub fn push_to_crawl_package(&self, id: &str, now: DateTime<Utc>) -> bool {
        let id = trim_package_name(id);
        let Some(mut entry) = self.packages.get(id) else {
            return false;
        };
        entry.schedule_time = now;
        self.packages.put(id, entry);
        true
    }

    /// Track `site:username`, due now. Returns false if already tracked.
    pub fn append_person(&self, site: &str, username: &str, now: DateTime<Utc>) -> bool {
        let id = person_id(site, username);
        if self.persons.contains(&id) {
            return false;
        }
        self.persons
            .put(id, CrawlingEntry::due_at(now, self.policy.version));
        true
    }

    pub fn person_entry(&self, id: &str) -> Option<CrawlingEntry> {
        self.persons.get(id)
    }

    /// Set a person's next crawl time, creating the entry if needed.
    pub fn schedule_person(&self, id: &str, at: DateTime<Utc>) {
        let entry = match self.persons.get(id) {
            Some(mut e) => {
                e.schedule_time = at;
                e
            }
            None => CrawlingEntry::due_at(at, self.policy.version),
        };
        self.persons.put(id, entry);
    }

    pub fn schedule_person_success<R: Rng + ?Sized>(
        &self,
        id: &str,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> bool {
        let Some(mut entry) = self.persons.get(id) else {
            return false;
        };
        entry.schedule_time = self.policy.next_after_success(now, rng);
        entry.version = self.policy.version;
        self.persons.put(id, entry);
        true
    }

    pub fn schedule_person_failure(&self, id: &str, now: DateTime<Utc>) -> bool {
        let Some(entry) = self.persons.get(id) else {
            return false;
        };
        self.persons.put(id, self.failed_entry(entry, now));
        true
    }

    pub fn remove_person(&self, id: &str) -> bool {
        self.persons.delete(id).is_some()
    }

    /// Packages with `schedule_time <= now`, in key order.
    pub fn due_packages(&self, now: DateTime<Utc>) -> Result<Vec<(String, CrawlingEntry)>> {
        due(&self.packages, now)
    }

    pub fn due_persons(&self, now: DateTime<Utc>) -> Result<Vec<(String, CrawlingEntry)>> {
        due(&self.persons, now)
    }

    pub fn counts(&self, now: DateTime<Utc>) -> Result<DbCounts> {
        let mut counts = DbCounts {
            packages: self.packages.count(),
            persons: self.persons.count(),
            ..DbCounts::default()
        };
        self.packages.iterate(|_, e| {
            counts.packages_due += usize::from(e.is_due(now));
            Ok(WorkSignal::Continue)
        })?;
        self.persons.iterate(|_, e| {
            counts.persons_due += usize::from(e.is_due(now));
            Ok(WorkSignal::Continue)
        })?;
        Ok(counts)
    }

    pub fn is_modified(&self) -> bool {
        self.packages.is_modified() || self.persons.is_modified()
    }

    /// Save both snapshots. An error here must end the stage.
    pub fn sync(&self) -> Result<()> {
        self.packages.sync()?;
        self.persons.sync()
    }
}

fn due(db: &MemDb<CrawlingEntry>, now: DateTime<Utc>) -> Result<Vec<(String, CrawlingEntry)>> {
    let mut out = Vec::new();
    db.iterate(|id, e| {
        if e.is_due(now) {
            out.push((id.to_string(), e.clone()));
        }
        Ok(WorkSignal::Continue)
    })?;
    Ok(out)
}
