//! Per-package reduction and merge statistics

use std::time::Duration;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use pkgsift_core::fmt_num;
use regex::RegexSet;

use crate::doc::{Action, DocInfo, NewDocAction};

/// How a package came out of the merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No baseline record existed.
    New,
    /// A delta is strictly newer than every baseline record.
    Updated,
    /// Baseline record kept (or a delta no newer than it).
    Unchanged,
    /// A tombstone was present.
    Deleted,
    /// Matched the exclusion filter.
    Excluded,
}

/// Reduce all records for one package, in arrival order.
///
/// Any `Del` drops the package. Otherwise the record with the greatest
/// `last_updated` wins, earliest arrival on ties.
pub fn reduce_group(group: Vec<NewDocAction>) -> (Outcome, Option<DocInfo>) {
    if group.iter().any(|r| r.action == Action::Del) {
        return (Outcome::Deleted, None);
    }

    let latest_original = group
        .iter()
        .filter(|r| r.action == Action::Original)
        .map(|r| r.doc.last_updated)
        .max();

    let mut best: Option<NewDocAction> = None;
    for r in group {
        if best
            .as_ref()
            .is_none_or(|b| r.doc.last_updated > b.doc.last_updated)
        {
            best = Some(r);
        }
    }
    let Some(best) = best else {
        return (Outcome::Unchanged, None);
    };

    let outcome = match latest_original {
        None => Outcome::New,
        Some(orig) if best.action != Action::Original && best.doc.last_updated > orig => {
            Outcome::Updated
        }
        Some(_) => Outcome::Unchanged,
    };
    (outcome, Some(best.doc))
}

/// Operator block-list of package id patterns.
#[derive(Debug, Clone)]
pub struct ExcludeFilter {
    set: Option<RegexSet>,
}

impl ExcludeFilter {
    pub fn new(patterns: &[String]) -> Result<Self> {
        if patterns.is_empty() {
            return Ok(Self::none());
        }
        let set = RegexSet::new(patterns).context("invalid exclude pattern")?;
        Ok(Self { set: Some(set) })
    }

    pub fn none() -> Self {
        Self { set: None }
    }

    pub fn is_excluded(&self, package: &str) -> bool {
        self.set.as_ref().is_some_and(|s| s.is_match(package))
    }

    pub fn len(&self) -> usize {
        self.set.as_ref().map_or(0, RegexSet::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Counters for one merge run (or one partition of it).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub excluded: usize,
    /// Delta records read from the newdocs queue.
    pub deltas: usize,
    /// Delta segments consumed.
    pub segments: usize,
    pub elapsed: Duration,
}

impl MergeSummary {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::New => self.new += 1,
            Outcome::Updated => self.updated += 1,
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::Deleted => self.deleted += 1,
            Outcome::Excluded => self.excluded += 1,
        }
    }

    /// Fold another partition's counters into this one.
    pub fn absorb(&mut self, other: &MergeSummary) {
        self.new += other.new;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.deleted += other.deleted;
        self.excluded += other.excluded;
    }

    /// Documents in the resulting baseline.
    pub fn total_docs(&self) -> usize {
        self.new + self.updated + self.unchanged
    }

    pub fn log(&self) {
        log::info!(
            "merge: {} docs ({} new, {} updated, {} unchanged), {} deleted, {} excluded, \
             {} deltas from {} segments [{:.1}s]",
            fmt_num(self.total_docs()),
            fmt_num(self.new),
            fmt_num(self.updated),
            fmt_num(self.unchanged),
            fmt_num(self.deleted),
            fmt_num(self.excluded),
            fmt_num(self.deltas),
            self.segments,
            self.elapsed.as_secs_f64()
        );
    }

    pub fn print(&self) {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("Outcome").fg(Color::Cyan),
                Cell::new("Count").fg(Color::Cyan),
            ]);
        table.add_row(vec![Cell::new("new"), Cell::new(fmt_num(self.new)).fg(Color::Green)]);
        table.add_row(vec![Cell::new("updated"), Cell::new(fmt_num(self.updated))]);
        table.add_row(vec![Cell::new("unchanged"), Cell::new(fmt_num(self.unchanged))]);
        table.add_row(vec![
            Cell::new("deleted"),
            Cell::new(fmt_num(self.deleted)).fg(Color::Red),
        ]);
        table.add_row(vec![Cell::new("excluded"), Cell::new(fmt_num(self.excluded))]);
        table.add_row(vec![
            Cell::new("baseline total"),
            Cell::new(fmt_num(self.total_docs())),
        ]);
        eprintln!("\n{table}");
        eprintln!(
            "{} deltas from {} segments in {:.1}s",
            fmt_num(self.deltas),
            self.segments,
            self.elapsed.as_secs_f64()
        );
    }
}
