//! pkgsift-merge: fold crawl deltas into the document baseline
//!
//! The baseline is a set of hash partitions of [`DocInfo`] records. Crawl
//! workers append [`NewDocAction`] deltas to the `newdocs` queue; the merge
//! job partitions those deltas with the same hash, reduces each package id
//! to at most one record, writes a fresh baseline, and swaps it in.

pub mod baseline;
pub mod doc;
pub mod job;
pub mod partition;
pub mod reduce;

pub use baseline::{Baseline, BaselineStore, BaselineWriter, IndexSink};
pub use doc::{Action, DocInfo, NewDocAction};
pub use job::{MergeConfig, MergeJob};
pub use partition::{DEFAULT_PARTS, partition};
pub use reduce::{ExcludeFilter, MergeSummary, Outcome, reduce_group};
