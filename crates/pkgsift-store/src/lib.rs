//! pkgsift-store: durable hand-off primitives for the pipeline stages
//!
//! Two building blocks:
//! - [`MemDb`]: an in-memory string-keyed map mirrored to one JSON snapshot
//!   file, saved with write-new / remove-old / rename.
//! - [`Segments`]: a directory of numbered segment directories used as a
//!   work queue. A segment becomes visible to consumers only after its
//!   `.done` marker is written.

pub mod jsonl;
pub mod manifest;
pub mod memdb;
pub mod segment;

pub use jsonl::{JsonlWriter, read_jsonl, write_jsonl};
pub use manifest::{SegmentManifest, VerifyResult};
pub use memdb::MemDb;
pub use segment::{DONE_MARKER, Segment, Segments, compare_names};
