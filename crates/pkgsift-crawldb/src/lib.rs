//! pkgsift-crawldb: what to crawl, and when
//!
//! [`CrawlerDb`] keeps one [`CrawlingEntry`] per package path and per
//! person id in two snapshot-backed maps. The stage functions built on it:
//! - [`import_packages`]: drain the `import` queue into the database.
//! - [`generate_crawl_lists`]: write due entries, grouped by host, into the
//!   `tocrawl` queue.
//! - [`run_crawl_stage`]: crawl the latest list through a [`Fetcher`],
//!   reschedule every entry, and emit deltas into the `newdocs` queue.

pub mod db;
pub mod entry;
pub mod fetch;
pub mod ident;
pub mod import;
pub mod lists;
pub mod policy;
pub mod worker;

pub use db::{AppendOutcome, CrawlerDb, DbCounts};
pub use entry::CrawlingEntry;
pub use fetch::{FetchError, FetchOutcome, Fetcher};
pub use ident::{
    HostPathCheck, RemotePathCheck, host_of, parse_person_id, person_id, trim_package_name,
};
pub use import::{ImportSummary, import_packages};
pub use lists::{CrawlItem, ListSummary, generate_crawl_lists};
pub use policy::SchedulePolicy;
pub use worker::{CrawlQueues, CrawlStageConfig, CrawlSummary, run_crawl_stage};
