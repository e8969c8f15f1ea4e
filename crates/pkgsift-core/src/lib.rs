//! pkgsift-core - shared plumbing for the crawl/index pipeline stages
//!
//! Logging, progress bars, cooperative cancellation, work distribution and
//! failure backoff used by every stage binary.

pub mod deadline;
pub mod logging;
pub mod progress;
pub mod retry;
pub mod shutdown;
pub mod work_queue;

// Re-exports for convenience
pub use deadline::{Deadline, WorkSignal};
pub use logging::{IndicatifLogger, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use retry::FailureBackoff;
pub use shutdown::{
    install_signal_handlers, is_shutdown_requested, request_shutdown, shutdown_flag,
};
pub use work_queue::WorkQueue;
