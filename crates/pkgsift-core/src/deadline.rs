//! Wall-clock deadline and the per-item control signal
//!
//! A stage fixes its deadline once at startup. Each unit of work asks
//! [`Deadline::check`] before it begins; nothing is cancelled mid-item.

use std::fmt;
use std::time::{Duration, Instant};

use crate::shutdown::is_shutdown_requested;

/// Outcome of a pre-item check or of a traversal callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkSignal {
    /// Keep going.
    Continue,
    /// Stop requested (signal or callback asked to end early).
    Stop,
    /// Stage deadline passed. Normal termination, not an error.
    Deadline,
}

impl WorkSignal {
    pub fn is_continue(self) -> bool {
        self == Self::Continue
    }
}

impl fmt::Display for WorkSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => f.write_str("continue"),
            Self::Stop => f.write_str("stop"),
            Self::Deadline => f.write_str("deadline"),
        }
    }
}

/// Stage deadline. `None` means unbounded.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// Deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(budget),
        }
    }

    /// No deadline; only the stop flag ends work early.
    pub fn unbounded() -> Self {
        Self { at: None }
    }

    pub fn is_expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Time left, or `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Check before starting a unit of work.
    ///
    /// The stop flag wins over the deadline so an interrupted run reports
    /// `Stop` even when it also ran out of time.
    pub fn check(&self) -> WorkSignal {
        if is_shutdown_requested() {
            WorkSignal::Stop
        } else if self.is_expired() {
            WorkSignal::Deadline
        } else {
            WorkSignal::Continue
        }
    }
}
