//! Deadline arithmetic for the global export timeout.
//!
//! A requested timeout is converted once, at `export()` entry, into an
//! absolute deadline; the polling loop and the download engine both consume
//! the same deadline. A zero timeout means "no deadline".

use std::time::Duration;

use tokio::time::Instant;

/// The global wall-clock deadline of one export invocation.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    limit: Duration,
    at: Option<Instant>,
}

impl Deadline {
    /// Starts the clock: converts a requested timeout into an absolute
    /// deadline. A zero timeout disables the deadline.
    #[must_use]
    pub fn start(timeout: Duration) -> Self {
        Self {
            limit: timeout,
            at: (timeout > Duration::ZERO).then(|| Instant::now() + timeout),
        }
    }

    /// A deadline that never expires.
    #[must_use]
    pub fn none() -> Self {
        Self::start(Duration::ZERO)
    }

    /// The originally requested timeout (zero when no deadline is set).
    #[must_use]
    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// The absolute expiry instant, when a deadline is set.
    #[must_use]
    pub fn at(&self) -> Option<Instant> {
        self.at
    }

    /// Whether the deadline has passed. Never true without a deadline.
    #[must_use]
    pub fn has_expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// The remaining budget, saturating at zero. `None` without a deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Caps a requested sleep so it cannot overshoot the deadline.
    #[must_use]
    pub fn cap_sleep(&self, delay: Duration) -> Duration {
        match self.remaining() {
            Some(remaining) => delay.min(remaining),
            None => delay,
        }
    }
}
