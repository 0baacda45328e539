//! Poll-with-timeout primitive.
//!
//! Every suspension point in a session (`goto`, `reload`, `await_call`,
//! `expect_eventually`) is built on [`poll`]: evaluate a check, sleep for the
//! poll interval, repeat until the check yields a value or the deadline
//! passes. There are no implicit waits anywhere else.

use std::time::{Duration, Instant};

use crate::result::LanecheckResult;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for wait operations (4 seconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 4_000;

/// Default polling interval (10ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

// =============================================================================
// WAIT OPTIONS
// =============================================================================

/// Options for wait operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Timeout in milliseconds
    pub timeout_ms: u64,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl WaitOptions {
    /// Create new wait options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Get timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get poll interval as Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// =============================================================================
// POLLING
// =============================================================================

/// Outcome of a bounded poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Polled<T> {
    /// Probe produced a value
    Ready {
        /// The value
        value: T,
        /// Time spent waiting
        elapsed: Duration,
    },
    /// Deadline passed first
    TimedOut {
        /// Time spent waiting
        elapsed: Duration,
    },
}

impl<T> Polled<T> {
    /// The value, if the check succeeded
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready { value, .. } => Some(value),
            Self::TimedOut { .. } => None,
        }
    }

    /// Time spent waiting
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        match self {
            Self::Ready { elapsed, .. } | Self::TimedOut { elapsed } => *elapsed,
        }
    }
}

/// Evaluate `check` until it yields `Some`, the timeout elapses, or it errors
///
/// The check always runs at least once, even with a zero timeout. An `Err`
/// from the check ends the wait immediately.
pub fn poll<T>(
    options: &WaitOptions,
    mut check: impl FnMut() -> LanecheckResult<Option<T>>,
) -> LanecheckResult<Polled<T>> {
    let start = Instant::now();
    let timeout = options.timeout();
    loop {
        if let Some(value) = check()? {
            return Ok(Polled::Ready {
                value,
                elapsed: start.elapsed(),
            });
        }
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Ok(Polled::TimedOut { elapsed });
        }
        std::thread::sleep(options.poll_interval().min(timeout - elapsed));
    }
}
