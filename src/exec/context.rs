//! Caller-supplied deadline and cancellation for one invocation.

use crate::config::settings::MAX_SOLVE_DURATION;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Deadline plus a shareable cancel flag.
///
/// The effective deadline is never later than `MAX_SOLVE_DURATION` after the
/// context was created, whatever the caller asked for.
#[derive(Clone, Debug)]
pub struct SolveContext {
    started: Instant,
    limit: Duration,
    cancelled: Arc<AtomicBool>,
}

impl SolveContext {
    /// Context expiring after `limit` (clamped to the ceiling)
    pub fn with_timeout(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit: limit.min(MAX_SOLVE_DURATION),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Context using the full ceiling
    pub fn background() -> Self {
        Self::with_timeout(MAX_SOLVE_DURATION)
    }

    /// Effective limit after clamping
    pub fn limit(&self) -> Duration {
        self.limit
    }

    pub fn deadline(&self) -> Instant {
        self.started + self.limit
    }

    pub fn remaining(&self) -> Duration {
        self.deadline().saturating_duration_since(Instant::now())
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Request cancellation; the running process is terminated at the next poll
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Deadline passed or cancellation requested
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || Instant::now() >= self.deadline()
    }
}

impl Default for SolveContext {
    fn default() -> Self {
        Self::background()
    }
}
