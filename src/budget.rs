//! Wall-clock budget and cancellation for a single solve.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Default solve budget in milliseconds.
pub const DEFAULT_BUDGET_MS: u64 = 5000;

/// Shared flag the caller flips to abandon a solve.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Why a budget stopped a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhausted {
    Deadline,
    Cancelled,
}

/// Deadline plus cancellation token, polled by the solver.
#[derive(Debug, Clone)]
pub struct SolveBudget {
    deadline: Instant,
    token: CancelToken,
}

impl SolveBudget {
    pub fn new(limit: Duration) -> Self {
        Self::with_token(limit, CancelToken::new())
    }

    pub fn with_token(limit: Duration, token: CancelToken) -> Self {
        Self {
            deadline: Instant::now() + limit,
            token,
        }
    }

    /// A budget that is already spent. Useful for forcing a timeout.
    pub fn expired() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn check(&self) -> Result<(), Exhausted> {
        if self.token.is_cancelled() {
            Err(Exhausted::Cancelled)
        } else if Instant::now() >= self.deadline {
            Err(Exhausted::Deadline)
        } else {
            Ok(())
        }
    }
}

impl Default for SolveBudget {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_BUDGET_MS))
    }
}
