//! Cooperative cancellation for ingestion runs.
//!
//! The CLI trips the token on Ctrl-C. The orchestrator checks it between
//! sources and the reconciler between articles; writes already made stay.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared stop flag. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a stop has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Request a stop at the next check point.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}
