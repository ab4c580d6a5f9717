//! Manually advanced clock for expiry tests.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use svc_auth::Clock;

/// [`Clock`] that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    /// Clock starting at the current wall time, ready to inject.
    pub fn starting_now() -> Arc<Self> {
        Arc::new(Self::new(chrono::Utc::now().timestamp()))
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
