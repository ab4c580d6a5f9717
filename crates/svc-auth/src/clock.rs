//! Wall clock abstraction.
//!
//! Cache expirations are absolute Unix timestamps in seconds. Production code
//! reads [`SystemClock`]; tests inject a clock they can advance so expiry
//! boundaries can be exercised without sleeping.

use std::fmt;

/// Source of the current time as Unix epoch seconds.
pub trait Clock: Send + Sync {
    /// Current Unix timestamp in seconds.
    fn now(&self) -> i64;
}

/// [`Clock`] backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

impl fmt::Debug for dyn Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock").field("now", &self.now()).finish()
    }
}
