use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Hands out order codes for checkout links: strictly increasing within the
/// process and seeded from the wall clock so restarts keep moving forward.
#[derive(Debug, Default)]
pub struct OrderCodeGenerator {
    last: AtomicI64,
}

impl OrderCodeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `max(previous + 1, now in milliseconds)`.
    pub fn next_code(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(current + 1);
            match self.last.compare_exchange_weak(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(observed) => current = observed,
            }
        }
    }
}
