//! In-flight request tracking.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Counts requests currently being served.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    active: Arc<AtomicUsize>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request start; the request ends when the guard drops.
    pub fn enter(&self) -> InFlightGuard {
        let count = self.active.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(active_requests = count, "Request started");
        InFlightGuard {
            active: Arc::clone(&self.active),
        }
    }

    /// Requests currently being served.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }
}

/// Marks one in-flight request.
#[derive(Debug)]
pub struct InFlightGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let count = self.active.fetch_sub(1, Ordering::Relaxed) - 1;
        trace!(active_requests = count, "Request completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guards_track_requests() {
        let in_flight = InFlight::new();

        let first = in_flight.enter();
        let second = in_flight.clone().enter();
        assert_eq!(in_flight.active(), 2);

        drop(first);
        assert_eq!(in_flight.active(), 1);

        drop(second);
        assert_eq!(in_flight.active(), 0);
    }
}
