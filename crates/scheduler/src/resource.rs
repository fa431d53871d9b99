use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use metrics::counter;
use tokio::time::Instant;
use tracing::debug;

/// A single limited resource (a wake lock) held by at most one refresh cycle.
///
/// Every hold carries an expiry, so a holder that never releases cannot
/// starve later cycles.
#[derive(Debug)]
pub struct ExclusiveResource {
    name: &'static str,
    held_until: Mutex<Option<Instant>>,
}

impl ExclusiveResource {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            held_until: Mutex::new(None),
        }
    }

    /// Returns `false` without waiting when someone else holds an unexpired
    /// hold. Callers skip their work in that case.
    pub fn try_acquire(&self, timeout: Duration) -> bool {
        let now = Instant::now();
        let mut guard = self.held_until.lock().unwrap_or_else(PoisonError::into_inner);
        match *guard {
            Some(deadline) if deadline > now => {
                counter!("scheduler_resource_contention_total", "resource" => self.name)
                    .increment(1);
                debug!(resource = self.name, "acquire skipped, already held");
                false
            }
            _ => {
                *guard = Some(now + timeout);
                debug!(resource = self.name, ?timeout, "acquired");
                true
            }
        }
    }

    /// No-op when nothing is held.
    pub fn release(&self) {
        let mut guard = self.held_until.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.take().is_some() {
            debug!(resource = self.name, "released");
        }
    }

    pub fn is_held(&self) -> bool {
        let guard = self.held_until.lock().unwrap_or_else(PoisonError::into_inner);
        matches!(*guard, Some(deadline) if deadline > Instant::now())
    }
}

impl Default for ExclusiveResource {
    fn default() -> Self {
        Self::new("wake_lock")
    }
}
