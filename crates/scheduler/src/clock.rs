use std::time::Duration;

use tokio::time::Instant;

/// Tracks when the last acknowledged refresh happened.
///
/// `is_due` and `elapsed_since_last` are pure; only `record_refresh` and
/// `restart` move the reference point.
#[derive(Debug, Clone, Default)]
pub struct UpdateClock {
    last_refresh: Option<Instant>,
}

impl UpdateClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// A clock that never saw a refresh is always due.
    pub fn is_due(&self, now: Instant, period_seconds: u32) -> bool {
        match self.last_refresh {
            None => true,
            Some(last) => {
                now.saturating_duration_since(last) >= Duration::from_secs(period_seconds.into())
            }
        }
    }

    /// Elapsed time since the last refresh, capped at one period. Status
    /// display only.
    pub fn elapsed_since_last(&self, now: Instant, period_seconds: u32) -> Duration {
        let period = Duration::from_secs(period_seconds.into());
        match self.last_refresh {
            None => period,
            Some(last) => now.saturating_duration_since(last).min(period),
        }
    }

    /// Whole seconds left until the next refresh is due.
    pub fn remaining_seconds(&self, now: Instant, period_seconds: u32) -> u64 {
        let elapsed = self.elapsed_since_last(now, period_seconds).as_secs();
        u64::from(period_seconds).saturating_sub(elapsed)
    }

    pub fn record_refresh(&mut self, at: Instant) {
        self.last_refresh = Some(at);
    }

    /// Forgets the last refresh so the next check is due immediately.
    pub fn restart(&mut self) {
        self.last_refresh = None;
    }

    pub fn last_refresh(&self) -> Option<Instant> {
        self.last_refresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn due_schedule_for_sixty_second_period() {
        let t0 = Instant::now();
        let mut clock = UpdateClock::new();

        assert!(clock.is_due(t0, 60));
        clock.record_refresh(t0);
        assert!(!clock.is_due(t0 + secs(30), 60));
        assert!(clock.is_due(t0 + secs(61), 60));
    }

    #[test]
    fn zero_period_is_always_due() {
        let t0 = Instant::now();
        let mut clock = UpdateClock::new();
        clock.record_refresh(t0);
        assert!(clock.is_due(t0, 0));
    }

    #[test]
    fn elapsed_is_capped_for_display() {
        let t0 = Instant::now();
        let mut clock = UpdateClock::new();
        assert_eq!(clock.elapsed_since_last(t0, 60), secs(60));
        assert_eq!(clock.remaining_seconds(t0, 60), 0);

        clock.record_refresh(t0);
        assert_eq!(clock.elapsed_since_last(t0 + secs(20), 60), secs(20));
        assert_eq!(clock.remaining_seconds(t0 + secs(20), 60), 40);
        assert_eq!(clock.elapsed_since_last(t0 + secs(600), 60), secs(60));
    }

    #[test]
    fn restart_makes_the_clock_due_again() {
        let t0 = Instant::now();
        let mut clock = UpdateClock::new();
        clock.record_refresh(t0);
        assert!(!clock.is_due(t0 + secs(1), 60));

        clock.restart();
        assert!(clock.is_due(t0 + secs(1), 60));
        assert_eq!(clock.last_refresh(), None);
    }
}
