use std::{collections::BTreeSet, time::Duration};

use metrics::counter;
use refresh_domain::{DataChannel, DataLayer, RefreshStatus};
use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, trace};

use crate::{
    clock::UpdateClock,
    resource::ExclusiveResource,
    service::{SchedulerEvent, ServiceHandle},
};

/// Borrowed view of what a tick needs from its owner.
pub struct TickContext<'a> {
    pub data: &'a dyn DataLayer,
    pub clock: &'a UpdateClock,
    pub resource: &'a ExclusiveResource,
    pub period_seconds: u32,
    pub now: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick belonged to a cancelled chain.
    Stale,
    /// A consumer is active; the owner must re-evaluate.
    Delegated,
    Ran { refreshed: bool },
}

/// Foreground tick loop. The first tick of a chain is queued straight away,
/// later ones by a task that sleeps and then posts `Tick(generation)`.
/// Bumping the generation orphans anything already in flight, so at most one
/// chain is ever live.
pub struct PeriodicScheduler {
    events: ServiceHandle,
    delay: Duration,
    ack_timeout: Duration,
    active: bool,
    generation: u64,
    pending: Option<JoinHandle<()>>,
    awaiting_ack_since: Option<Instant>,
}

impl PeriodicScheduler {
    pub fn new(events: ServiceHandle, delay: Duration, ack_timeout: Duration) -> Self {
        Self {
            events,
            delay,
            ack_timeout,
            active: false,
            generation: 0,
            pending: None,
            awaiting_ack_since: None,
        }
    }

    /// Starts a fresh chain with an immediate first tick.
    pub fn start(&mut self) {
        self.cancel_pending();
        self.active = true;
        self.awaiting_ack_since = None;
        debug!(generation = self.generation, "tick loop started");
        self.schedule(Duration::ZERO);
    }

    pub fn stop(&mut self) {
        if self.active {
            debug!(generation = self.generation, "tick loop stopped");
        }
        self.cancel_pending();
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Marks the outstanding foreground refresh as answered.
    pub fn acknowledge(&mut self) {
        self.awaiting_ack_since = None;
    }

    pub fn tick(&mut self, generation: u64, ctx: TickContext<'_>) -> TickOutcome {
        if !self.active || generation != self.generation {
            trace!(generation, current = self.generation, "stale tick ignored");
            return TickOutcome::Stale;
        }
        self.pending = None;

        if ctx.data.has_active_consumer() {
            self.stop();
            return TickOutcome::Delegated;
        }

        ctx.resource.release();

        let refreshed = if self.awaiting_ack(ctx.now) {
            false
        } else if ctx.clock.is_due(ctx.now, ctx.period_seconds) {
            let channels = BTreeSet::from([DataChannel::Events]);
            ctx.data.request_refresh(&channels);
            counter!("scheduler_refresh_requests_total", "path" => "foreground").increment(1);
            self.awaiting_ack_since = Some(ctx.now);
            true
        } else {
            false
        };

        if ctx.data.is_live_source() {
            ctx.data.publish_status(&RefreshStatus {
                remaining_seconds: ctx.clock.remaining_seconds(ctx.now, ctx.period_seconds),
                period_seconds: ctx.period_seconds,
            });
            self.schedule(self.delay);
        } else {
            debug!("historic source, tick loop ends after one shot");
            self.active = false;
        }

        TickOutcome::Ran { refreshed }
    }

    fn awaiting_ack(&self, now: Instant) -> bool {
        self.awaiting_ack_since
            .is_some_and(|since| now.saturating_duration_since(since) < self.ack_timeout)
    }

    fn schedule(&mut self, delay: Duration) {
        let generation = self.generation;
        if delay.is_zero() {
            if self.events.post(SchedulerEvent::Tick(generation)).is_err() {
                debug!(generation, "event loop closed, tick dropped");
            }
            return;
        }

        let events = self.events.clone();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.post(SchedulerEvent::Tick(generation));
        }));
    }

    fn cancel_pending(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(task) = self.pending.take() {
            task.abort();
        }
    }
}

impl Drop for PeriodicScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
    }
}
