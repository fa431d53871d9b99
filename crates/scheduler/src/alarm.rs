use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use metrics::{counter, gauge};
use refresh_domain::{AlarmError, AlarmSubstrate, AlarmToken};
use tokio::{runtime::Handle, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::service::ServiceHandle;

/// The one live repeating registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmRegistration {
    token: AlarmToken,
    period_seconds: u32,
}

impl AlarmRegistration {
    pub fn token(&self) -> AlarmToken {
        self.token
    }

    pub fn period_seconds(&self) -> u32 {
        self.period_seconds
    }
}

/// Owns at most one outstanding background trigger. Both operations are
/// idempotent.
pub struct AlarmCoordinator {
    substrate: Arc<dyn AlarmSubstrate>,
    registration: Option<AlarmRegistration>,
}

impl AlarmCoordinator {
    pub fn new(substrate: Arc<dyn AlarmSubstrate>) -> Self {
        Self {
            substrate,
            registration: None,
        }
    }

    /// Registers the trigger when none exists, the period is positive and a
    /// consumer is active. A failed registration leaves the slot empty so the
    /// next call retries.
    pub fn ensure(&mut self, period_seconds: u32, has_active_consumer: bool) {
        if self.registration.is_some() || period_seconds == 0 || !has_active_consumer {
            return;
        }

        let interval = Duration::from_secs(period_seconds.into());
        match self.substrate.register_repeating(interval) {
            Ok(token) => {
                info!(period_seconds, token = token.id(), "background alarm registered");
                counter!("scheduler_alarm_registrations_total", "result" => "ok").increment(1);
                gauge!("scheduler_alarm_registered").set(1.0);
                self.registration = Some(AlarmRegistration {
                    token,
                    period_seconds,
                });
            }
            Err(err) => {
                counter!("scheduler_alarm_registrations_total", "result" => "error").increment(1);
                warn!(?err, period_seconds, "background alarm registration failed");
            }
        }
    }

    pub fn discard(&mut self) {
        if let Some(registration) = self.registration.take() {
            debug!(token = registration.token.id(), "background alarm discarded");
            self.substrate.cancel(registration.token);
            gauge!("scheduler_alarm_registered").set(0.0);
        }
    }

    pub fn configure_boot_trigger(&self, enabled: bool) {
        self.substrate.configure_boot_trigger(enabled);
    }

    pub fn registration(&self) -> Option<&AlarmRegistration> {
        self.registration.as_ref()
    }
}

/// In-process substrate: every registration is a tokio interval task that
/// posts `AlarmFired` into the service queue. The first firing is immediate.
pub struct TokioAlarmSubstrate {
    events: ServiceHandle,
    next_id: AtomicU64,
    tasks: Mutex<HashMap<AlarmToken, JoinHandle<()>>>,
}

impl TokioAlarmSubstrate {
    pub fn new(events: ServiceHandle) -> Self {
        Self {
            events,
            next_id: AtomicU64::new(1),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn active_registrations(&self) -> usize {
        self.tasks.lock().expect("mutex poisoned").len()
    }
}

impl AlarmSubstrate for TokioAlarmSubstrate {
    fn register_repeating(&self, interval: Duration) -> Result<AlarmToken, AlarmError> {
        if interval.is_zero() {
            return Err(AlarmError::Rejected("interval must be positive".to_string()));
        }
        let runtime = Handle::try_current().map_err(|_| AlarmError::Unavailable)?;

        let token = AlarmToken::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let events = self.events.clone();
        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if events.on_alarm_fired().is_err() {
                    break;
                }
            }
        });

        self.tasks
            .lock()
            .expect("mutex poisoned")
            .insert(token, task);
        Ok(token)
    }

    fn cancel(&self, token: AlarmToken) {
        if let Some(task) = self.tasks.lock().expect("mutex poisoned").remove(&token) {
            task.abort();
        }
    }

    fn configure_boot_trigger(&self, enabled: bool) {
        debug!(enabled, "boot trigger has no effect for the in-process substrate");
    }
}

impl Drop for TokioAlarmSubstrate {
    fn drop(&mut self) {
        if let Ok(tasks) = self.tasks.get_mut() {
            for (_, task) in tasks.drain() {
                task.abort();
            }
        }
    }
}
