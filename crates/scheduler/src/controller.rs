use std::sync::Arc;

use metrics::counter;
use refresh_domain::{
    AlarmSubstrate, Config, DataLayer, LocationControl, OperatingMode, Parameters, PreferenceKey,
    PreferenceStore, RuntimeSignal, SchedulerSettings,
};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{
    alarm::{AlarmCoordinator, AlarmRegistration},
    clock::UpdateClock,
    periodic::{PeriodicScheduler, TickContext, TickOutcome},
    resource::ExclusiveResource,
    service::{SchedulerSnapshot, ServiceHandle},
};

/// External systems the controller drives.
#[derive(Clone)]
pub struct Collaborators {
    pub data: Arc<dyn DataLayer>,
    pub location: Arc<dyn LocationControl>,
    pub alarms: Arc<dyn AlarmSubstrate>,
    pub preferences: Arc<dyn PreferenceStore>,
}

/// The operating-mode state machine.
///
/// Owns the config and every scheduling primitive. All entry points are
/// `&mut self`, so whoever owns the controller is the serialization point;
/// [`crate::service::RefreshService`] runs them off a single queue.
pub struct ModeController {
    config: Config,
    settings: SchedulerSettings,
    data: Arc<dyn DataLayer>,
    location: Arc<dyn LocationControl>,
    preferences: Arc<dyn PreferenceStore>,
    alarms: AlarmCoordinator,
    scheduler: PeriodicScheduler,
    clock: UpdateClock,
    resource: Arc<ExclusiveResource>,
    last_parameters: Option<Parameters>,
    // active parameters a catch-up refresh was already issued for under the
    // current signal and config
    forced_for: Option<Parameters>,
    last_signal: Option<RuntimeSignal>,
    mode: Option<OperatingMode>,
}

impl ModeController {
    pub fn new(
        collaborators: Collaborators,
        settings: SchedulerSettings,
        resource: Arc<ExclusiveResource>,
        events: ServiceHandle,
    ) -> Self {
        let Collaborators {
            data,
            location,
            alarms,
            preferences,
        } = collaborators;
        let config = Config::load(preferences.as_ref());
        info!(?config, "mode controller configured");

        Self {
            config,
            settings,
            data,
            location,
            preferences,
            alarms: AlarmCoordinator::new(alarms),
            scheduler: PeriodicScheduler::new(
                events,
                settings.tick_delay(),
                settings.ack_timeout(),
            ),
            clock: UpdateClock::new(),
            resource,
            last_parameters: None,
            forced_for: None,
            last_signal: None,
            mode: None,
        }
    }

    /// Derives the mode for `signal` and reconciles the scheduling primitives
    /// with it. Resources that do not belong to the target mode are torn down
    /// before the target's own resources are established. Repeated calls with
    /// the same inputs change nothing.
    pub fn evaluate(&mut self, signal: RuntimeSignal) -> OperatingMode {
        if self.last_signal.replace(signal) != Some(signal) {
            self.forced_for = None;
        }
        let target = OperatingMode::derive(&self.config, signal);
        let mut actions: Vec<&'static str> = Vec::new();

        match target {
            OperatingMode::BackgroundAlarm => {
                actions.push("enable_bg");
                self.scheduler.stop();
                self.location.enable_background_power_mode();
                self.location.start();
                self.alarms.ensure(
                    self.config.background_period_seconds(),
                    signal.has_active_consumer,
                );
            }
            OperatingMode::Idle => {
                actions.push("disable_bg");
                self.scheduler.stop();
                self.alarms.discard();
                self.location.shutdown();
            }
            OperatingMode::ForegroundRealtime => {
                self.alarms.discard();
                actions.push("realtime_data");
                if !self.scheduler.is_active() {
                    actions.push("restart_handler");
                    self.scheduler.start();
                }
                self.location.start();
                self.location.disable_background_power_mode();
            }
            OperatingMode::HistoricSnapshot => {
                self.alarms.discard();
                actions.push("historic_data");
                self.scheduler.stop();
                if self.catch_up_if_stale() {
                    actions.push("force_update");
                }
                self.location.start();
                self.location.disable_background_power_mode();
            }
        }

        if self.mode != Some(target) {
            let label: &'static str = target.into();
            counter!("scheduler_mode_transitions_total", "mode" => label).increment(1);
            info!(from = ?self.mode, to = %target, "operating mode changed");
            self.mode = Some(target);
        }
        debug!(mode = %target, actions = %actions.join(", "), "service mode configured");
        target
    }

    /// Issues at most one forced refresh per divergent set of active
    /// parameters until the signal or the config changes.
    fn catch_up_if_stale(&mut self) -> bool {
        let Some(last) = &self.last_parameters else {
            return false;
        };
        let active = self.data.active_parameters();
        if *last == active || self.forced_for.as_ref() == Some(&active) {
            return false;
        }

        self.data.request_refresh_all();
        counter!("scheduler_refresh_requests_total", "path" => "catch_up").increment(1);
        self.forced_for = Some(active);
        true
    }

    pub fn on_consumer_attachment_changed(&mut self) -> OperatingMode {
        self.evaluate(self.data.signal())
    }

    pub fn on_config_changed(&mut self, key: PreferenceKey) -> OperatingMode {
        let changed = self.config.apply(key, self.preferences.as_ref());
        debug!(%key, changed, config = ?self.config, "preference changed");
        self.forced_for = None;

        if key == PreferenceKey::BackgroundQueryPeriod {
            // a fresh registration picks up the new interval
            self.alarms.discard();
            self.alarms
                .configure_boot_trigger(self.config.background_period_seconds() > 0);
        }
        self.evaluate(self.data.signal())
    }

    /// Completion callback from the data layer.
    pub fn on_refresh_completed(&mut self, parameters: Parameters) -> OperatingMode {
        debug!(parameters = parameters.as_str(), "refresh completed");
        self.last_parameters = Some(parameters);
        self.forced_for = None;
        self.clock.record_refresh(Instant::now());
        self.scheduler.acknowledge();
        self.resource.release();
        self.evaluate(self.data.signal())
    }

    /// Entry point for the repeating background trigger. Skips the cycle
    /// entirely when a previous one still holds the resource.
    pub fn on_alarm_fired(&mut self) {
        if !self.resource.try_acquire(self.settings.resource_timeout()) {
            debug!("alarm skipped, previous cycle still holds the resource");
            return;
        }

        self.scheduler.stop();
        let signal = self.data.signal();
        if signal.has_active_consumer && self.config.background_alarm_enabled() {
            debug!("alarm triggered background refresh");
            counter!("scheduler_refresh_requests_total", "path" => "background").increment(1);
            self.data.request_background_refresh();
        } else {
            self.resource.release();
            self.evaluate(signal);
        }
    }

    pub fn tick(&mut self, generation: u64) {
        let outcome = self.scheduler.tick(
            generation,
            TickContext {
                data: self.data.as_ref(),
                clock: &self.clock,
                resource: self.resource.as_ref(),
                period_seconds: self.config.foreground_period_seconds(),
                now: Instant::now(),
            },
        );

        if outcome == TickOutcome::Delegated {
            self.evaluate(self.data.signal());
        }
    }

    /// Forces an immediate refresh: a running tick loop restarts with a due
    /// clock, otherwise the data layer is asked directly.
    pub fn reload_data(&mut self) {
        self.evaluate(self.data.signal());
        if self.scheduler.is_active() {
            debug!("reload restarts the tick loop");
            self.clock.restart();
            self.scheduler.start();
        } else {
            counter!("scheduler_refresh_requests_total", "path" => "reload").increment(1);
            self.data.request_refresh_all();
        }
    }

    /// Tears down timers and alarms and drops any held resource.
    pub fn shutdown(&mut self) {
        self.scheduler.stop();
        self.alarms.discard();
        self.resource.release();
        info!("mode controller shut down");
    }

    pub fn mode(&self) -> Option<OperatingMode> {
        self.mode
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_ticking(&self) -> bool {
        self.scheduler.is_active()
    }

    pub fn alarm_registration(&self) -> Option<&AlarmRegistration> {
        self.alarms.registration()
    }

    pub fn last_parameters(&self) -> Option<&Parameters> {
        self.last_parameters.as_ref()
    }

    pub fn clock(&self) -> &UpdateClock {
        &self.clock
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            mode: self.mode,
            config: self.config,
            ticking: self.scheduler.is_active(),
            alarm_period_seconds: self
                .alarms
                .registration()
                .map(AlarmRegistration::period_seconds),
            resource_held: self.resource.is_held(),
            last_parameters: self.last_parameters.clone().map(Parameters::into_inner),
        }
    }
}
