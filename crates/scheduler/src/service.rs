use std::{str::FromStr, sync::Arc};

use refresh_domain::{Config, OperatingMode, Parameters, PreferenceKey, SchedulerSettings};
use serde::Serialize;
use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info};

use crate::{
    controller::{Collaborators, ModeController},
    resource::ExclusiveResource,
};

/// Everything that can change the scheduler's decision, funnelled through
/// one queue so decisions and ticks never interleave.
#[derive(Debug)]
pub enum SchedulerEvent {
    ConsumerAttachmentChanged,
    ConfigChanged(PreferenceKey),
    RefreshCompleted(Parameters),
    AlarmFired,
    Tick(u64),
    Reload,
    Snapshot(oneshot::Sender<SchedulerSnapshot>),
    Shutdown,
}

/// Point-in-time view of the controller, e.g. for a status screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerSnapshot {
    pub mode: Option<OperatingMode>,
    pub config: Config,
    pub ticking: bool,
    pub alarm_period_seconds: Option<u32>,
    pub resource_held: bool,
    pub last_parameters: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("scheduler event loop is no longer running")]
    Closed,
}

/// Cloneable entry point handed to whatever owns the process lifecycle.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    tx: mpsc::UnboundedSender<SchedulerEvent>,
}

pub type ServiceInbox = mpsc::UnboundedReceiver<SchedulerEvent>;

impl ServiceHandle {
    pub fn channel() -> (Self, ServiceInbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn on_consumer_attachment_changed(&self) -> Result<(), ServiceError> {
        self.post(SchedulerEvent::ConsumerAttachmentChanged)
    }

    pub fn on_config_changed(&self, key: PreferenceKey) -> Result<(), ServiceError> {
        self.post(SchedulerEvent::ConfigChanged(key))
    }

    /// String-keyed variant for preference listeners. Keys the scheduler
    /// does not care about are ignored.
    pub fn on_preference_changed(&self, key: &str) -> Result<(), ServiceError> {
        match PreferenceKey::from_str(key) {
            Ok(key) => self.on_config_changed(key),
            Err(_) => {
                debug!(key, "ignoring unrelated preference change");
                Ok(())
            }
        }
    }

    pub fn on_refresh_completed(&self, parameters: Parameters) -> Result<(), ServiceError> {
        self.post(SchedulerEvent::RefreshCompleted(parameters))
    }

    pub fn on_alarm_fired(&self) -> Result<(), ServiceError> {
        self.post(SchedulerEvent::AlarmFired)
    }

    pub fn reload_data(&self) -> Result<(), ServiceError> {
        self.post(SchedulerEvent::Reload)
    }

    pub fn shutdown(&self) -> Result<(), ServiceError> {
        self.post(SchedulerEvent::Shutdown)
    }

    pub async fn snapshot(&self) -> Result<SchedulerSnapshot, ServiceError> {
        let (reply, response) = oneshot::channel();
        self.post(SchedulerEvent::Snapshot(reply))?;
        response.await.map_err(|_| ServiceError::Closed)
    }

    pub(crate) fn post(&self, event: SchedulerEvent) -> Result<(), ServiceError> {
        self.tx.send(event).map_err(|_| ServiceError::Closed)
    }
}

/// Single consumer of [`SchedulerEvent`]s; owns the controller outright.
pub struct RefreshService {
    controller: ModeController,
    inbox: ServiceInbox,
}

impl RefreshService {
    pub fn new(controller: ModeController, inbox: ServiceInbox) -> Self {
        Self { controller, inbox }
    }

    /// Wires a controller around freshly built collaborators and spawns the
    /// event loop. `build` receives the handle so collaborators that report
    /// back (alarm substrates, data layers) can post events. `resource` is
    /// shared with whoever else contends for it.
    pub fn spawn<F>(
        settings: SchedulerSettings,
        resource: Arc<ExclusiveResource>,
        build: F,
    ) -> (ServiceHandle, JoinHandle<ModeController>)
    where
        F: FnOnce(&ServiceHandle) -> Collaborators,
    {
        let (handle, inbox) = ServiceHandle::channel();
        let collaborators = build(&handle);
        let controller = ModeController::new(collaborators, settings, resource, handle.clone());
        let task = tokio::spawn(Self::new(controller, inbox).run());
        (handle, task)
    }

    /// Evaluates once for the startup state, then drains events until
    /// `Shutdown` arrives. Returns the controller so owners can inspect the
    /// final state.
    pub async fn run(mut self) -> ModeController {
        self.controller.on_consumer_attachment_changed();

        while let Some(event) = self.inbox.recv().await {
            if !self.dispatch(event) {
                break;
            }
        }

        self.controller.shutdown();
        info!("refresh service stopped");
        self.controller
    }

    fn dispatch(&mut self, event: SchedulerEvent) -> bool {
        match event {
            SchedulerEvent::ConsumerAttachmentChanged => {
                self.controller.on_consumer_attachment_changed();
            }
            SchedulerEvent::ConfigChanged(key) => {
                self.controller.on_config_changed(key);
            }
            SchedulerEvent::RefreshCompleted(parameters) => {
                self.controller.on_refresh_completed(parameters);
            }
            SchedulerEvent::AlarmFired => self.controller.on_alarm_fired(),
            SchedulerEvent::Tick(generation) => self.controller.tick(generation),
            SchedulerEvent::Reload => self.controller.reload_data(),
            SchedulerEvent::Snapshot(reply) => {
                let _ = reply.send(self.controller.snapshot());
            }
            SchedulerEvent::Shutdown => return false,
        }
        true
    }
}
