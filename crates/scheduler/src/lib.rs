//! Background data-refresh scheduler.
//!
//! [`ModeController`] decides between foreground polling, alarm-driven
//! background refreshes and historic one-shots; [`RefreshService`] feeds it
//! from a single event queue so decisions never race the tick loop. The
//! binary in `main.rs` runs the service against log-only collaborators for
//! development use.

pub mod alarm;
pub mod application;
pub mod clock;
pub mod controller;
pub mod dry_run;
pub mod periodic;
pub mod resource;
pub mod service;

#[cfg(test)]
mod testing;

pub use alarm::{AlarmCoordinator, AlarmRegistration, TokioAlarmSubstrate};
pub use clock::UpdateClock;
pub use controller::{Collaborators, ModeController};
pub use periodic::{PeriodicScheduler, TickContext, TickOutcome};
pub use resource::ExclusiveResource;
pub use service::{
    RefreshService, SchedulerEvent, SchedulerSnapshot, ServiceError, ServiceHandle, ServiceInbox,
};
