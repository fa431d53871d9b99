use std::{collections::BTreeSet, time::Duration};

use thiserror::Error;

use crate::model::{DataChannel, Parameters, RefreshStatus, RuntimeSignal};

/// The data-retrieval layer. Every request is fire-and-forget; completion is
/// reported back through the scheduler's `on_refresh_completed` entry point.
pub trait DataLayer: Send + Sync {
    fn has_active_consumer(&self) -> bool;
    fn is_live_source(&self) -> bool;
    fn active_parameters(&self) -> Parameters;
    fn request_refresh(&self, channels: &BTreeSet<DataChannel>);
    fn request_refresh_all(&self);
    fn request_background_refresh(&self);

    fn publish_status(&self, _status: &RefreshStatus) {}

    /// Samples both observations for one decision cycle.
    fn signal(&self) -> RuntimeSignal {
        RuntimeSignal {
            has_active_consumer: self.has_active_consumer(),
            is_live_source: self.is_live_source(),
        }
    }
}

/// Location service power management.
pub trait LocationControl: Send + Sync {
    fn enable_background_power_mode(&self);
    fn disable_background_power_mode(&self);
    fn start(&self);
    fn shutdown(&self);
}

/// Handle to one repeating registration held by an [`AlarmSubstrate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlarmToken(u64);

impl AlarmToken {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// OS-level scheduling able to wake the process at a fixed interval.
pub trait AlarmSubstrate: Send + Sync {
    fn register_repeating(&self, interval: Duration) -> Result<AlarmToken, AlarmError>;
    fn cancel(&self, token: AlarmToken);

    /// Whether the alarm should be re-armed after a device restart.
    fn configure_boot_trigger(&self, _enabled: bool) {}
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AlarmError {
    #[error("alarm service unavailable")]
    Unavailable,
    #[error("alarm registration rejected: {0}")]
    Rejected(String),
}
