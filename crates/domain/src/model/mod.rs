//! Data structures shared by the scheduler core and its collaborators.

use serde::Serialize;
use strum_macros::{Display, IntoStaticStr};

use crate::config::Config;

/// Mutually exclusive scheduling strategy. Derived on demand, never stored as
/// the source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OperatingMode {
    Idle,
    ForegroundRealtime,
    BackgroundAlarm,
    HistoricSnapshot,
}

impl OperatingMode {
    /// Picks the mode for `(config, signal)`. An active consumer wins over the
    /// live/historic distinction.
    pub fn derive(config: &Config, signal: RuntimeSignal) -> Self {
        if signal.has_active_consumer {
            if config.background_alarm_enabled() {
                OperatingMode::BackgroundAlarm
            } else {
                OperatingMode::Idle
            }
        } else if signal.is_live_source {
            OperatingMode::ForegroundRealtime
        } else {
            OperatingMode::HistoricSnapshot
        }
    }
}

/// Observations supplied by the data layer for a single decision cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuntimeSignal {
    pub has_active_consumer: bool,
    pub is_live_source: bool,
}

impl RuntimeSignal {
    pub fn new(has_active_consumer: bool, is_live_source: bool) -> Self {
        Self {
            has_active_consumer,
            is_live_source,
        }
    }
}

/// Opaque snapshot of the data-layer parameters behind a refresh. Only ever
/// compared for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameters(String);

impl Parameters {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<&str> for Parameters {
    fn from(value: &str) -> Self {
        Self::new(value.to_owned())
    }
}

/// Data sets the data layer can refresh independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum DataChannel {
    Events,
}

/// Countdown published on every foreground tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RefreshStatus {
    pub remaining_seconds: u64,
    pub period_seconds: u32,
}
