//! Domain-level building blocks shared by the scheduler core and binaries:
//! preference-backed configuration, operating-mode derivation, collaborator
//! boundaries and telemetry wiring.

pub mod collaborators;
pub mod config;
pub mod model;
pub mod services;

pub use collaborators::*;
pub use config::{
    ConfigError, Config, EnvPreferences, PreferenceKey, PreferenceStore, SchedulerSettings,
};
pub use model::*;
