use std::{io, sync::Arc};

use refresh_domain::{
    config::ConfigError,
    services::telemetry::{init_telemetry, TelemetryConfig, TelemetryError},
    EnvPreferences, Parameters, SchedulerSettings,
};
use thiserror::Error;
use tracing::info;

use crate::{
    alarm::TokioAlarmSubstrate,
    controller::Collaborators,
    dry_run::{LoggingDataLayer, LoggingLocation},
    resource::ExclusiveResource,
    service::{RefreshService, ServiceError},
};

/// Boots telemetry and the refresh service with log-only collaborators, then
/// waits for Ctrl-C and shuts the service down.
pub async fn run() -> Result<(), BootstrapError> {
    let settings = SchedulerSettings::load_from_env()?;
    let telemetry = init_telemetry(&TelemetryConfig::from_env("SCHEDULER")?)?;
    let preferences = Arc::new(EnvPreferences::load()?);

    let resource = Arc::new(ExclusiveResource::default());

    let (handle, task) = RefreshService::spawn(settings, resource.clone(), |handle| Collaborators {
        data: Arc::new(LoggingDataLayer::new(
            handle.clone(),
            Parameters::from("dry-run"),
        )),
        location: Arc::new(LoggingLocation),
        alarms: Arc::new(TokioAlarmSubstrate::new(handle.clone())),
        preferences,
    });
    info!(
        ?settings,
        metrics = ?telemetry.metrics_listener(),
        "refresh service running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    handle.shutdown()?;
    let controller = task
        .await
        .map_err(|err| BootstrapError::Join(err.to_string()))?;
    info!(
        mode = ?controller.mode(),
        resource_held = resource.is_held(),
        metrics = ?telemetry.scheduler_samples(),
        "refresh service exited"
    );
    Ok(())
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("service error: {0}")]
    Service(#[from] ServiceError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("service task failed: {0}")]
    Join(String),
}
