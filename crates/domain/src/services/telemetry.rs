use std::{
    env,
    net::{AddrParseError, SocketAddr},
    sync::Arc,
};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing_subscriber::{
    filter::ParseError, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError,
    EnvFilter,
};

use crate::config::hydrate_env_file;

const DEFAULT_LOG_FILTER: &str = "info";
/// Prefix shared by every metric the scheduler records.
pub const METRIC_PREFIX: &str = "scheduler_";

static SUBSCRIBER_INSTALLED: OnceCell<()> = OnceCell::new();
static RECORDER: OnceCell<Arc<PrometheusHandle>> = OnceCell::new();

/// Log filter and optional Prometheus listener for the scheduler process,
/// read from `<PREFIX>_LOG_FILTER` and `<PREFIX>_METRICS_ADDRESS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    log_filter: String,
    metrics_listener: Option<SocketAddr>,
}

impl TelemetryConfig {
    pub fn new(log_filter: impl Into<String>, metrics_listener: Option<SocketAddr>) -> Self {
        Self {
            log_filter: log_filter.into(),
            metrics_listener,
        }
    }

    /// A blank address disables the listener; an unparsable one is an error
    /// rather than a silently missing endpoint.
    pub fn from_env(prefix: &str) -> Result<Self, TelemetryError> {
        let _ = hydrate_env_file();
        let prefix = prefix.trim().to_ascii_uppercase();

        let log_filter = env::var(format!("{prefix}_LOG_FILTER"))
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let metrics_listener = match env::var(format!("{prefix}_METRICS_ADDRESS")) {
            Ok(raw) if !raw.trim().is_empty() => {
                let address = raw.trim();
                Some(address.parse().map_err(|source| {
                    TelemetryError::InvalidMetricsAddress {
                        address: address.to_string(),
                        source,
                    }
                })?)
            }
            _ => None,
        };

        Ok(Self::new(log_filter, metrics_listener))
    }

    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    pub fn metrics_listener(&self) -> Option<SocketAddr> {
        self.metrics_listener
    }
}

/// Handle onto the installed recorder. Lets the binary dump the scheduler's
/// counters when it stops.
#[derive(Clone)]
pub struct TelemetryGuard {
    recorder: Arc<PrometheusHandle>,
    listener: Option<SocketAddr>,
}

impl TelemetryGuard {
    pub fn metrics_listener(&self) -> Option<SocketAddr> {
        self.listener
    }

    pub fn render_metrics(&self) -> String {
        self.recorder.render()
    }

    /// Sample lines of the scheduler's own series, without HELP/TYPE
    /// comments or metrics recorded by other crates.
    pub fn scheduler_samples(&self) -> Vec<String> {
        scheduler_samples(&self.render_metrics())
            .map(str::to_owned)
            .collect()
    }
}

fn scheduler_samples(rendered: &str) -> impl Iterator<Item = &str> {
    rendered
        .lines()
        .filter(|line| line.starts_with(METRIC_PREFIX))
}

/// Installs the tracing subscriber and the Prometheus recorder. Safe to call
/// more than once; later calls reuse what the first one installed.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    install_tracing(config.log_filter())?;
    let recorder = RECORDER
        .get_or_try_init(|| install_recorder(config.metrics_listener()))?
        .clone();

    Ok(TelemetryGuard {
        recorder,
        listener: config.metrics_listener(),
    })
}

fn install_tracing(filter: &str) -> Result<(), TelemetryError> {
    if SUBSCRIBER_INSTALLED.get().is_some() {
        return Ok(());
    }

    let filter = EnvFilter::try_new(filter)?;
    if SUBSCRIBER_INSTALLED.set(()).is_ok() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }
    Ok(())
}

fn install_recorder(listener: Option<SocketAddr>) -> Result<Arc<PrometheusHandle>, TelemetryError> {
    let builder = match listener {
        Some(address) => PrometheusBuilder::new().with_http_listener(address),
        None => PrometheusBuilder::new(),
    };
    Ok(Arc::new(builder.install_recorder()?))
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    InvalidLogFilter(#[from] ParseError),
    #[error("failed to install tracing subscriber: {0}")]
    Tracing(#[from] TryInitError),
    #[error("invalid metrics address `{address}`: {source}")]
    InvalidMetricsAddress {
        address: String,
        #[source]
        source: AddrParseError,
    },
    #[error("failed to install metrics recorder: {0}")]
    Metrics(#[from] BuildError),
}
