//! Log-only collaborators for running the scheduler without a real data
//! layer or location service. Every refresh request is acknowledged at once.

use std::{
    collections::BTreeSet,
    sync::atomic::{AtomicBool, Ordering},
};

use refresh_domain::{DataChannel, DataLayer, LocationControl, Parameters, RefreshStatus};
use tracing::{debug, info, warn};

use crate::service::ServiceHandle;

pub struct LoggingDataLayer {
    events: ServiceHandle,
    parameters: Parameters,
    consumer: AtomicBool,
    live: AtomicBool,
}

impl LoggingDataLayer {
    pub fn new(events: ServiceHandle, parameters: Parameters) -> Self {
        Self {
            events,
            parameters,
            consumer: AtomicBool::new(false),
            live: AtomicBool::new(true),
        }
    }

    pub fn set_consumer(&self, attached: bool) {
        self.consumer.store(attached, Ordering::SeqCst);
    }

    pub fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::SeqCst);
    }

    fn acknowledge(&self) {
        if let Err(err) = self.events.on_refresh_completed(self.parameters.clone()) {
            warn!(?err, "refresh acknowledgement dropped");
        }
    }
}

impl DataLayer for LoggingDataLayer {
    fn has_active_consumer(&self) -> bool {
        self.consumer.load(Ordering::SeqCst)
    }

    fn is_live_source(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn active_parameters(&self) -> Parameters {
        self.parameters.clone()
    }

    fn request_refresh(&self, channels: &BTreeSet<DataChannel>) {
        let channels: Vec<&'static str> = channels.iter().map(|channel| (*channel).into()).collect();
        info!(?channels, "refresh requested");
        self.acknowledge();
    }

    fn request_refresh_all(&self) {
        info!("full refresh requested");
        self.acknowledge();
    }

    fn request_background_refresh(&self) {
        info!("background refresh requested");
        self.acknowledge();
    }

    fn publish_status(&self, status: &RefreshStatus) {
        match serde_json::to_string(status) {
            Ok(json) => debug!(status = %json, "status"),
            Err(err) => warn!(?err, "status not serializable"),
        }
    }
}

#[derive(Debug, Default)]
pub struct LoggingLocation;

impl LocationControl for LoggingLocation {
    fn enable_background_power_mode(&self) {
        debug!("location: background power mode on");
    }

    fn disable_background_power_mode(&self) {
        debug!("location: background power mode off");
    }

    fn start(&self) {
        debug!("location: start");
    }

    fn shutdown(&self) {
        debug!("location: shutdown");
    }
}
