//! Recording collaborators shared by the unit and scenario tests.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use refresh_domain::{
    AlarmError, AlarmSubstrate, AlarmToken, DataChannel, DataLayer, LocationControl, Parameters,
    PreferenceKey, PreferenceStore, RefreshStatus,
};

use crate::service::{SchedulerEvent, ServiceInbox};

#[derive(Default)]
pub struct MockDataLayer {
    consumer: AtomicBool,
    live: AtomicBool,
    active: Mutex<Option<Parameters>>,
    refreshes: AtomicUsize,
    full_refreshes: AtomicUsize,
    background_refreshes: AtomicUsize,
    channels: Mutex<Vec<BTreeSet<DataChannel>>>,
    statuses: Mutex<Vec<RefreshStatus>>,
}

impl MockDataLayer {
    pub fn live() -> Self {
        let data = Self::default();
        data.set_live(true);
        data
    }

    pub fn historic() -> Self {
        Self::default()
    }

    pub fn set_consumer(&self, value: bool) {
        self.consumer.store(value, Ordering::SeqCst);
    }

    pub fn set_live(&self, value: bool) {
        self.live.store(value, Ordering::SeqCst);
    }

    pub fn set_active_parameters(&self, parameters: &str) {
        *self.active.lock().unwrap() = Some(Parameters::from(parameters));
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn full_refreshes(&self) -> usize {
        self.full_refreshes.load(Ordering::SeqCst)
    }

    pub fn background_refreshes(&self) -> usize {
        self.background_refreshes.load(Ordering::SeqCst)
    }

    pub fn channels(&self) -> Vec<BTreeSet<DataChannel>> {
        self.channels.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<RefreshStatus> {
        self.statuses.lock().unwrap().clone()
    }
}

impl DataLayer for MockDataLayer {
    fn has_active_consumer(&self) -> bool {
        self.consumer.load(Ordering::SeqCst)
    }

    fn is_live_source(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn active_parameters(&self) -> Parameters {
        self.active
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Parameters::from("default"))
    }

    fn request_refresh(&self, channels: &BTreeSet<DataChannel>) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        self.channels.lock().unwrap().push(channels.clone());
    }

    fn request_refresh_all(&self) {
        self.full_refreshes.fetch_add(1, Ordering::SeqCst);
    }

    fn request_background_refresh(&self) {
        self.background_refreshes.fetch_add(1, Ordering::SeqCst);
    }

    fn publish_status(&self, status: &RefreshStatus) {
        self.statuses.lock().unwrap().push(*status);
    }
}

/// Ordered log shared between mocks so tests can assert cross-collaborator
/// ordering.
pub type Journal = Arc<Mutex<Vec<String>>>;

/// Records every location call in order.
#[derive(Default)]
pub struct MockLocation {
    calls: Mutex<Vec<&'static str>>,
    journal: Option<Journal>,
}

impl MockLocation {
    pub fn with_journal(journal: Journal) -> Self {
        Self {
            calls: Mutex::default(),
            journal: Some(journal),
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_power_mode(&self) -> Option<&'static str> {
        self.calls()
            .into_iter()
            .rev()
            .find(|call| call.ends_with("background_power_mode"))
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
        if let Some(journal) = &self.journal {
            journal.lock().unwrap().push(call.to_string());
        }
    }
}

impl LocationControl for MockLocation {
    fn enable_background_power_mode(&self) {
        self.record("enable_background_power_mode");
    }

    fn disable_background_power_mode(&self) {
        self.record("disable_background_power_mode");
    }

    fn start(&self) {
        self.record("start");
    }

    fn shutdown(&self) {
        self.record("shutdown");
    }
}

/// Alarm substrate that only bookkeeps registrations. The journal keeps
/// registrations and cancellations in call order. With a watched inbox, ticks
/// queued so far are journalled before each cancellation.
#[derive(Default)]
pub struct MockAlarms {
    next_id: AtomicU64,
    fail_next: AtomicBool,
    registered: Mutex<Vec<Duration>>,
    live: Mutex<Vec<AlarmToken>>,
    journal: Journal,
    cancelled: AtomicUsize,
    boot_trigger: Mutex<Option<bool>>,
    ticks: Mutex<Option<ServiceInbox>>,
}

impl MockAlarms {
    pub fn fail_next_registration(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn registered(&self) -> Vec<Duration> {
        self.registered.lock().unwrap().clone()
    }

    pub fn live_registrations(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    pub fn journal_handle(&self) -> Journal {
        Arc::clone(&self.journal)
    }

    pub fn boot_trigger(&self) -> Option<bool> {
        *self.boot_trigger.lock().unwrap()
    }

    pub fn watch_ticks(&self, inbox: ServiceInbox) {
        *self.ticks.lock().unwrap() = Some(inbox);
    }

    /// Moves queued ticks from the watched inbox into the journal.
    pub fn journal_ticks(&self) {
        let mut ticks = self.ticks.lock().unwrap();
        let Some(inbox) = ticks.as_mut() else {
            return;
        };
        while let Ok(event) = inbox.try_recv() {
            if matches!(event, SchedulerEvent::Tick(_)) {
                self.journal.lock().unwrap().push("tick".to_string());
            }
        }
    }
}

impl AlarmSubstrate for MockAlarms {
    fn register_repeating(&self, interval: Duration) -> Result<AlarmToken, AlarmError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(AlarmError::Unavailable);
        }
        let token = AlarmToken::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.registered.lock().unwrap().push(interval);
        self.live.lock().unwrap().push(token);
        self.journal
            .lock()
            .unwrap()
            .push(format!("register:{}", interval.as_secs()));
        Ok(token)
    }

    fn cancel(&self, token: AlarmToken) {
        self.journal_ticks();
        self.cancelled.fetch_add(1, Ordering::SeqCst);
        self.live.lock().unwrap().retain(|live| *live != token);
        self.journal.lock().unwrap().push("cancel".to_string());
    }

    fn configure_boot_trigger(&self, enabled: bool) {
        *self.boot_trigger.lock().unwrap() = Some(enabled);
    }
}

#[derive(Default)]
pub struct MapPreferences(Mutex<HashMap<PreferenceKey, String>>);

impl MapPreferences {
    pub fn with(entries: &[(PreferenceKey, &str)]) -> Self {
        let store = Self::default();
        for (key, value) in entries {
            store.set(*key, value);
        }
        store
    }

    pub fn set(&self, key: PreferenceKey, value: &str) {
        self.0.lock().unwrap().insert(key, value.to_string());
    }
}

impl PreferenceStore for MapPreferences {
    fn read(&self, key: PreferenceKey) -> Option<String> {
        self.0.lock().unwrap().get(&key).cloned()
    }
}
