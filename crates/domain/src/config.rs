//! Environment-driven configuration plus the preference-backed scheduling
//! config that the mode controller owns.

use std::{env, time::Duration};

use serde::Serialize;
use strum_macros::{Display, EnumString, IntoStaticStr};
use thiserror::Error;
use tracing::warn;

/// Preference keys whose change notifications reach the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum PreferenceKey {
    QueryPeriod,
    BackgroundQueryPeriod,
    AlertEnabled,
}

impl PreferenceKey {
    pub const ALL: [PreferenceKey; 3] = [
        PreferenceKey::QueryPeriod,
        PreferenceKey::AlertEnabled,
        PreferenceKey::BackgroundQueryPeriod,
    ];

    fn env_var(self) -> &'static str {
        match self {
            PreferenceKey::QueryPeriod => "REFRESH_QUERY_PERIOD",
            PreferenceKey::BackgroundQueryPeriod => "REFRESH_BACKGROUND_QUERY_PERIOD",
            PreferenceKey::AlertEnabled => "REFRESH_ALERT_ENABLED",
        }
    }
}

/// Read-only view onto persisted user preferences.
pub trait PreferenceStore: Send + Sync {
    fn read(&self, key: PreferenceKey) -> Option<String>;
}

/// Preferences sourced from `REFRESH_*` process variables (after `.env`
/// hydration). Values are re-read on every lookup so a change notification
/// observes the current environment.
#[derive(Debug, Clone, Default)]
pub struct EnvPreferences;

impl EnvPreferences {
    pub fn load() -> Result<Self, ConfigError> {
        hydrate_env_file()?;
        Ok(Self)
    }
}

impl PreferenceStore for EnvPreferences {
    fn read(&self, key: PreferenceKey) -> Option<String> {
        get_optional_var(key.env_var())
    }
}

/// Scheduling configuration derived from preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Config {
    foreground_period_seconds: u32,
    background_period_seconds: u32,
    alert_monitoring_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            foreground_period_seconds: 60,
            background_period_seconds: 0,
            alert_monitoring_enabled: false,
        }
    }
}

impl Config {
    pub fn new(
        foreground_period_seconds: u32,
        background_period_seconds: u32,
        alert_monitoring_enabled: bool,
    ) -> Self {
        Self {
            foreground_period_seconds,
            background_period_seconds,
            alert_monitoring_enabled,
        }
    }

    /// Builds the startup config by reading every known key from `store`.
    pub fn load(store: &dyn PreferenceStore) -> Self {
        let mut config = Self::default();
        for key in PreferenceKey::ALL {
            config.apply(key, store);
        }
        config
    }

    /// Re-reads a single key. Returns `true` when the stored value differs
    /// from what was held before.
    pub fn apply(&mut self, key: PreferenceKey, store: &dyn PreferenceStore) -> bool {
        let raw = store.read(key);
        let raw = raw.as_deref();
        let before = *self;
        let defaults = Self::default();
        match key {
            PreferenceKey::QueryPeriod => {
                self.foreground_period_seconds =
                    parse_or(key, raw, defaults.foreground_period_seconds);
            }
            PreferenceKey::BackgroundQueryPeriod => {
                self.background_period_seconds =
                    parse_or(key, raw, defaults.background_period_seconds);
            }
            PreferenceKey::AlertEnabled => {
                self.alert_monitoring_enabled =
                    parse_or(key, raw, defaults.alert_monitoring_enabled);
            }
        }
        before != *self
    }

    pub fn foreground_period_seconds(&self) -> u32 {
        self.foreground_period_seconds
    }

    pub fn background_period_seconds(&self) -> u32 {
        self.background_period_seconds
    }

    pub fn alert_monitoring_enabled(&self) -> bool {
        self.alert_monitoring_enabled
    }

    /// Alarm-driven background refreshes need alerts on and a non-zero period.
    pub fn background_alarm_enabled(&self) -> bool {
        self.alert_monitoring_enabled && self.background_period_seconds > 0
    }
}

fn parse_or<T>(key: PreferenceKey, raw: Option<&str>, default: T) -> T
where
    T: std::str::FromStr,
{
    match raw {
        None => default,
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            warn!(%key, value, "unparseable preference value, using default");
            default
        }),
    }
}

/// Timing knobs for the scheduler loop itself, loaded from optional
/// `REFRESH_*_MS` variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    tick_delay: Duration,
    resource_timeout: Duration,
    ack_timeout: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_delay: Duration::from_millis(1_000),
            resource_timeout: Duration::from_millis(5_000),
            ack_timeout: Duration::from_millis(10_000),
        }
    }
}

impl SchedulerSettings {
    pub fn new(tick_delay: Duration, resource_timeout: Duration, ack_timeout: Duration) -> Self {
        Self {
            tick_delay,
            resource_timeout,
            ack_timeout,
        }
    }

    /// Loads overrides by hydrating `.env` (if present). Absent entries keep
    /// their defaults; malformed entries surface as `ConfigError`.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;
        let defaults = Self::default();

        Ok(Self {
            tick_delay: get_millis_var("REFRESH_TICK_DELAY_MS")?.unwrap_or(defaults.tick_delay),
            resource_timeout: get_millis_var("REFRESH_RESOURCE_TIMEOUT_MS")?
                .unwrap_or(defaults.resource_timeout),
            ack_timeout: get_millis_var("REFRESH_ACK_TIMEOUT_MS")?
                .unwrap_or(defaults.ack_timeout),
        })
    }

    /// Delay between two foreground ticks.
    pub fn tick_delay(&self) -> Duration {
        self.tick_delay
    }

    /// Expiry applied to every exclusive-resource acquisition.
    pub fn resource_timeout(&self) -> Duration {
        self.resource_timeout
    }

    /// How long a requested foreground refresh may stay unacknowledged before
    /// the tick loop asks again.
    pub fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }
}

fn get_millis_var(key: &'static str) -> Result<Option<Duration>, ConfigError> {
    get_optional_var(key)
        .map(|value| {
            value
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|source| ConfigError::InvalidNumber { key, source })
        })
        .transpose()
}

fn get_optional_var(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("REFRESH_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::HashMap, str::FromStr, sync::Mutex};

    static ENV_GUARD: Mutex<()> = Mutex::new(());

    #[derive(Default)]
    struct MapStore(HashMap<PreferenceKey, String>);

    impl PreferenceStore for MapStore {
        fn read(&self, key: PreferenceKey) -> Option<String> {
            self.0.get(&key).cloned()
        }
    }

    #[test]
    fn empty_store_yields_defaults() {
        let config = Config::load(&MapStore::default());
        assert_eq!(config, Config::new(60, 0, false));
        assert!(!config.background_alarm_enabled());
    }

    #[test]
    fn apply_reports_changes() {
        let mut store = MapStore::default();
        let mut config = Config::load(&store);
        store
            .0
            .insert(PreferenceKey::BackgroundQueryPeriod, "300".into());

        assert!(config.apply(PreferenceKey::BackgroundQueryPeriod, &store));
        assert!(!config.apply(PreferenceKey::BackgroundQueryPeriod, &store));
        assert_eq!(config.background_period_seconds(), 300);
    }

    #[test]
    fn garbage_values_fall_back_to_defaults() {
        let mut store = MapStore::default();
        store.0.insert(PreferenceKey::QueryPeriod, "-5".into());
        store.0.insert(PreferenceKey::AlertEnabled, "yes".into());

        let config = Config::load(&store);
        assert_eq!(config.foreground_period_seconds(), 60);
        assert!(!config.alert_monitoring_enabled());
    }

    #[test]
    fn background_alarm_needs_alerts_and_period() {
        assert!(Config::new(60, 300, true).background_alarm_enabled());
        assert!(!Config::new(60, 0, true).background_alarm_enabled());
        assert!(!Config::new(60, 300, false).background_alarm_enabled());
    }

    #[test]
    fn preference_keys_parse_from_snake_case() {
        assert_eq!(
            PreferenceKey::from_str("background_query_period").unwrap(),
            PreferenceKey::BackgroundQueryPeriod
        );
        assert_eq!(PreferenceKey::AlertEnabled.to_string(), "alert_enabled");
        assert!(PreferenceKey::from_str("raster_size").is_err());
    }

    #[test]
    fn env_preferences_read_process_vars() {
        let _guard = ENV_GUARD.lock().unwrap();
        env::set_var("REFRESH_SKIP_DOTENV", "1");
        env::set_var("REFRESH_QUERY_PERIOD", " 30 ");
        env::set_var("REFRESH_ALERT_ENABLED", "true");
        env::remove_var("REFRESH_BACKGROUND_QUERY_PERIOD");

        let store = EnvPreferences::load().expect("preferences load");
        let config = Config::load(&store);
        assert_eq!(config, Config::new(30, 0, true));

        env::remove_var("REFRESH_QUERY_PERIOD");
        env::remove_var("REFRESH_ALERT_ENABLED");
    }

    #[test]
    fn scheduler_settings_use_defaults_and_reject_garbage() {
        let _guard = ENV_GUARD.lock().unwrap();
        env::set_var("REFRESH_SKIP_DOTENV", "1");
        env::remove_var("REFRESH_TICK_DELAY_MS");
        env::remove_var("REFRESH_ACK_TIMEOUT_MS");
        env::set_var("REFRESH_RESOURCE_TIMEOUT_MS", "2500");

        let settings = SchedulerSettings::load_from_env().expect("settings load");
        assert_eq!(settings.tick_delay(), Duration::from_secs(1));
        assert_eq!(settings.resource_timeout(), Duration::from_millis(2_500));

        env::set_var("REFRESH_TICK_DELAY_MS", "soon");
        let err = SchedulerSettings::load_from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidNumber {
                key: "REFRESH_TICK_DELAY_MS",
                ..
            }
        ));

        env::remove_var("REFRESH_TICK_DELAY_MS");
        env::remove_var("REFRESH_RESOURCE_TIMEOUT_MS");
    }
}
