//! Environment-level configuration.
//!
//! Everything here is a deployment constant, not runtime protocol. Values
//! are read once from the environment and fall back to the defaults below
//! when a variable is missing or does not parse.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default port for the remote store server.
pub const DEFAULT_PORT: u16 = 5000;

/// Default database path for the remote store server.
pub const DEFAULT_DB_PATH: &str = "sqlite:suraksha.db?mode=rwc";

/// Default base URL the app uses to reach the remote store.
pub const DEFAULT_API_BASE: &str = "http://localhost:5000";

pub const DEFAULT_POLICE_CODE: &str = "100";
pub const DEFAULT_AMBULANCE_CODE: &str = "108";

/// Quiet period after the last tap before a burst is classified.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(800);

/// Upper bound on a single evidence recording.
pub const DEFAULT_CAPTURE_CAP: Duration = Duration::from_secs(10);

/// Budget for a fresh fix while an alert is being handled.
pub const DEFAULT_FIX_TIMEOUT: Duration = Duration::from_secs(4);

/// Timeout of each fix in the background tracking stream.
pub const DEFAULT_TRACKING_TIMEOUT: Duration = Duration::from_secs(15);

/// Longest wait for the remote store to accept an alert.
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(8);

/// Per-request timeout of the HTTP clients (remote store, geocoder, relay).
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay between the SMS handoff and the dial handoff.
pub const DEFAULT_DIAL_DELAY: Duration = Duration::from_millis(1500);

/// GATT service exposed by the wearable trigger.
pub const WEARABLE_SERVICE_UUID: &str = "0000ffe0-0000-1000-8000-00805f9b34fb";

/// Characteristic the wearable notifies gestures on.
pub const WEARABLE_CHARACTERISTIC_UUID: &str = "0000ffe1-0000-1000-8000-00805f9b34fb";

/// Configuration of the remote store server binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub database_url: String,
    /// Fast2SMS API key. The relay is disabled without one.
    pub sms_api_key: Option<String>,
    /// Override for the Fast2SMS endpoint.
    pub sms_api_url: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            port: env_parse("SURAKSHA_PORT").unwrap_or(DEFAULT_PORT),
            database_url: env::var("SURAKSHA_DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DB_PATH.to_string()),
            sms_api_key: env_non_empty("FAST2SMS_API_KEY"),
            sms_api_url: env_non_empty("FAST2SMS_URL"),
        }
    }
}

/// Fixed service short-codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCodes {
    pub police: String,
    pub ambulance: String,
}

impl Default for ServiceCodes {
    fn default() -> Self {
        Self {
            police: DEFAULT_POLICE_CODE.to_string(),
            ambulance: DEFAULT_AMBULANCE_CODE.to_string(),
        }
    }
}

/// Configuration of the on-device alert core.
#[derive(Debug, Clone)]
pub struct AlertConfig {
    pub services: ServiceCodes,
    pub api_base: String,
    pub quiet_period: Duration,
    pub capture_cap: Duration,
    pub fix_timeout: Duration,
    pub tracking_timeout: Duration,
    pub submit_timeout: Duration,
    pub dial_delay: Duration,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            services: ServiceCodes::default(),
            api_base: DEFAULT_API_BASE.to_string(),
            quiet_period: DEFAULT_QUIET_PERIOD,
            capture_cap: DEFAULT_CAPTURE_CAP,
            fix_timeout: DEFAULT_FIX_TIMEOUT,
            tracking_timeout: DEFAULT_TRACKING_TIMEOUT,
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
            dial_delay: DEFAULT_DIAL_DELAY,
        }
    }
}

impl AlertConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            services: ServiceCodes {
                police: env_non_empty("SURAKSHA_POLICE_CODE").unwrap_or(defaults.services.police),
                ambulance: env_non_empty("SURAKSHA_AMBULANCE_CODE")
                    .unwrap_or(defaults.services.ambulance),
            },
            api_base: env_non_empty("SURAKSHA_API_BASE").unwrap_or(defaults.api_base),
            quiet_period: env_millis("SURAKSHA_QUIET_MS").unwrap_or(defaults.quiet_period),
            capture_cap: env_millis("SURAKSHA_CAPTURE_CAP_MS").unwrap_or(defaults.capture_cap),
            fix_timeout: env_millis("SURAKSHA_FIX_TIMEOUT_MS").unwrap_or(defaults.fix_timeout),
            tracking_timeout: defaults.tracking_timeout,
            submit_timeout: env_millis("SURAKSHA_SUBMIT_TIMEOUT_MS")
                .unwrap_or(defaults.submit_timeout),
            dial_delay: env_millis("SURAKSHA_DIAL_DELAY_MS").unwrap_or(defaults.dial_delay),
        }
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_millis(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_defaults() {
        let config = AlertConfig::default();
        assert_eq!(config.services.police, "100");
        assert_eq!(config.services.ambulance, "108");
        assert_eq!(config.quiet_period, Duration::from_millis(800));
        assert_eq!(config.capture_cap, Duration::from_secs(10));
        assert!(config.fix_timeout <= Duration::from_secs(5));
        assert!(config.submit_timeout < DEFAULT_HTTP_TIMEOUT);
    }

    #[test]
    fn test_unset_variables_fall_back() {
        assert_eq!(env_parse::<u16>("SURAKSHA_TEST_UNSET_VARIABLE"), None);
        assert_eq!(env_millis("SURAKSHA_TEST_UNSET_VARIABLE"), None);
    }
}
