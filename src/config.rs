use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::event::DEFAULT_HANDLER_TIMEOUT;
use crate::hub::{DEFAULT_CLIENT_QUEUE_CAPACITY, MAX_CLIENT_QUEUE_CAPACITY};
use crate::websockets::ConnectionSettings;

/// Runtime configuration for the hub and its streaming services
#[derive(Debug, Clone, PartialEq)]
pub struct HubConfig {
    /// Address the HTTP/WebSocket listener binds to
    pub bind_addr: String,
    /// Messages buffered per client before new ones are dropped
    pub client_queue_capacity: usize,
    /// Upper bound on a single handler invocation
    pub handler_timeout: Duration,
    /// How often the stats service samples the process
    pub stats_interval: Duration,
    /// How often a WebSocket ping is sent to each client
    pub ping_interval: Duration,
    /// Silence from a client after which its connection is closed
    pub pong_timeout: Duration,
    /// Upper bound on a single WebSocket write
    pub write_timeout: Duration,
    /// Largest inbound WebSocket message accepted, in bytes
    pub max_message_size: usize,
    /// Whether one IP may hold several WebSocket connections
    pub allow_multiple_connections_per_ip: bool,
    /// Start the stats service at boot
    pub stats_enabled: bool,
    /// Start the log streaming service at boot
    pub logs_enabled: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            client_queue_capacity: DEFAULT_CLIENT_QUEUE_CAPACITY,
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            stats_interval: Duration::from_secs(5),
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
            max_message_size: 512,
            allow_multiple_connections_per_ip: true,
            stats_enabled: true,
            logs_enabled: true,
        }
    }
}

impl HubConfig {
    /// Reads `EVENTHUB_*` environment variables on top of the defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup
    ///
    /// Values that fail to parse are reported and replaced by the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            bind_addr: lookup("EVENTHUB_BIND_ADDR")
                .filter(|addr| !addr.trim().is_empty())
                .unwrap_or(defaults.bind_addr),
            client_queue_capacity: parse_or(
                &lookup,
                "EVENTHUB_CLIENT_QUEUE_CAPACITY",
                defaults.client_queue_capacity,
            )
            .clamp(1, MAX_CLIENT_QUEUE_CAPACITY),
            handler_timeout: parse_millis_or(
                &lookup,
                "EVENTHUB_HANDLER_TIMEOUT_MS",
                defaults.handler_timeout,
            ),
            stats_interval: parse_millis_or(
                &lookup,
                "EVENTHUB_STATS_INTERVAL_MS",
                defaults.stats_interval,
            ),
            ping_interval: parse_millis_or(
                &lookup,
                "EVENTHUB_PING_INTERVAL_MS",
                defaults.ping_interval,
            ),
            pong_timeout: parse_millis_or(
                &lookup,
                "EVENTHUB_PONG_TIMEOUT_MS",
                defaults.pong_timeout,
            ),
            write_timeout: parse_millis_or(
                &lookup,
                "EVENTHUB_WRITE_TIMEOUT_MS",
                defaults.write_timeout,
            ),
            max_message_size: match parse_or(
                &lookup,
                "EVENTHUB_MAX_MESSAGE_SIZE",
                defaults.max_message_size,
            ) {
                0 => defaults.max_message_size,
                size => size,
            },
            allow_multiple_connections_per_ip: parse_or(
                &lookup,
                "EVENTHUB_ALLOW_MULTIPLE_CONNECTIONS_PER_IP",
                defaults.allow_multiple_connections_per_ip,
            ),
            stats_enabled: parse_or(&lookup, "EVENTHUB_STATS_ENABLED", defaults.stats_enabled),
            logs_enabled: parse_or(&lookup, "EVENTHUB_LOGS_ENABLED", defaults.logs_enabled),
        }
    }

    /// Keep-alive timings handed to each WebSocket connection
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            ping_interval: self.ping_interval,
            pong_timeout: self.pong_timeout,
            write_timeout: self.write_timeout,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(key = %key, value = %raw, "Invalid configuration value, using default");
                default
            }
        },
        None => default,
    }
}

fn parse_millis_or<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    match parse_or::<F, u64>(lookup, key, 0) {
        0 => default,
        millis => Duration::from_millis(millis),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> HubConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        HubConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        assert_eq!(config_from(&[]), HubConfig::default());
    }

    #[test]
    fn test_values_are_read() {
        let config = config_from(&[
            ("EVENTHUB_BIND_ADDR", "127.0.0.1:8080"),
            ("EVENTHUB_CLIENT_QUEUE_CAPACITY", "16"),
            ("EVENTHUB_STATS_INTERVAL_MS", "250"),
            ("EVENTHUB_ALLOW_MULTIPLE_CONNECTIONS_PER_IP", "false"),
            ("EVENTHUB_LOGS_ENABLED", "false"),
        ]);

        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.client_queue_capacity, 16);
        assert_eq!(config.stats_interval, Duration::from_millis(250));
        assert!(!config.allow_multiple_connections_per_ip);
        assert!(!config.logs_enabled);
        assert!(config.stats_enabled);
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        let config = config_from(&[
            ("EVENTHUB_CLIENT_QUEUE_CAPACITY", "lots"),
            ("EVENTHUB_HANDLER_TIMEOUT_MS", "-1"),
            ("EVENTHUB_PING_INTERVAL_MS", "0"),
            ("EVENTHUB_STATS_ENABLED", "maybe"),
        ]);
        let defaults = HubConfig::default();

        assert_eq!(config.client_queue_capacity, defaults.client_queue_capacity);
        assert_eq!(config.handler_timeout, defaults.handler_timeout);
        assert_eq!(config.ping_interval, defaults.ping_interval);
        assert_eq!(config.stats_enabled, defaults.stats_enabled);
    }

    #[test]
    fn test_zero_queue_capacity_is_clamped() {
        let config = config_from(&[("EVENTHUB_CLIENT_QUEUE_CAPACITY", "0")]);
        assert_eq!(config.client_queue_capacity, 1);
    }

    #[test]
    fn test_huge_queue_capacity_is_clamped() {
        let config = config_from(&[("EVENTHUB_CLIENT_QUEUE_CAPACITY", "18446744073709551615")]);
        assert_eq!(config.client_queue_capacity, MAX_CLIENT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_keepalive_values_are_read() {
        let config = config_from(&[
            ("EVENTHUB_PING_INTERVAL_MS", "1000"),
            ("EVENTHUB_PONG_TIMEOUT_MS", "2500"),
            ("EVENTHUB_WRITE_TIMEOUT_MS", "300"),
            ("EVENTHUB_MAX_MESSAGE_SIZE", "4096"),
        ]);

        assert_eq!(config.max_message_size, 4096);
        assert_eq!(
            config.connection_settings(),
            ConnectionSettings {
                ping_interval: Duration::from_secs(1),
                pong_timeout: Duration::from_millis(2500),
                write_timeout: Duration::from_millis(300),
            }
        );
    }

    #[test]
    fn test_default_keepalive_matches_connection_defaults() {
        let config = HubConfig::default();
        assert_eq!(config.connection_settings(), ConnectionSettings::default());
        assert_eq!(config.max_message_size, 512);
    }
}
