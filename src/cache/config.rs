//! Cache configuration
//!
//! Supplied by bootstrap code at construction time, either as a typed
//! struct, a serde document, or a flat string property map.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use super::{DEFAULT_CLIENT_IDLE_TIME, DEFAULT_INVALIDATE_CACHE_INTERVAL};
use crate::error::{Error, Result};

/// Property key selecting the shared scheduler
pub const SHARED_PROPERTY: &str = "shared";

/// Property key for the client idle time, in milliseconds
pub const CLIENT_IDLE_TIME_PROPERTY: &str = "org.atmosphere.cache.UUIDBroadcasterCache.clientIdleTime";

/// Property key for the sweep interval, in milliseconds
pub const INVALIDATE_CACHE_INTERVAL_PROPERTY: &str =
    "org.atmosphere.cache.UUIDBroadcasterCache.invalidateCacheInterval";

/// Broadcaster cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Run the sweep on the process-wide scheduler instead of a dedicated one
    pub shared: bool,
    /// Inactivity after which a client and its backlog are dropped
    #[serde(rename = "clientIdleTimeMs", deserialize_with = "duration_from_millis")]
    pub client_idle_time: Duration,
    /// Delay between the end of one sweep and the start of the next
    #[serde(
        rename = "invalidateCacheIntervalMs",
        deserialize_with = "duration_from_millis"
    )]
    pub invalidate_cache_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            shared: true,
            client_idle_time: DEFAULT_CLIENT_IDLE_TIME,
            invalidate_cache_interval: DEFAULT_INVALIDATE_CACHE_INTERVAL,
        }
    }
}

impl CacheConfig {
    /// Config using a dedicated scheduler
    pub fn dedicated() -> Self {
        Self {
            shared: false,
            ..Self::default()
        }
    }

    /// Build from a flat property map. Missing keys keep their defaults.
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = properties.get(SHARED_PROPERTY) {
            config.shared = v.trim().parse::<bool>().map_err(|_| {
                Error::Config(format!("{} must be true or false, got '{}'", SHARED_PROPERTY, v))
            })?;
        }

        if let Some(v) = properties.get(CLIENT_IDLE_TIME_PROPERTY) {
            config.client_idle_time = parse_millis(CLIENT_IDLE_TIME_PROPERTY, v)?;
        }

        if let Some(v) = properties.get(INVALIDATE_CACHE_INTERVAL_PROPERTY) {
            config.invalidate_cache_interval = parse_millis(INVALIDATE_CACHE_INTERVAL_PROPERTY, v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.invalidate_cache_interval.is_zero() {
            return Err(Error::Config(
                "invalidate cache interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_millis(key: &str, value: &str) -> Result<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| Error::Config(format!("{} must be milliseconds, got '{}'", key, value)))
}

fn duration_from_millis<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert!(config.shared);
        assert_eq!(config.client_idle_time, Duration::from_secs(60));
        assert_eq!(config.invalidate_cache_interval, Duration::from_secs(30));
        assert!(!CacheConfig::dedicated().shared);
    }

    #[test]
    fn test_from_properties() {
        let config = CacheConfig::from_properties(&props(&[
            ("shared", "false"),
            (CLIENT_IDLE_TIME_PROPERTY, "100"),
            (INVALIDATE_CACHE_INTERVAL_PROPERTY, "50"),
        ]))
        .unwrap();

        assert!(!config.shared);
        assert_eq!(config.client_idle_time, Duration::from_millis(100));
        assert_eq!(config.invalidate_cache_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_missing_properties_keep_defaults() {
        let config = CacheConfig::from_properties(&HashMap::new()).unwrap();
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn test_malformed_properties() {
        let err = CacheConfig::from_properties(&props(&[("shared", "yes")])).unwrap_err();
        assert_matches!(err, Error::Config(_));

        let err =
            CacheConfig::from_properties(&props(&[(CLIENT_IDLE_TIME_PROPERTY, "1m")])).unwrap_err();
        assert_matches!(err, Error::Config(_));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = CacheConfig::from_properties(&props(&[(INVALIDATE_CACHE_INTERVAL_PROPERTY, "0")]))
            .unwrap_err();
        assert_matches!(err, Error::Config(msg) if msg.contains("greater than zero"));
    }

    #[test]
    fn test_deserialize_json() {
        let config: CacheConfig = serde_json::from_str(
            r#"{ "shared": false, "clientIdleTimeMs": 250, "invalidateCacheIntervalMs": 125 }"#,
        )
        .unwrap();
        assert!(!config.shared);
        assert_eq!(config.client_idle_time, Duration::from_millis(250));
        assert_eq!(config.invalidate_cache_interval, Duration::from_millis(125));

        let partial: CacheConfig = serde_json::from_str(r#"{ "clientIdleTimeMs": 10 }"#).unwrap();
        assert!(partial.shared);
        assert_eq!(partial.client_idle_time, Duration::from_millis(10));
        assert_eq!(
            partial.invalidate_cache_interval,
            DEFAULT_INVALIDATE_CACHE_INTERVAL
        );
    }
}
