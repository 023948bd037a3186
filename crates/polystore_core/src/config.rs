//! Datastore configuration.

use crate::connections::DEFAULT_CONNECTION_SOURCE;
use crate::error::{CoreError, CoreResult};
use std::collections::BTreeMap;
use std::time::Duration;

/// Flat string properties a datastore or session is configured from.
pub type Properties = BTreeMap<String, String>;

/// Connection source a session binds to.
pub const CONNECTION_KEY: &str = "datastore.connection";
/// Default lock timeout, in whole seconds.
pub const LOCK_TIMEOUT_KEY: &str = "datastore.lock.timeout";
/// Whether sessions keep a first-level object cache.
pub const SESSION_CACHE_KEY: &str = "datastore.session.cache";
/// Comma-separated names of additional connection sources.
pub const CONNECTIONS_KEY: &str = "datastore.connections";

/// Configuration for a datastore and the sessions it creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatastoreConfig {
    /// Connection source sessions bind to.
    pub connection_source: String,

    /// Upper bound on how long `lock` may block.
    pub lock_timeout: Duration,

    /// Whether sessions cache loaded objects.
    pub cache_objects: bool,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            connection_source: DEFAULT_CONNECTION_SOURCE.to_string(),
            lock_timeout: Duration::from_secs(30),
            cache_objects: true,
        }
    }
}

impl DatastoreConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the connection source.
    #[must_use]
    pub fn connection_source(mut self, name: impl Into<String>) -> Self {
        self.connection_source = name.into();
        self
    }

    /// Sets the default lock timeout.
    #[must_use]
    pub const fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets whether sessions cache loaded objects.
    #[must_use]
    pub const fn cache_objects(mut self, value: bool) -> Self {
        self.cache_objects = value;
        self
    }

    /// Returns a copy with the recognised keys of `properties` applied.
    ///
    /// Unrecognised keys are ignored. A malformed value for a recognised key
    /// is a configuration error.
    pub fn merge_properties(&self, properties: &Properties) -> CoreResult<Self> {
        let mut config = self.clone();

        if let Some(name) = properties.get(CONNECTION_KEY) {
            let name = name.trim();
            if name.is_empty() {
                return Err(CoreError::configuration(format!(
                    "{CONNECTION_KEY} must not be empty"
                )));
            }
            config.connection_source = name.to_string();
        }

        if let Some(raw) = properties.get(LOCK_TIMEOUT_KEY) {
            let secs = raw.trim().parse::<u64>().map_err(|_| {
                CoreError::configuration(format!(
                    "{LOCK_TIMEOUT_KEY} must be a whole number of seconds, got {raw:?}"
                ))
            })?;
            config.lock_timeout = Duration::from_secs(secs);
        }

        if let Some(raw) = properties.get(SESSION_CACHE_KEY) {
            config.cache_objects = raw.trim().parse::<bool>().map_err(|_| {
                CoreError::configuration(format!(
                    "{SESSION_CACHE_KEY} must be true or false, got {raw:?}"
                ))
            })?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn default_config() {
        let config = DatastoreConfig::default();
        assert_eq!(config.connection_source, "DEFAULT");
        assert_eq!(config.lock_timeout, Duration::from_secs(30));
        assert!(config.cache_objects);
    }

    #[test]
    fn builder_pattern() {
        let config = DatastoreConfig::new()
            .connection_source("archive")
            .lock_timeout(Duration::from_millis(50))
            .cache_objects(false);

        assert_eq!(config.connection_source, "archive");
        assert_eq!(config.lock_timeout, Duration::from_millis(50));
        assert!(!config.cache_objects);
    }

    #[test]
    fn empty_properties_keep_defaults() {
        let config = DatastoreConfig::default();
        assert_eq!(config.merge_properties(&Properties::new()).unwrap(), config);
    }

    #[test]
    fn recognised_keys_apply() {
        let merged = DatastoreConfig::default()
            .merge_properties(&props(&[
                (CONNECTION_KEY, "archive"),
                (LOCK_TIMEOUT_KEY, " 5 "),
                (SESSION_CACHE_KEY, "false"),
                ("datastore.unknown", "whatever"),
                ("something.else", "1"),
            ]))
            .unwrap();

        assert_eq!(merged.connection_source, "archive");
        assert_eq!(merged.lock_timeout, Duration::from_secs(5));
        assert!(!merged.cache_objects);
    }

    #[test]
    fn malformed_values_rejected() {
        for (key, value) in [
            (LOCK_TIMEOUT_KEY, "soon"),
            (LOCK_TIMEOUT_KEY, "-1"),
            (SESSION_CACHE_KEY, "yes"),
            (CONNECTION_KEY, "  "),
        ] {
            let err = DatastoreConfig::default()
                .merge_properties(&props(&[(key, value)]))
                .unwrap_err();
            assert!(matches!(err, CoreError::Configuration { .. }), "{key}={value}");
        }
    }

    proptest::proptest! {
        #[test]
        fn lock_timeout_parses_any_whole_seconds(secs in 0u64..1_000_000) {
            let merged = DatastoreConfig::default()
                .merge_properties(&props(&[(LOCK_TIMEOUT_KEY, secs.to_string().as_str())]))
                .unwrap();
            proptest::prop_assert_eq!(merged.lock_timeout, Duration::from_secs(secs));
        }

        #[test]
        fn unrelated_keys_never_change_config(key in "[a-z]{1,8}\\.[a-z]{1,8}", value in ".{0,16}") {
            proptest::prop_assume!(!key.starts_with("datastore."));
            let config = DatastoreConfig::default();
            let merged = config.merge_properties(&props(&[(key.as_str(), value.as_str())])).unwrap();
            proptest::prop_assert_eq!(merged, config);
        }
    }
}
