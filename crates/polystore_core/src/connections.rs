//! Named connection sources.
//!
//! A datastore always has a default source and may declare more through
//! the `datastore.connections` property. Options for a source are read from
//! `datastore.connections.<name>.<option>` keys.

use crate::config::{Properties, CONNECTIONS_KEY};
use crate::error::{CoreError, CoreResult};
use std::collections::BTreeMap;

/// Name of the connection source every datastore has.
pub const DEFAULT_CONNECTION_SOURCE: &str = "DEFAULT";

/// Options declared for one connection source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSourceSettings {
    name: String,
    options: BTreeMap<String, String>,
}

impl ConnectionSourceSettings {
    /// Collects the options for `name` from `properties`.
    pub fn from_properties(name: &str, properties: &Properties) -> Self {
        let prefix = format!("{CONNECTIONS_KEY}.{name}.");
        let options = properties
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(&prefix)
                    .filter(|option| !option.is_empty())
                    .map(|option| (option.to_string(), value.clone()))
            })
            .collect();
        Self {
            name: name.to_string(),
            options,
        }
    }

    /// Source name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up an option.
    #[must_use]
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// All options, ordered by key.
    #[must_use]
    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }
}

/// A configured backend endpoint.
#[derive(Debug)]
pub struct ConnectionSource<T> {
    settings: ConnectionSourceSettings,
    source: T,
}

impl<T> ConnectionSource<T> {
    /// Pairs a source with its settings.
    pub fn new(settings: ConnectionSourceSettings, source: T) -> Self {
        Self { settings, source }
    }

    /// Source name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.settings.name()
    }

    /// Settings the source was created from.
    #[must_use]
    pub fn settings(&self) -> &ConnectionSourceSettings {
        &self.settings
    }

    /// The backend endpoint.
    #[must_use]
    pub fn source(&self) -> &T {
        &self.source
    }
}

/// The default connection source plus any named ones.
#[derive(Debug)]
pub struct ConnectionSources<T> {
    default: ConnectionSource<T>,
    named: BTreeMap<String, ConnectionSource<T>>,
}

impl<T> ConnectionSources<T> {
    /// Creates a set holding only the default source.
    pub fn new(default: ConnectionSource<T>) -> Self {
        Self {
            default,
            named: BTreeMap::new(),
        }
    }

    /// Builds the default source and every source named by
    /// `datastore.connections`, calling `factory` once per source.
    pub fn from_properties<F>(properties: &Properties, mut factory: F) -> CoreResult<Self>
    where
        F: FnMut(&ConnectionSourceSettings) -> CoreResult<T>,
    {
        let settings = ConnectionSourceSettings::from_properties(DEFAULT_CONNECTION_SOURCE, properties);
        let source = factory(&settings)?;
        let mut sources = Self::new(ConnectionSource::new(settings, source));

        if let Some(list) = properties.get(CONNECTIONS_KEY) {
            for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                let settings = ConnectionSourceSettings::from_properties(name, properties);
                let source = factory(&settings)?;
                sources.add(ConnectionSource::new(settings, source))?;
            }
        }
        Ok(sources)
    }

    /// Adds a named source. Names must be unique.
    pub fn add(&mut self, source: ConnectionSource<T>) -> CoreResult<()> {
        let name = source.name().to_string();
        if name == DEFAULT_CONNECTION_SOURCE || self.named.contains_key(&name) {
            return Err(CoreError::configuration(format!(
                "connection source {name} declared more than once"
            )));
        }
        self.named.insert(name, source);
        Ok(())
    }

    /// The default source.
    #[must_use]
    pub fn default_source(&self) -> &ConnectionSource<T> {
        &self.default
    }

    /// Resolves a source by name.
    pub fn get(&self, name: &str) -> CoreResult<&ConnectionSource<T>> {
        if name == DEFAULT_CONNECTION_SOURCE {
            return Ok(&self.default);
        }
        self.named
            .get(name)
            .ok_or_else(|| CoreError::configuration(format!("unknown connection source {name}")))
    }

    /// All sources, default first.
    pub fn iter(&self) -> impl Iterator<Item = &ConnectionSource<T>> {
        std::iter::once(&self.default).chain(self.named.values())
    }

    /// Number of sources, default included.
    #[must_use]
    pub fn len(&self) -> usize {
        1 + self.named.len()
    }

    /// Always false: the default source is always present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
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
    fn default_only() {
        let sources =
            ConnectionSources::from_properties(&Properties::new(), |s| Ok(s.name().to_string()))
                .unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources.default_source().source(), "DEFAULT");
        assert!(sources.get("DEFAULT").is_ok());
    }

    #[test]
    fn named_sources_with_options() {
        let properties = props(&[
            (CONNECTIONS_KEY, "archive, audit,,"),
            ("datastore.connections.archive.region", "eu"),
            ("datastore.connections.archive.", "ignored"),
            ("datastore.connections.audit.retention", "30"),
        ]);
        let sources = ConnectionSources::from_properties(&properties, |s| Ok(s.clone())).unwrap();

        let names: Vec<_> = sources.iter().map(ConnectionSource::name).collect();
        assert_eq!(names, vec!["DEFAULT", "archive", "audit"]);

        let archive = sources.get("archive").unwrap().settings();
        assert_eq!(archive.option("region"), Some("eu"));
        assert_eq!(archive.options().len(), 1);
        assert_eq!(
            sources.get("audit").unwrap().settings().option("retention"),
            Some("30")
        );
    }

    #[test]
    fn unknown_source_is_configuration_error() {
        let sources = ConnectionSources::from_properties(&Properties::new(), |_| Ok(())).unwrap();
        assert!(matches!(
            sources.get("nowhere"),
            Err(CoreError::Configuration { .. })
        ));
    }

    #[test]
    fn duplicates_rejected() {
        let properties = props(&[(CONNECTIONS_KEY, "a,a")]);
        let err = ConnectionSources::from_properties(&properties, |_| Ok(())).unwrap_err();
        assert!(matches!(err, CoreError::Configuration { .. }));

        let properties = props(&[(CONNECTIONS_KEY, "DEFAULT")]);
        assert!(ConnectionSources::from_properties(&properties, |_| Ok(())).is_err());
    }

    #[test]
    fn factory_errors_propagate() {
        let result: CoreResult<ConnectionSources<()>> =
            ConnectionSources::from_properties(&Properties::new(), |_| {
                Err(CoreError::configuration("no backend"))
            });
        assert!(result.is_err());
    }
}
