//! Captured process-wide properties.
//!
//! Rather than consulting mutable global state, the launcher captures the
//! process environment once into an explicit [`PropertySnapshot`] and the
//! merger operates on that snapshot alone, keeping it a pure function of
//! its inputs.

use std::collections::BTreeMap;
use std::env;

/// Property prefix for [`crate::RuntimeOptions`] fields, keyed by camelCase
/// field name (`ember.options.eventLoopPoolSize`).
pub const OPTIONS_PROPERTY_PREFIX: &str = "ember.options.";

/// Property prefix for metrics option fields
/// (`ember.metrics.options.enabled`).
pub const METRICS_PROPERTY_PREFIX: &str = "ember.metrics.options.";

/// Process identity property, surfaced in diagnostics.
pub const ID_PROPERTY: &str = "ember.id";

/// Telemetry filter expression property.
pub const LOG_PROPERTY: &str = "ember.log";

/// Path of the packaging manifest consulted when no deployable identifier
/// is given on the command line.
pub const MANIFEST_PROPERTY: &str = "ember.manifest";

const ENV_PREFIX: &str = "EMBER_";
const ENV_OPTIONS_PREFIX: &str = "OPTIONS_";
const ENV_METRICS_PREFIX: &str = "METRICS_OPTIONS_";

/// An immutable key/value snapshot of process-wide properties.
///
/// Keys use dotted property names; [`PropertySnapshot::capture`] translates
/// environment variables into that namespace. Unknown keys are retained
/// (the merger ignores them), so a snapshot is a faithful record of what
/// was observed at launch start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertySnapshot {
    entries: BTreeMap<String, String>,
}

impl PropertySnapshot {
    /// An empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures the current process environment.
    #[must_use]
    pub fn capture() -> Self {
        Self::from_vars(env::vars())
    }

    /// Builds a snapshot from raw environment pairs.
    ///
    /// `EMBER_OPTIONS_EVENT_LOOP_POOL_SIZE` becomes
    /// `ember.options.eventLoopPoolSize`, `EMBER_METRICS_OPTIONS_ENABLED`
    /// becomes `ember.metrics.options.enabled`, and any other `EMBER_`
    /// variable maps to a lowercase dotted key (`EMBER_ID` -> `ember.id`).
    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut entries = BTreeMap::new();
        for (name, value) in vars {
            if let Some(key) = translate_variable(&name) {
                entries.insert(key, value);
            }
        }
        Self { entries }
    }

    /// Inserts or replaces a property by dotted name.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Fluent variant of [`Self::set`] for test and builder use.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Looks up a property by dotted name.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Iterates `RuntimeOptions` field properties as `(field, value)`.
    pub fn options_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.prefixed_entries(OPTIONS_PROPERTY_PREFIX)
    }

    /// Iterates metrics option properties as `(field, value)`.
    pub fn metrics_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.prefixed_entries(METRICS_PROPERTY_PREFIX)
    }

    fn prefixed_entries<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.entries.iter().filter_map(move |(key, value)| {
            key.strip_prefix(prefix)
                .map(|field| (field, value.as_str()))
        })
    }

    /// True when nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn translate_variable(name: &str) -> Option<String> {
    let rest = name.strip_prefix(ENV_PREFIX)?;
    if rest.is_empty() {
        return None;
    }
    if let Some(field) = rest.strip_prefix(ENV_OPTIONS_PREFIX) {
        return Some(format!("{OPTIONS_PROPERTY_PREFIX}{}", camel_case(field)));
    }
    if let Some(field) = rest.strip_prefix(ENV_METRICS_PREFIX) {
        return Some(format!("{METRICS_PROPERTY_PREFIX}{}", camel_case(field)));
    }
    Some(format!("ember.{}", rest.to_ascii_lowercase().replace('_', ".")))
}

/// Converts `EVENT_LOOP_POOL_SIZE` into `eventLoopPoolSize`.
fn camel_case(upper_snake: &str) -> String {
    let mut out = String::with_capacity(upper_snake.len());
    for (index, segment) in upper_snake.split('_').enumerate() {
        let lower = segment.to_ascii_lowercase();
        if index == 0 || lower.is_empty() {
            out.push_str(&lower);
        } else {
            let mut chars = lower.chars();
            if let Some(first) = chars.next() {
                out.push(first.to_ascii_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    out
}
