//! Metrics provider discovery.
//!
//! Provider lookup is an injected capability rather than an ambient
//! scanning mechanism: callers hand the merger a [`ProviderRegistry`] and
//! resolution is deterministic. An explicit selection wins, otherwise the
//! first registered provider does.

use serde_json::{Map, Value};

/// A discovered metrics provider and the option defaults it declares.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderDescriptor {
    name: String,
    default_options: Value,
}

impl ProviderDescriptor {
    /// Creates a descriptor. `default_options` should be a JSON object;
    /// anything else is treated as declaring no defaults.
    #[must_use]
    pub fn new(name: impl Into<String>, default_options: Value) -> Self {
        let default_options = match default_options {
            object @ Value::Object(_) => object,
            _ => Value::Object(Map::new()),
        };
        Self {
            name: name.into(),
            default_options,
        }
    }

    /// Provider name, recorded on the merged metrics options.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Option defaults merged beneath every other configuration source.
    #[must_use]
    pub fn default_options(&self) -> &Value {
        &self.default_options
    }
}

/// Capability for resolving the metrics provider in use.
pub trait ProviderRegistry: Send + Sync {
    /// Resolves the provider, if any is available.
    fn discover(&self) -> Option<ProviderDescriptor>;
}

/// A fixed list of providers with deterministic resolution.
#[derive(Debug, Clone, Default)]
pub struct StaticProviderRegistry {
    providers: Vec<ProviderDescriptor>,
    selection: Option<String>,
}

impl StaticProviderRegistry {
    /// Registry over a fixed provider list; first match wins.
    #[must_use]
    pub fn new(providers: Vec<ProviderDescriptor>) -> Self {
        Self {
            providers,
            selection: None,
        }
    }

    /// Pins resolution to the named provider.
    #[must_use]
    pub fn with_selection(mut self, name: impl Into<String>) -> Self {
        self.selection = Some(name.into());
        self
    }
}

impl ProviderRegistry for StaticProviderRegistry {
    fn discover(&self) -> Option<ProviderDescriptor> {
        match self.selection.as_deref() {
            Some(name) => self
                .providers
                .iter()
                .find(|provider| provider.name() == name)
                .cloned(),
            None => self.providers.first().cloned(),
        }
    }
}
