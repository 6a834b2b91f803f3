//! Deployable lookup by identifier.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::deployable::DeployableFactory;

/// Maps deployable identifiers to their factories.
///
/// Identifiers may carry a `scheme:` prefix (for example
/// `ember:Heartbeat`); lookup tries the full identifier first and then
/// the bare name after the first `:`.
#[derive(Clone, Default)]
pub struct DeployableRegistry {
    factories: BTreeMap<String, Arc<dyn DeployableFactory>>,
}

impl DeployableRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under `identifier`, replacing any previous
    /// registration.
    pub fn register(
        &mut self,
        identifier: impl Into<String>,
        factory: impl DeployableFactory + 'static,
    ) {
        self.factories.insert(identifier.into(), Arc::new(factory));
    }

    /// Resolves an identifier to a factory.
    #[must_use]
    pub fn lookup(&self, identifier: &str) -> Option<Arc<dyn DeployableFactory>> {
        if let Some(factory) = self.factories.get(identifier) {
            return Some(Arc::clone(factory));
        }
        identifier
            .split_once(':')
            .and_then(|(_, bare)| self.factories.get(bare))
            .map(Arc::clone)
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Registered identifiers, in sorted order.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for DeployableRegistry {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("DeployableRegistry")
            .field("identifiers", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
