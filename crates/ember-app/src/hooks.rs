//! Extension checkpoints for the launch pipeline.
//!
//! A hook implementation is a capability set passed into the
//! [`crate::Application`]; every checkpoint has a default no-op body, so
//! callers override only the subset they need. Checkpoints run
//! synchronously, in pipeline order, on the launching thread, and none is
//! skipped except when an earlier stage fails.

use std::sync::Arc;

use serde_json::Value;

use ember_config::{DeploymentOptions, RuntimeOptions};
use ember_runtime::RuntimeHandle;

use crate::errors::LaunchError;

/// State visible to hook checkpoints.
///
/// Owned by the pipeline for the duration of one launch; hooks must not
/// retain it past their callback (the borrows make that structural).
pub struct HookContext<'a> {
    options: &'a mut RuntimeOptions,
    runtime: Option<&'a Arc<dyn RuntimeHandle>>,
    deployable: Option<&'a str>,
}

impl<'a> HookContext<'a> {
    pub(crate) fn new(
        options: &'a mut RuntimeOptions,
        runtime: Option<&'a Arc<dyn RuntimeHandle>>,
        deployable: Option<&'a str>,
    ) -> Self {
        Self {
            options,
            runtime,
            deployable,
        }
    }

    /// The runtime options being built.
    #[must_use]
    pub fn runtime_options(&self) -> &RuntimeOptions {
        self.options
    }

    /// Mutable access to the runtime options; rewrites here win over
    /// every merged source.
    #[must_use]
    pub fn runtime_options_mut(&mut self) -> &mut RuntimeOptions {
        self.options
    }

    /// The runtime handle, `None` before the runtime is created.
    #[must_use]
    pub fn runtime(&self) -> Option<&Arc<dyn RuntimeHandle>> {
        self.runtime
    }

    /// The deployable identifier being launched, once resolved.
    #[must_use]
    pub fn deployable_identifier(&self) -> Option<&str> {
        self.deployable
    }
}

/// Caller-supplied observation and mutation logic for launch checkpoints.
pub trait Hooks {
    /// Receives the merged deployment payload; the returned document
    /// replaces it wholesale.
    fn after_config_parsed(&mut self, payload: Value) -> Value {
        payload
    }

    /// Receives the raw options document before coercion; the returned
    /// document replaces it.
    fn after_options_parsed(&mut self, document: Value) -> Value {
        document
    }

    /// Observes (and may mutate) the final runtime options before the
    /// runtime handle is created.
    fn before_starting_runtime(&mut self, _context: &mut HookContext<'_>) {}

    /// Observes (and may mutate) the final deployment options before the
    /// deploy call.
    fn before_deploying(&mut self, _options: &mut DeploymentOptions) {}

    /// Observes the started runtime after a successful deployment.
    fn after_started(&mut self, _context: &HookContext<'_>) {}

    /// Observes runtime shutdown.
    fn after_stopped(&mut self) {}

    /// Observes a classified launch failure before it is reported.
    fn after_failure(&mut self, _error: &LaunchError) {}
}

/// No-op hooks used when the caller supplies none.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHooks;

impl Hooks for DefaultHooks {}
