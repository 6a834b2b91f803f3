//! The unit-of-work contract between the launcher and deployed code.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use ember_config::ThreadingModel;

use crate::handle::RuntimeHandle;

/// Failure raised by a deployable's own start/stop logic.
///
/// The message is preserved end-to-end: deploy-time failures surface it
/// on the launcher's error stream rather than a category label.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DeployError {
    message: String,
}

impl DeployError {
    /// Wraps a failure description.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for DeployError {
    fn from(source: std::io::Error) -> Self {
        Self::new(source.to_string())
    }
}

/// Execution context handed to every deployable instance.
pub struct DeploymentContext {
    runtime: Arc<dyn RuntimeHandle>,
    threading: ThreadingModel,
    config: Value,
    instance: u32,
}

impl DeploymentContext {
    /// Bundles the context for one instance.
    #[must_use]
    pub fn new(
        runtime: Arc<dyn RuntimeHandle>,
        threading: ThreadingModel,
        config: Value,
        instance: u32,
    ) -> Self {
        Self {
            runtime,
            threading,
            config,
            instance,
        }
    }

    /// The runtime this instance was deployed into.
    #[must_use]
    pub fn runtime(&self) -> &Arc<dyn RuntimeHandle> {
        &self.runtime
    }

    /// Threading model resolved for this deployment.
    #[must_use]
    pub fn threading_model(&self) -> ThreadingModel {
        self.threading
    }

    /// The merged configuration payload.
    #[must_use]
    pub fn config(&self) -> &Value {
        &self.config
    }

    /// Zero-based index of this instance within its deployment.
    #[must_use]
    pub fn instance(&self) -> u32 {
        self.instance
    }
}

/// A unit of work the runtime can start and stop.
pub trait Deployable: Send {
    /// Starts the instance. Runs on a thread chosen by the threading
    /// model; blocking here blocks only that deployment.
    fn start(&mut self, context: &DeploymentContext) -> Result<(), DeployError>;

    /// Stops the instance, releasing its resources.
    fn stop(&mut self) -> Result<(), DeployError> {
        Ok(())
    }
}

/// Instantiates per-instance [`Deployable`] copies for a deployment.
pub trait DeployableFactory: Send + Sync {
    /// Creates one fresh instance.
    fn create(&self) -> Box<dyn Deployable>;
}

impl<F> DeployableFactory for F
where
    F: Fn() -> Box<dyn Deployable> + Send + Sync,
{
    fn create(&self) -> Box<dyn Deployable> {
        self()
    }
}
