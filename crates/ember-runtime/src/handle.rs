//! The seam between the launcher and the execution engine.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use ember_config::{DeploymentOptions, RuntimeOptions};

use crate::deployable::{DeployError, DeployableFactory};

/// Opaque identifier for one deployment within a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeploymentId(u64);

impl DeploymentId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "deployment-{}", self.0)
    }
}

/// Errors surfaced by runtime handles and factories.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The runtime could not be created or started.
    #[error("runtime failed to start: {0}")]
    Startup(String),
    /// An instance failed during deployment; the cause message is preserved.
    #[error("{source}")]
    Deploy {
        /// Failure reported by the deployable.
        #[source]
        source: DeployError,
    },
    /// An instance failed while stopping.
    #[error("deployable failed to stop: {source}")]
    Stop {
        /// Failure reported by the deployable.
        #[source]
        source: DeployError,
    },
    /// The deployment identifier is not live in this runtime.
    #[error("unknown deployment {0}")]
    UnknownDeployment(DeploymentId),
    /// The runtime is shutting down and refuses new work.
    #[error("runtime is shutting down")]
    ShuttingDown,
    /// A deployment worker exited without reporting a result.
    #[error("deployment worker exited without reporting a result")]
    WorkerLost,
    /// Shutdown did not complete within the caller's bound.
    #[error("shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

/// A started execution engine.
///
/// After a successful launch the handle is handed off to the surrounding
/// process and may be driven from multiple threads.
pub trait RuntimeHandle: Send + Sync {
    /// Deploys `options.instances` fresh instances from `factory`,
    /// blocking until every instance has started or one has failed.
    fn deploy(
        &self,
        factory: Arc<dyn DeployableFactory>,
        options: &DeploymentOptions,
    ) -> Result<DeploymentId, RuntimeError>;

    /// Stops and removes a deployment.
    fn undeploy(&self, id: DeploymentId) -> Result<(), RuntimeError>;

    /// Stops all deployments and releases the engine's resources within
    /// `timeout`.
    fn shutdown(&self, timeout: Duration) -> Result<(), RuntimeError>;

    /// Whether metrics collection is active.
    fn is_metrics_enabled(&self) -> bool;

    /// Whether this runtime joined a cluster.
    fn is_clustered(&self) -> bool;
}

/// Creates started [`RuntimeHandle`]s from merged options.
pub trait RuntimeFactory: Send + Sync {
    /// Creates and starts a runtime. Failures here are initialization
    /// errors, distinct from deployment failures.
    fn create(&self, options: &RuntimeOptions) -> Result<Arc<dyn RuntimeHandle>, RuntimeError>;
}
