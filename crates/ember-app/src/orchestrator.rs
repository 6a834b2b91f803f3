//! The launch pipeline.
//!
//! Drives one launch through its stages: resolve the deployable, build
//! the option stores from merged sources, create the runtime, deploy.
//! Hook checkpoints fire between stages; every failure is classified by
//! [`LaunchError`] and unwinds to the caller, which reports it.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, info};

use ember_config::{
    DeploymentOptions, PropertySnapshot, ProviderRegistry, build_runtime_options,
    read_deployment_payload, read_options_document,
};
use ember_runtime::{DeployableRegistry, DeploymentId, RuntimeFactory, RuntimeHandle};

use crate::cli::LaunchCommand;
use crate::errors::LaunchError;
use crate::hooks::{HookContext, Hooks};
use crate::manifest::ManifestLookup;

const LAUNCHER_TARGET: &str = "ember::launcher";

/// Bound on the cleanup shutdown performed when a deploy fails after the
/// runtime has already started.
const CLEANUP_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Collaborators injected into one launch.
pub(crate) struct Collaborators<'a> {
    pub(crate) registry: &'a DeployableRegistry,
    pub(crate) runtime_factory: &'a dyn RuntimeFactory,
    pub(crate) providers: &'a dyn ProviderRegistry,
    pub(crate) manifest: &'a dyn ManifestLookup,
    pub(crate) properties: &'a PropertySnapshot,
}

/// A successful launch: the runtime is up and the deployment is live.
///
/// The process stays running; exiting is the caller's decision, via an
/// explicit shutdown of the runtime handle.
pub struct Launched {
    runtime: Arc<dyn RuntimeHandle>,
    deployment: DeploymentId,
    identifier: String,
}

impl std::fmt::Debug for Launched {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Launched")
            .field("identifier", &self.identifier)
            .field("deployment", &self.deployment)
            .finish_non_exhaustive()
    }
}

impl Launched {
    /// The started runtime handle.
    #[must_use]
    pub fn runtime(&self) -> &Arc<dyn RuntimeHandle> {
        &self.runtime
    }

    /// Identifier of the live deployment.
    #[must_use]
    pub fn deployment_id(&self) -> DeploymentId {
        self.deployment
    }

    /// The deployable identifier that was launched.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

pub(crate) fn launch_pipeline(
    command: &LaunchCommand,
    hooks: &mut dyn Hooks,
    collaborators: &Collaborators<'_>,
) -> Result<Launched, LaunchError> {
    // Resolve the deployable: explicit argument first, then the
    // packaging manifest. A resolution miss is a deployment error, never
    // a usage error: the invocation syntax itself was valid.
    let identifier = command
        .deployable
        .clone()
        .or_else(|| collaborators.manifest.main_deployable())
        .ok_or(LaunchError::NoDeployable)?;
    let factory = collaborators
        .registry
        .lookup(&identifier)
        .ok_or_else(|| LaunchError::UnknownDeployable(identifier.clone()))?;
    debug!(target: LAUNCHER_TARGET, identifier, "deployable resolved");

    // Threading-model conflicts are caught before any runtime call.
    let threading = command.threading_model()?;

    let payload = command
        .conf
        .as_deref()
        .map_or_else(|| Value::Object(Map::new()), read_deployment_payload);
    let payload = hooks.after_config_parsed(payload);

    let document = command
        .options
        .as_deref()
        .map(read_options_document)
        .transpose()?
        .map(|document| hooks.after_options_parsed(document));

    let provider = collaborators.providers.discover();
    let mut runtime_options = build_runtime_options(
        collaborators.properties,
        document.as_ref(),
        provider.as_ref(),
        &command.overrides(),
    )?;

    {
        let mut context = HookContext::new(&mut runtime_options, None, Some(&identifier));
        hooks.before_starting_runtime(&mut context);
    }

    let runtime = collaborators
        .runtime_factory
        .create(&runtime_options)
        .map_err(|source| LaunchError::Initialization { source })?;

    let mut deployment_options = DeploymentOptions {
        instances: command.instances,
        threading,
        config: payload,
        ha: command.ha,
    };
    hooks.before_deploying(&mut deployment_options);

    let deployment = match runtime.deploy(factory, &deployment_options) {
        Ok(deployment) => deployment,
        Err(source) => {
            // The runtime is already up; tear it down before surfacing
            // the deployment failure.
            if runtime.shutdown(CLEANUP_SHUTDOWN_TIMEOUT).is_ok() {
                hooks.after_stopped();
            }
            return Err(LaunchError::Deployment { identifier, source });
        }
    };

    info!(
        target: LAUNCHER_TARGET,
        identifier,
        %deployment,
        instances = deployment_options.instances,
        threading = %deployment_options.threading,
        "deployment running"
    );

    let context = HookContext::new(&mut runtime_options, Some(&runtime), Some(&identifier));
    hooks.after_started(&context);

    Ok(Launched {
        runtime,
        deployment,
        identifier,
    })
}
