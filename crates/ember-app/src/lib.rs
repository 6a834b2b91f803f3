//! The `ember` application launcher.
//!
//! [`Application`] assembles a launch from injectable collaborators (a
//! deployable registry, a runtime factory, a provider registry, a
//! packaging manifest, and a property snapshot), parses the command
//! line, merges configuration sources in precedence order, and drives
//! the deployment pipeline. Failures map onto a small, stable set of
//! process exit codes.

use std::env;
use std::ffi::OsString;
use std::io::{self, Write};
use std::time::Duration;

use clap::Parser;
use clap::error::ErrorKind;

mod args;
mod cli;
mod errors;
mod hooks;
mod manifest;
mod orchestrator;
mod telemetry;
mod usage;

pub use errors::{LaunchError, exit_codes};
pub use hooks::{DefaultHooks, HookContext, Hooks};
pub use manifest::{DEFAULT_MANIFEST_PATH, ManifestLookup, StaticManifest, SystemManifest};
pub use orchestrator::Launched;
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use usage::{ClapUsageRenderer, UsageRenderer};

pub use ember_config::{
    DeploymentOptions, PropertySnapshot, ProviderDescriptor, ProviderRegistry, RuntimeOptions,
    StaticProviderRegistry, ThreadingModel,
};
pub use ember_runtime::{
    DeployError, Deployable, DeployableFactory, DeployableRegistry, DeploymentContext,
    DeploymentId, LocalRuntime, LocalRuntimeFactory, RuntimeError, RuntimeFactory, RuntimeHandle,
};

use crate::args::normalize_arguments;
use crate::cli::LaunchCommand;
use crate::orchestrator::Collaborators;

/// Result of asking an [`Application`] to launch.
#[derive(Debug)]
pub enum LaunchOutcome {
    /// The runtime started and the deployment is live.
    Running(Launched),
    /// The launch finished without a live deployment: help output, or a
    /// classified failure. Carries the process exit code.
    Exited(u8),
}

impl LaunchOutcome {
    /// Exit code this outcome maps to; a running launch maps to zero.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Running(_) => 0,
            Self::Exited(code) => *code,
        }
    }
}

/// A configurable launcher instance.
///
/// Defaults reproduce the stock binary: arguments from the process,
/// properties from the environment, a local runtime, no metrics
/// provider, and manifest lookup on the filesystem. Tests and embedders
/// swap collaborators through the `with_*` builders.
pub struct Application {
    arguments: Vec<OsString>,
    properties: PropertySnapshot,
    hooks: Box<dyn Hooks>,
    registry: DeployableRegistry,
    runtime_factory: Box<dyn RuntimeFactory>,
    providers: Box<dyn ProviderRegistry>,
    manifest: Option<Box<dyn ManifestLookup>>,
    usage: Box<dyn UsageRenderer>,
}

impl Application {
    /// Creates a launcher over an explicit argument list.
    ///
    /// The first element is the program name, as in [`std::env::args`].
    /// Properties start empty; use [`Application::with_properties`] or
    /// [`Application::from_env`] to feed them.
    pub fn new<I, A>(arguments: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        Self {
            arguments: arguments.into_iter().map(Into::into).collect(),
            properties: PropertySnapshot::default(),
            hooks: Box::new(DefaultHooks),
            registry: DeployableRegistry::default(),
            runtime_factory: Box::new(LocalRuntimeFactory),
            providers: Box::new(StaticProviderRegistry::default()),
            manifest: None,
            usage: Box::new(ClapUsageRenderer),
        }
    }

    /// Creates a launcher from the process arguments and environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(env::args_os()).with_properties(PropertySnapshot::capture())
    }

    /// Replaces the property snapshot.
    #[must_use]
    pub fn with_properties(mut self, properties: PropertySnapshot) -> Self {
        self.properties = properties;
        self
    }

    /// Installs launch hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: impl Hooks + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    /// Replaces the runtime factory.
    #[must_use]
    pub fn with_runtime_factory(mut self, factory: impl RuntimeFactory + 'static) -> Self {
        self.runtime_factory = Box::new(factory);
        self
    }

    /// Replaces the metrics provider registry.
    #[must_use]
    pub fn with_providers(mut self, providers: impl ProviderRegistry + 'static) -> Self {
        self.providers = Box::new(providers);
        self
    }

    /// Replaces the packaging-manifest lookup.
    #[must_use]
    pub fn with_manifest(mut self, manifest: impl ManifestLookup + 'static) -> Self {
        self.manifest = Some(Box::new(manifest));
        self
    }

    /// Registers a deployable factory under an identifier.
    pub fn register_deployable(
        &mut self,
        identifier: impl Into<String>,
        factory: impl DeployableFactory + 'static,
    ) {
        self.registry.register(identifier, factory);
    }

    /// Fluent form of [`Application::register_deployable`].
    #[must_use]
    pub fn with_deployable(
        mut self,
        identifier: impl Into<String>,
        factory: impl DeployableFactory + 'static,
    ) -> Self {
        self.register_deployable(identifier, factory);
        self
    }

    /// Runs one launch, reporting to the process streams.
    pub fn launch(&mut self) -> LaunchOutcome {
        let mut stdout = io::stdout().lock();
        let mut stderr = io::stderr().lock();
        self.launch_with(&mut stdout, &mut stderr)
    }

    /// Runs one launch, reporting to the given streams.
    ///
    /// Usage failures render the usage banner on `stdout` and the
    /// parser's diagnostic on `stderr`; every other failure writes its
    /// description to `stderr` only.
    pub fn launch_with<W: Write, E: Write>(
        &mut self,
        stdout: &mut W,
        stderr: &mut E,
    ) -> LaunchOutcome {
        let arguments = normalize_arguments(self.arguments.iter().cloned());
        let command = match LaunchCommand::try_parse_from(arguments) {
            Ok(command) => command,
            Err(error) if matches!(error.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
                let _ = write!(stdout, "{error}");
                return LaunchOutcome::Exited(0);
            }
            Err(error) => {
                let error = LaunchError::Usage(error);
                self.hooks.after_failure(&error);
                let code = errors::report(&error, self.usage.as_ref(), stdout, stderr);
                return LaunchOutcome::Exited(code);
            }
        };

        if let Err(error) = telemetry::initialise(&self.properties) {
            let _ = writeln!(stderr, "{error}");
            return LaunchOutcome::Exited(exit_codes::SOFTWARE);
        }

        let system_manifest;
        let manifest: &dyn ManifestLookup = match &self.manifest {
            Some(lookup) => lookup.as_ref(),
            None => {
                system_manifest = SystemManifest::from_snapshot(&self.properties);
                &system_manifest
            }
        };
        let collaborators = Collaborators {
            registry: &self.registry,
            runtime_factory: self.runtime_factory.as_ref(),
            providers: self.providers.as_ref(),
            manifest,
            properties: &self.properties,
        };
        match orchestrator::launch_pipeline(&command, self.hooks.as_mut(), &collaborators) {
            Ok(launched) => LaunchOutcome::Running(launched),
            Err(error) => {
                self.hooks.after_failure(&error);
                let code = errors::report(&error, self.usage.as_ref(), stdout, stderr);
                LaunchOutcome::Exited(code)
            }
        }
    }

    /// Shuts the runtime behind a successful launch down, firing the
    /// stop hook once the runtime confirms.
    pub fn shutdown(&mut self, launched: &Launched, timeout: Duration) -> Result<(), RuntimeError> {
        launched.runtime().shutdown(timeout)?;
        self.hooks.after_stopped();
        Ok(())
    }
}
