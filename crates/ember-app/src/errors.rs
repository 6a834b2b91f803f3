//! Launch failure taxonomy and exit-code mapping.

use std::io::Write;

use thiserror::Error;

use ember_config::{OptionsDocumentError, OptionsMergeError};
use ember_runtime::RuntimeError;

use crate::usage::UsageRenderer;

/// Process exit codes forming the launcher's external contract.
pub mod exit_codes {
    /// Generic software failure.
    pub const SOFTWARE: u8 = 1;
    /// Malformed command-line invocation.
    pub const USAGE: u8 = 2;
    /// The runtime failed to initialize.
    pub const INITIALIZATION: u8 = 11;
    /// The deployable could not be resolved, built, or deployed.
    pub const DEPLOYMENT: u8 = 15;
}

/// Failures that unwind to the orchestrator.
///
/// Soft coercion failures (malformed properties, malformed deployment
/// payload) are absorbed at the point of coercion and never reach this
/// taxonomy.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The invocation syntax was malformed.
    #[error("{0}")]
    Usage(clap::Error),
    /// The runtime options document could not be loaded.
    #[error("failed to load runtime options: {0}")]
    OptionsDocument(#[from] OptionsDocumentError),
    /// The runtime options document failed validation.
    #[error("invalid runtime options: {0}")]
    OptionsMerge(#[from] OptionsMergeError),
    /// No deployable was named and the packaging manifest has no entry.
    #[error("no deployable specified and the packaging manifest names none")]
    NoDeployable,
    /// The resolved identifier has no registered deployable.
    #[error("deployable '{0}' is not registered")]
    UnknownDeployable(String),
    /// Both worker and virtual-thread flags were set.
    #[error("the worker and virtual-threads flags select conflicting threading models")]
    ThreadingModelConflict,
    /// The runtime handle could not be created.
    #[error("failed to initialize the runtime: {source}")]
    Initialization {
        /// Underlying runtime failure.
        #[source]
        source: RuntimeError,
    },
    /// Deployment failed; the cause's description is preserved.
    #[error("failed to deploy '{identifier}': {source}")]
    Deployment {
        /// Identifier whose deployment failed.
        identifier: String,
        /// Underlying runtime failure.
        #[source]
        source: RuntimeError,
    },
}

impl LaunchError {
    /// Maps the failure onto its process exit code.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) => exit_codes::USAGE,
            Self::OptionsDocument(_) | Self::OptionsMerge(_) | Self::Initialization { .. } => {
                exit_codes::INITIALIZATION
            }
            Self::NoDeployable
            | Self::UnknownDeployable(_)
            | Self::ThreadingModelConflict
            | Self::Deployment { .. } => exit_codes::DEPLOYMENT,
        }
    }
}

/// Writes diagnostics for a classified failure and returns its exit code.
///
/// Usage failures additionally render the usage banner on stdout; every
/// failure writes its full description (original cause included) to the
/// error stream.
pub(crate) fn report<W: Write, E: Write>(
    error: &LaunchError,
    usage: &dyn UsageRenderer,
    stdout: &mut W,
    stderr: &mut E,
) -> u8 {
    if matches!(error, LaunchError::Usage(_)) {
        let _ = usage.render(stdout);
    }
    let _ = writeln!(stderr, "{error}");
    error.exit_code()
}
