//! Command-line surface of the launcher.

use clap::Parser;

use ember_config::{CommandLineOverrides, ThreadingModel};

use crate::errors::LaunchError;

/// Launches a deployable into an Ember runtime.
#[derive(Parser, Debug)]
#[command(
    name = "ember",
    about = "Merges configuration sources, boots a runtime, and deploys a deployable into it",
    disable_help_subcommand = true
)]
pub(crate) struct LaunchCommand {
    /// Deployable identifier, e.g. `ember:Heartbeat` or a bare name.
    ///
    /// When omitted, the packaging manifest is consulted for a main
    /// deployable.
    #[arg(value_name = "DEPLOYABLE")]
    pub(crate) deployable: Option<String>,

    /// Number of deployable instances to create.
    #[arg(long, value_name = "N", default_value_t = 1, value_parser = parse_instances)]
    pub(crate) instances: u32,

    /// Deploy on the blocking worker pool.
    #[arg(short = 'w', long)]
    pub(crate) worker: bool,

    /// Deploy each instance on a dedicated thread.
    #[arg(long = "virtual-threads", alias = "vt")]
    pub(crate) virtual_threads: bool,

    /// Join a cluster.
    #[arg(long)]
    pub(crate) cluster: bool,

    /// Host the cluster transport binds to.
    #[arg(long, value_name = "HOST")]
    pub(crate) cluster_host: Option<String>,

    /// Port the cluster transport binds to.
    #[arg(long, value_name = "PORT")]
    pub(crate) cluster_port: Option<u16>,

    /// Host advertised to other cluster members.
    #[arg(long, value_name = "HOST")]
    pub(crate) cluster_public_host: Option<String>,

    /// Port advertised to other cluster members.
    #[arg(long, value_name = "PORT")]
    pub(crate) cluster_public_port: Option<i32>,

    /// Deploy as a high-availability deployment.
    #[arg(long)]
    pub(crate) ha: bool,

    /// Deployment configuration payload: a JSON literal or a file path.
    /// Malformed input resolves to an empty document.
    #[arg(long, value_name = "JSON|PATH")]
    pub(crate) conf: Option<String>,

    /// Runtime options document: a JSON literal or a file path.
    /// Malformed input fails the launch.
    #[arg(long, value_name = "JSON|PATH")]
    pub(crate) options: Option<String>,
}

impl LaunchCommand {
    /// Resolves the threading model from the mutually exclusive flags.
    ///
    /// Selecting both worker and virtual threads is a deployment error,
    /// deliberately not a clap conflict: the invocation syntax is valid,
    /// the requested configuration is not.
    pub(crate) fn threading_model(&self) -> Result<ThreadingModel, LaunchError> {
        match (self.worker, self.virtual_threads) {
            (true, true) => Err(LaunchError::ThreadingModelConflict),
            (true, false) => Ok(ThreadingModel::Worker),
            (false, true) => Ok(ThreadingModel::VirtualThread),
            (false, false) => Ok(ThreadingModel::EventLoop),
        }
    }

    /// Cluster flags as merge overrides.
    pub(crate) fn overrides(&self) -> CommandLineOverrides {
        CommandLineOverrides {
            clustered: self.cluster,
            cluster_host: self.cluster_host.clone(),
            cluster_port: self.cluster_port,
            cluster_public_host: self.cluster_public_host.clone(),
            cluster_public_port: self.cluster_public_port,
        }
    }
}

fn parse_instances(raw: &str) -> Result<u32, String> {
    raw.parse::<u32>()
        .ok()
        .filter(|count| *count >= 1)
        .ok_or_else(|| format!("instance count must be a positive integer, got '{raw}'"))
}
