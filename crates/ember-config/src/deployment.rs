//! Per-deployment configuration.

use serde::Serialize;
use serde_json::{Map, Value};
use strum::{Display, EnumString};

/// Execution strategy assigned to a deployable's instances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, EnumString, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum ThreadingModel {
    /// Instances share the runtime's event-loop threads.
    #[default]
    EventLoop,
    /// Instances run on the blocking worker pool.
    Worker,
    /// Each instance gets a dedicated thread.
    VirtualThread,
}

/// How a single deployable is launched.
///
/// Built fresh for each deployment request and immutable once handed to
/// the runtime handle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentOptions {
    /// Number of instances to create (>= 1).
    pub instances: u32,
    /// Threading model for every instance.
    pub threading: ThreadingModel,
    /// Configuration payload passed to the deployable itself.
    pub config: Value,
    /// Whether the deployment participates in high availability.
    pub ha: bool,
}

impl Default for DeploymentOptions {
    fn default() -> Self {
        Self {
            instances: 1,
            threading: ThreadingModel::default(),
            config: Value::Object(Map::new()),
            ha: false,
        }
    }
}
