//! Typed stores for global runtime configuration.

use std::thread;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::coerce::TimeUnit;

/// Sentinel for a cluster public port that no source has set.
///
/// The public port is never defaulted from the bind port; it stays at this
/// sentinel until a source provides it explicitly.
pub const CLUSTER_PUBLIC_PORT_UNSET: i32 = -1;

/// Default size of the blocking worker pool.
pub const DEFAULT_WORKER_POOL_SIZE: u32 = 20;

/// Default event-loop execute-time budget, in [`TimeUnit::Nanoseconds`].
pub const DEFAULT_MAX_EVENT_LOOP_EXECUTE_TIME: u64 = 2_000_000_000;

/// Default cluster bind host.
pub const DEFAULT_CLUSTER_HOST: &str = "localhost";

/// Default high-availability group name.
pub const DEFAULT_HA_GROUP: &str = "__DEFAULT__";

/// Computes the default event-loop pool size for this host.
#[must_use]
pub fn default_event_loop_pool_size() -> u32 {
    let cores = thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
    u32::try_from(cores.saturating_mul(2)).unwrap_or(u32::MAX)
}

/// Cluster endpoint configuration for the runtime's event bus.
///
/// Bind and public endpoints are independent: the public pair exists for
/// NAT traversal and remains unset unless a source provides it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBusOptions {
    /// Host the event bus binds to when clustering.
    pub cluster_host: String,
    /// Port the event bus binds to when clustering (0 picks an ephemeral port).
    pub cluster_port: u16,
    /// Host advertised to other cluster members, when it differs from the bind host.
    pub cluster_public_host: Option<String>,
    /// Port advertised to other cluster members, or [`CLUSTER_PUBLIC_PORT_UNSET`].
    pub cluster_public_port: i32,
}

impl Default for EventBusOptions {
    fn default() -> Self {
        Self {
            cluster_host: DEFAULT_CLUSTER_HOST.to_owned(),
            cluster_port: 0,
            cluster_public_host: None,
            cluster_public_port: CLUSTER_PUBLIC_PORT_UNSET,
        }
    }
}

/// Metrics configuration.
///
/// The concrete provider decides which extra fields are meaningful; fields
/// this crate does not model are preserved verbatim in [`Self::extra`] so
/// they round-trip to the provider without validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsOptions {
    /// Whether metrics collection is enabled.
    pub enabled: bool,
    /// Name of the discovered provider, if any.
    pub provider: Option<String>,
    /// Provider-specific fields, preserved without validation.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Global runtime configuration, built field-by-field from merged sources.
///
/// Constructed with all-default values, mutated in place by the source
/// merger and by hooks, and treated as frozen once the runtime handle has
/// been created from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeOptions {
    /// Number of event-loop threads.
    pub event_loop_pool_size: u32,
    /// Number of blocking worker threads.
    pub worker_pool_size: u32,
    /// Maximum time an event-loop task may run, in `max_event_loop_execute_time_unit`.
    pub max_event_loop_execute_time: u64,
    /// Unit for `max_event_loop_execute_time`.
    pub max_event_loop_execute_time_unit: TimeUnit,
    /// Whether the runtime joins a cluster.
    pub clustered: bool,
    /// Cluster endpoint configuration.
    pub event_bus: EventBusOptions,
    /// Metrics configuration.
    pub metrics: MetricsOptions,
    /// High-availability group this runtime participates in.
    pub ha_group: String,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            event_loop_pool_size: default_event_loop_pool_size(),
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
            max_event_loop_execute_time: DEFAULT_MAX_EVENT_LOOP_EXECUTE_TIME,
            max_event_loop_execute_time_unit: TimeUnit::Nanoseconds,
            clustered: false,
            event_bus: EventBusOptions::default(),
            metrics: MetricsOptions::default(),
            ha_group: DEFAULT_HA_GROUP.to_owned(),
        }
    }
}

impl RuntimeOptions {
    /// The execute-time budget as a [`Duration`].
    #[must_use]
    pub fn max_event_loop_execute_duration(&self) -> Duration {
        self.max_event_loop_execute_time_unit
            .to_duration(self.max_event_loop_execute_time)
    }
}
