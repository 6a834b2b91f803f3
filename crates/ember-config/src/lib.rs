//! Configuration model and source merging for the Ember launcher.
//!
//! The crate owns the typed option stores ([`RuntimeOptions`],
//! [`DeploymentOptions`]), the loosely-typed inputs they are built from
//! (JSON documents, a captured [`PropertySnapshot`]), and the merge that
//! combines them under a single precedence order: command-line overrides
//! beat the JSON options document, which beats snapshot properties, which
//! beat metrics-provider defaults and the compiled-in defaults.
//!
//! Coercion failures follow two regimes. Property values that fail to
//! coerce are dropped silently, as is a malformed deployment payload.
//! A malformed user-authored options document is a hard error.

mod coerce;
mod deployment;
mod merge;
mod options;
mod payload;
mod properties;
mod provider;

pub use coerce::{CoercionError, TimeUnit, coerce_boolean, coerce_duration, coerce_int};
pub use deployment::{DeploymentOptions, ThreadingModel};
pub use merge::{
    CommandLineOverrides, OptionsMergeError, apply_document, apply_properties,
    build_runtime_options, deep_merge,
};
pub use options::{
    CLUSTER_PUBLIC_PORT_UNSET, DEFAULT_CLUSTER_HOST, DEFAULT_HA_GROUP,
    DEFAULT_MAX_EVENT_LOOP_EXECUTE_TIME, DEFAULT_WORKER_POOL_SIZE, EventBusOptions,
    MetricsOptions, RuntimeOptions, default_event_loop_pool_size,
};
pub use payload::{OptionsDocumentError, read_deployment_payload, read_options_document};
pub use properties::{
    ID_PROPERTY, LOG_PROPERTY, MANIFEST_PROPERTY, METRICS_PROPERTY_PREFIX,
    OPTIONS_PROPERTY_PREFIX, PropertySnapshot,
};
pub use provider::{ProviderDescriptor, ProviderRegistry, StaticProviderRegistry};
