//! Ordered merging of configuration sources.
//!
//! Sources are applied onto an all-defaults [`RuntimeOptions`] in
//! ascending precedence: metrics-provider defaults, then the property
//! snapshot (soft coercion, bad values are dropped), then the JSON
//! options document (strict coercion), then explicit command-line
//! overrides. Merging the same sources twice yields identical stores.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::coerce::{CoercionError, TimeUnit, coerce_boolean, coerce_int, coerce_int_text, coerce_string};
use crate::options::RuntimeOptions;
use crate::properties::PropertySnapshot;
use crate::provider::ProviderDescriptor;

/// Errors raised while applying a runtime options document.
#[derive(Debug, Error)]
pub enum OptionsMergeError {
    /// The document was not a JSON object.
    #[error("options document must be a JSON object")]
    NotAnObject,
    /// A field value failed coercion.
    #[error("invalid value for '{field}': {source}")]
    Field {
        /// Dotted name of the offending field.
        field: String,
        /// Underlying coercion failure.
        #[source]
        source: CoercionError,
    },
    /// A nested options field was not a JSON object.
    #[error("'{field}' must be a JSON object")]
    NestedNotAnObject {
        /// Name of the nested field.
        field: &'static str,
    },
}

/// Command-line flags that override every other configuration source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLineOverrides {
    /// `-cluster` forces clustering on; when unset the prior value stands.
    pub clustered: bool,
    /// `--cluster-host`.
    pub cluster_host: Option<String>,
    /// `--cluster-port`.
    pub cluster_port: Option<u16>,
    /// `--cluster-public-host`.
    pub cluster_public_host: Option<String>,
    /// `--cluster-public-port`.
    pub cluster_public_port: Option<i32>,
}

/// Recursively merges `overlay` into `target`.
///
/// Object keys present in the overlay overwrite (recursively) the
/// corresponding keys in the target; absent keys are left untouched.
/// Non-object overlay values replace the target wholesale.
pub fn deep_merge(target: &mut Value, overlay: &Value) {
    match (target, overlay) {
        (Value::Object(target_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match target_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, overlay) => *target = overlay.clone(),
    }
}

/// Builds a [`RuntimeOptions`] store from merged sources.
///
/// `document` is the user-authored options document (already passed
/// through the `after_options_parsed` hook); malformed fields there are
/// hard errors. Property values that fail coercion are silently dropped.
pub fn build_runtime_options(
    snapshot: &PropertySnapshot,
    document: Option<&Value>,
    provider: Option<&ProviderDescriptor>,
    overrides: &CommandLineOverrides,
) -> Result<RuntimeOptions, OptionsMergeError> {
    let mut options = RuntimeOptions::default();
    if let Some(provider) = provider {
        options.metrics.provider = Some(provider.name().to_owned());
        if let Value::Object(defaults) = provider.default_options() {
            apply_metrics_fields(&mut options, defaults)?;
        }
    }
    apply_properties(&mut options, snapshot);
    if let Some(document) = document {
        apply_document(&mut options, document)?;
    }
    apply_overrides(&mut options, overrides);
    Ok(options)
}

/// Applies snapshot properties field-by-field, dropping bad values.
pub fn apply_properties(options: &mut RuntimeOptions, snapshot: &PropertySnapshot) {
    for (field, value) in snapshot.options_entries() {
        match field {
            "eventLoopPoolSize" => {
                if let Some(size) = positive_u32(value) {
                    options.event_loop_pool_size = size;
                }
            }
            "workerPoolSize" => {
                if let Some(size) = positive_u32(value) {
                    options.worker_pool_size = size;
                }
            }
            "maxEventLoopExecuteTime" => {
                if let Ok(amount) = coerce_int_text(value) {
                    if let Ok(amount) = u64::try_from(amount) {
                        options.max_event_loop_execute_time = amount;
                    }
                }
            }
            "maxEventLoopExecuteTimeUnit" => {
                if let Ok(unit) = TimeUnit::parse(value) {
                    options.max_event_loop_execute_time_unit = unit;
                }
            }
            "clustered" => options.clustered = coerce_boolean(value),
            "haGroup" => options.ha_group = value.to_owned(),
            "clusterHost" => options.event_bus.cluster_host = value.to_owned(),
            "clusterPort" => {
                if let Ok(port) = coerce_int_text(value) {
                    if let Ok(port) = u16::try_from(port) {
                        options.event_bus.cluster_port = port;
                    }
                }
            }
            "clusterPublicHost" => {
                options.event_bus.cluster_public_host = Some(value.to_owned());
            }
            "clusterPublicPort" => {
                if let Ok(port) = coerce_int_text(value) {
                    if let Ok(port) = i32::try_from(port) {
                        options.event_bus.cluster_public_port = port;
                    }
                }
            }
            // Unknown property names are ignored.
            _ => {}
        }
    }
    for (field, value) in snapshot.metrics_entries() {
        if field == "enabled" {
            options.metrics.enabled = coerce_boolean(value);
        } else {
            options
                .metrics
                .extra
                .insert(field.to_owned(), Value::String(value.to_owned()));
        }
    }
}

/// Applies a runtime options document with strict coercion.
pub fn apply_document(
    options: &mut RuntimeOptions,
    document: &Value,
) -> Result<(), OptionsMergeError> {
    let Value::Object(fields) = document else {
        return Err(OptionsMergeError::NotAnObject);
    };
    for (key, value) in fields {
        match key.as_str() {
            "eventLoopPoolSize" => {
                options.event_loop_pool_size = int_field("eventLoopPoolSize", value)?;
            }
            "workerPoolSize" => {
                options.worker_pool_size = int_field("workerPoolSize", value)?;
            }
            "maxEventLoopExecuteTime" => {
                options.max_event_loop_execute_time =
                    int_field("maxEventLoopExecuteTime", value)?;
            }
            "maxEventLoopExecuteTimeUnit" => {
                let raw = string_field("maxEventLoopExecuteTimeUnit", value)?;
                options.max_event_loop_execute_time_unit =
                    TimeUnit::parse(raw).map_err(|source| OptionsMergeError::Field {
                        field: "maxEventLoopExecuteTimeUnit".to_owned(),
                        source,
                    })?;
            }
            "clustered" => options.clustered = bool_field("clustered", value)?,
            "haGroup" => options.ha_group = string_field("haGroup", value)?.to_owned(),
            "metricsOptions" => {
                let Value::Object(nested) = value else {
                    return Err(OptionsMergeError::NestedNotAnObject {
                        field: "metricsOptions",
                    });
                };
                apply_metrics_fields(options, nested)?;
            }
            "eventBusOptions" => {
                let Value::Object(nested) = value else {
                    return Err(OptionsMergeError::NestedNotAnObject {
                        field: "eventBusOptions",
                    });
                };
                apply_event_bus_fields(options, nested)?;
            }
            // Unknown top-level fields are ignored.
            _ => {}
        }
    }
    Ok(())
}

fn apply_metrics_fields(
    options: &mut RuntimeOptions,
    fields: &Map<String, Value>,
) -> Result<(), OptionsMergeError> {
    for (key, value) in fields {
        if key == "enabled" {
            options.metrics.enabled = bool_field("metricsOptions.enabled", value)?;
        } else {
            // Provider-specific fields are preserved verbatim; nested
            // documents merge recursively rather than replacing.
            match options.metrics.extra.get_mut(key) {
                Some(existing) => deep_merge(existing, value),
                None => {
                    options.metrics.extra.insert(key.clone(), value.clone());
                }
            }
        }
    }
    Ok(())
}

fn apply_event_bus_fields(
    options: &mut RuntimeOptions,
    fields: &Map<String, Value>,
) -> Result<(), OptionsMergeError> {
    for (key, value) in fields {
        match key.as_str() {
            "host" => {
                options.event_bus.cluster_host =
                    string_field("eventBusOptions.host", value)?.to_owned();
            }
            "port" => {
                options.event_bus.cluster_port = int_field("eventBusOptions.port", value)?;
            }
            "clusterPublicHost" => {
                options.event_bus.cluster_public_host =
                    Some(string_field("eventBusOptions.clusterPublicHost", value)?.to_owned());
            }
            "clusterPublicPort" => {
                options.event_bus.cluster_public_port =
                    int_field("eventBusOptions.clusterPublicPort", value)?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn apply_overrides(options: &mut RuntimeOptions, overrides: &CommandLineOverrides) {
    if overrides.clustered {
        options.clustered = true;
    }
    if let Some(host) = &overrides.cluster_host {
        options.event_bus.cluster_host = host.clone();
    }
    if let Some(port) = overrides.cluster_port {
        options.event_bus.cluster_port = port;
    }
    if let Some(host) = &overrides.cluster_public_host {
        options.event_bus.cluster_public_host = Some(host.clone());
    }
    if let Some(port) = overrides.cluster_public_port {
        options.event_bus.cluster_public_port = port;
    }
}

fn positive_u32(raw: &str) -> Option<u32> {
    let value = coerce_int_text(raw).ok()?;
    let value = u32::try_from(value).ok()?;
    (value >= 1).then_some(value)
}

fn int_field<T: TryFrom<i64>>(field: &'static str, value: &Value) -> Result<T, OptionsMergeError> {
    let parsed = coerce_int(value).map_err(|source| OptionsMergeError::Field {
        field: field.to_owned(),
        source,
    })?;
    T::try_from(parsed).map_err(|_| OptionsMergeError::Field {
        field: field.to_owned(),
        source: CoercionError::OutOfRange {
            value: parsed,
            field,
        },
    })
}

fn string_field<'a>(field: &'static str, value: &'a Value) -> Result<&'a str, OptionsMergeError> {
    coerce_string(value).map_err(|source| OptionsMergeError::Field {
        field: field.to_owned(),
        source,
    })
}

fn bool_field(field: &'static str, value: &Value) -> Result<bool, OptionsMergeError> {
    match value {
        Value::Bool(flag) => Ok(*flag),
        Value::String(text) if text.eq_ignore_ascii_case("true") => Ok(true),
        Value::String(text) if text.eq_ignore_ascii_case("false") => Ok(false),
        other => Err(OptionsMergeError::Field {
            field: field.to_owned(),
            source: CoercionError::NotAString(other.clone()),
        }),
    }
}
