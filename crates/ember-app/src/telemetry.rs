//! Structured telemetry initialisation for the launcher.

use std::io;

use once_cell::sync::OnceCell;
use tracing::info;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use ember_config::{ID_PROPERTY, LOG_PROPERTY, PropertySnapshot};

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

const DEFAULT_LOG_FILTER: &str = "info";

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

/// Configures the global tracing subscriber when invoked for the first
/// time. Repeated calls detect the existing registration and return a
/// fresh [`TelemetryHandle`] without touching global state again.
pub fn initialise(snapshot: &PropertySnapshot) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(snapshot))
        .map(|()| TelemetryHandle)
}

fn install_subscriber(snapshot: &PropertySnapshot) -> Result<(), TelemetryError> {
    let expression = snapshot.get(LOG_PROPERTY).unwrap_or(DEFAULT_LOG_FILTER);
    let filter = EnvFilter::try_new(expression)
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(identity) = snapshot.get(ID_PROPERTY) {
        info!(target: "ember::launcher", identity, "telemetry initialised");
    }
    Ok(())
}
