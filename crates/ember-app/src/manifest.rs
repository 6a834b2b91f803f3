//! Packaging manifest lookup.
//!
//! When no deployable identifier is given on the command line, the
//! launcher consults the packaging manifest for a `mainDeployable`
//! entry. Manifest problems are never fatal: an unreadable or malformed
//! manifest simply resolves to no entry.

use std::fs;
use std::path::PathBuf;

use serde_json::Value;

use ember_config::{MANIFEST_PROPERTY, PropertySnapshot};

/// Default manifest path, relative to the working directory.
pub const DEFAULT_MANIFEST_PATH: &str = "ember-manifest.json";

const MAIN_DEPLOYABLE_KEY: &str = "mainDeployable";

/// Resolves the main deployable named by the packaging manifest.
pub trait ManifestLookup: Send + Sync {
    /// The manifest's main deployable identifier, if any.
    fn main_deployable(&self) -> Option<String>;
}

/// Reads the JSON manifest from disk.
#[derive(Debug, Clone)]
pub struct SystemManifest {
    path: PathBuf,
}

impl SystemManifest {
    /// Lookup over an explicit manifest path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Lookup at the path named by the `ember.manifest` property, or the
    /// default path.
    #[must_use]
    pub fn from_snapshot(snapshot: &PropertySnapshot) -> Self {
        let path = snapshot
            .get(MANIFEST_PROPERTY)
            .unwrap_or(DEFAULT_MANIFEST_PATH);
        Self::new(path)
    }
}

impl ManifestLookup for SystemManifest {
    fn main_deployable(&self) -> Option<String> {
        let content = fs::read_to_string(&self.path).ok()?;
        let manifest: Value = serde_json::from_str(&content).ok()?;
        manifest
            .get(MAIN_DEPLOYABLE_KEY)?
            .as_str()
            .map(str::to_owned)
    }
}

/// Fixed lookup for tests and embedding callers.
#[derive(Debug, Clone, Default)]
pub struct StaticManifest {
    entry: Option<String>,
}

impl StaticManifest {
    /// A manifest naming `identifier`.
    #[must_use]
    pub fn naming(identifier: impl Into<String>) -> Self {
        Self {
            entry: Some(identifier.into()),
        }
    }

    /// A manifest with no entry.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

impl ManifestLookup for StaticManifest {
    fn main_deployable(&self) -> Option<String> {
        self.entry.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn reads_the_main_deployable_entry() {
        let mut file = NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"mainDeployable":"ember:Heartbeat"}}"#).expect("write");
        let manifest = SystemManifest::new(file.path());
        assert_eq!(
            manifest.main_deployable().as_deref(),
            Some("ember:Heartbeat")
        );
    }

    #[test]
    fn missing_or_malformed_manifests_resolve_to_none() {
        assert_eq!(
            SystemManifest::new("/no/such/manifest.json").main_deployable(),
            None
        );

        let mut file = NamedTempFile::new().expect("temp file");
        write!(file, "not json").expect("write");
        assert_eq!(SystemManifest::new(file.path()).main_deployable(), None);

        let mut file = NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"otherKey":true}}"#).expect("write");
        assert_eq!(SystemManifest::new(file.path()).main_deployable(), None);
    }

    #[test]
    fn snapshot_property_overrides_the_default_path() {
        let mut file = NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"mainDeployable":"FromProperty"}}"#).expect("write");
        let snapshot = PropertySnapshot::new().with(
            MANIFEST_PROPERTY,
            file.path().to_string_lossy().into_owned(),
        );
        let manifest = SystemManifest::from_snapshot(&snapshot);
        assert_eq!(manifest.main_deployable().as_deref(), Some("FromProperty"));
    }
}
