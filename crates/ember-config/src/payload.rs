//! Inline-or-file JSON document loading.
//!
//! Both the deployment payload (`--conf`) and the runtime options document
//! (`-options`) accept either a filesystem path or a JSON literal. The
//! detection rule is shared: if the raw string names an existing file it
//! is read from disk, otherwise it is parsed directly. The two callers
//! differ only in failure policy.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while loading the runtime options document.
///
/// Unlike the deployment payload, the options document is user-authored
/// configuration for the runtime itself, so malformed input is surfaced
/// rather than swallowed.
#[derive(Debug, Error)]
pub enum OptionsDocumentError {
    /// The argument named an existing file that could not be read.
    #[error("failed to read options file '{path}': {source}")]
    Read {
        /// Path of the unreadable file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// The document content was not valid JSON.
    #[error("invalid options document: {0}")]
    Parse(#[from] serde_json::Error),
    /// The document parsed but was not a JSON object.
    #[error("options document must be a JSON object, got '{0}'")]
    NotAnObject(Value),
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn resolve_content(raw: &str) -> Result<String, OptionsDocumentError> {
    let candidate = Path::new(raw);
    if candidate.is_file() {
        fs::read_to_string(candidate).map_err(|source| OptionsDocumentError::Read {
            path: candidate.to_path_buf(),
            source,
        })
    } else {
        Ok(raw.to_owned())
    }
}

/// Loads the deployment configuration payload.
///
/// Any failure (unreadable file, malformed JSON, non-object document)
/// resolves to an empty object so that bad payload input never blocks a
/// launch.
#[must_use]
pub fn read_deployment_payload(raw: &str) -> Value {
    let Ok(content) = resolve_content(raw) else {
        return empty_object();
    };
    match serde_json::from_str::<Value>(&content) {
        Ok(document @ Value::Object(_)) => document,
        _ => empty_object(),
    }
}

/// Loads the runtime options document, strictly.
pub fn read_options_document(raw: &str) -> Result<Value, OptionsDocumentError> {
    let content = resolve_content(raw)?;
    let document: Value = serde_json::from_str(&content)?;
    match document {
        Value::Object(_) => Ok(document),
        other => Err(OptionsDocumentError::NotAnObject(other)),
    }
}
