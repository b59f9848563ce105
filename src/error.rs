use std::path::PathBuf;
use thiserror::Error;

/// The main error type for pathmirror operations.
#[derive(Debug, Error)]
pub enum PathMirrorError {
    #[error("Bridge unavailable: {0}")]
    BridgeUnavailable(String),

    #[error("Foreign call {class}.{method} failed: {message}")]
    ForeignCall {
        class: String,
        method: String,
        message: String,
    },

    #[error("Unexpected value from {context}: expected {expected}, got {found}")]
    UnexpectedValue {
        context: String,
        expected: &'static str,
        found: String,
    },

    #[error("Geometry conversion failed: {0}")]
    GeometryConversion(String),

    #[error("Hierarchy integrity violation: {0}")]
    HierarchyIntegrity(String),

    #[error("Invalid classification name '{name}': {reason}")]
    InvalidClassName { name: String, reason: String },

    #[error("Corrupt manifest {path}: field '{field}': {reason}")]
    ManifestCorruption {
        path: PathBuf,
        field: String,
        reason: String,
    },

    #[error("Failed to parse manifest {path}: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to persist {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid pixel calibration: {0}")]
    InvalidCalibration(String),

    #[error("Invalid GeoJSON: {0}")]
    GeoJson(String),

    #[error("Invalid URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("Invalid settings: {0}")]
    Settings(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PathMirrorError {
    pub(crate) fn integrity(message: impl Into<String>) -> Self {
        PathMirrorError::HierarchyIntegrity(message.into())
    }

    pub(crate) fn geometry(message: impl Into<String>) -> Self {
        PathMirrorError::GeometryConversion(message.into())
    }
}
