//! Read-only settings consumed by runtime bridge adapters.
//!
//! Settings are layered: built-in defaults, then an optional JSON file,
//! then `PATHMIRROR_*` environment variables. The core object model never
//! reads them; only bridge adapters do.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PathMirrorError;

/// Environment variable overriding [`BridgeSettings::install_dir`].
pub const ENV_INSTALL_DIR: &str = "PATHMIRROR_INSTALL_DIR";
/// Environment variable overriding [`BridgeSettings::version`].
pub const ENV_VERSION: &str = "PATHMIRROR_VERSION";
/// Environment variable overriding [`BridgeSettings::jvm_options`]
/// (whitespace separated).
pub const ENV_JVM_OPTIONS: &str = "PATHMIRROR_JVM_OPTIONS";

/// Where and how to start the foreign runtime.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeSettings {
    /// Installation directory of the application, if not auto-detected.
    pub install_dir: Option<PathBuf>,

    /// Expected application version, e.g. "0.5.1".
    pub version: Option<String>,

    /// Extra options passed to the managed runtime on start.
    pub jvm_options: Vec<String>,
}

impl BridgeSettings {
    /// Resolves settings from an optional file and the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self, PathMirrorError> {
        let base = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(base.with_overrides(std::env::vars()))
    }

    /// Reads settings from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, PathMirrorError> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| PathMirrorError::Settings(format!("{}: {}", path.display(), e)))
    }

    /// Applies `PATHMIRROR_*` overrides from `(key, value)` pairs.
    ///
    /// Empty values are ignored so an exported-but-blank variable does not
    /// erase a file setting.
    pub fn with_overrides<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let value = value.as_ref().trim();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                ENV_INSTALL_DIR => self.install_dir = Some(PathBuf::from(value)),
                ENV_VERSION => self.version = Some(value.to_string()),
                ENV_JVM_OPTIONS => {
                    self.jvm_options = value.split_whitespace().map(str::to_string).collect()
                }
                _ => {}
            }
        }
        self
    }
}
