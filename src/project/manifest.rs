//! The `project.qpproj` manifest: reading, validation and atomic writes.
//!
//! Unknown fields, at the top level and inside each image record, are kept
//! in `extra` maps and written back unchanged.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use tempfile::NamedTempFile;

use super::calibration::PixelCalibration;
use super::entry::ImageType;
use super::ids::EntryId;
use crate::error::PathMirrorError;
use crate::taxonomy::{ClassPath, Rgb};

/// File name of the manifest inside a project directory.
pub const MANIFEST_FILE: &str = "project.qpproj";

/// Newest manifest format version this crate reads and writes.
pub const MANIFEST_VERSION: u32 = 1;

/// One image record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub id: Option<EntryId>,
    pub name: Option<String>,
    pub server_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub image_type: ImageType,

    #[serde(default)]
    pub metadata: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_calibration: Option<PixelCalibration>,

    #[serde(flatten)]
    pub extra: Map<String, Json>,
}

/// One classification record: full name path and packed ARGB color.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManifestClass {
    pub name: String,
    pub color: i32,
}

/// A manifest that passed validation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: u32,
    pub last_id: EntryId,
    pub images: Vec<ManifestEntry>,
    pub path_classes: Vec<ManifestClass>,

    #[serde(flatten)]
    pub extra: Map<String, Json>,
}

/// Builds `ManifestCorruption` errors for one manifest file.
struct Corruption<'a> {
    path: &'a Path,
}

impl Corruption<'_> {
    fn at(&self, field: impl Into<String>, reason: impl Into<String>) -> PathMirrorError {
        PathMirrorError::ManifestCorruption {
            path: self.path.to_path_buf(),
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl Manifest {
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION,
            last_id: EntryId::new(0),
            images: Vec::new(),
            path_classes: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Classes as taxonomy entries, validated.
    pub fn classes(&self, path: &Path) -> Result<Vec<(ClassPath, Rgb)>, PathMirrorError> {
        let corrupt = Corruption { path };
        self.path_classes
            .iter()
            .enumerate()
            .map(|(i, class)| {
                let parsed = ClassPath::parse(&class.name)
                    .map_err(|e| corrupt.at(format!("pathClasses[{}].name", i), e.to_string()))?;
                Ok((parsed, Rgb::from_packed(class.color)))
            })
            .collect()
    }
}

/// Parses and validates manifest bytes. `path` is only used in errors.
pub fn from_manifest_slice(bytes: &[u8], path: &Path) -> Result<Manifest, PathMirrorError> {
    let json: Json =
        serde_json::from_slice(bytes).map_err(|source| PathMirrorError::ManifestParse {
            path: path.to_path_buf(),
            source,
        })?;
    from_json(json, path)
}

pub fn from_manifest_str(text: &str, path: &Path) -> Result<Manifest, PathMirrorError> {
    from_manifest_slice(text.as_bytes(), path)
}

fn from_json(json: Json, path: &Path) -> Result<Manifest, PathMirrorError> {
    let corrupt = Corruption { path };
    let Json::Object(mut root) = json else {
        return Err(corrupt.at("(root)", "manifest must be a JSON object"));
    };

    let version = match root.remove("version") {
        None => return Err(corrupt.at("version", "missing")),
        Some(v) => v
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| corrupt.at("version", format!("expected an integer, got {}", v)))?,
    };
    if version > MANIFEST_VERSION {
        return Err(corrupt.at(
            "version",
            format!("unsupported version {} (newest known is {})", version, MANIFEST_VERSION),
        ));
    }

    let images = match root.remove("images") {
        None => Vec::new(),
        Some(Json::Array(items)) => items,
        Some(_) => return Err(corrupt.at("images", "expected a list")),
    };
    let mut entries = Vec::with_capacity(images.len());
    let mut seen = HashSet::new();
    let mut max_id = EntryId::new(0);
    for (i, item) in images.into_iter().enumerate() {
        let field = |name: &str| format!("images[{}].{}", i, name);
        let entry: ManifestEntry = serde_json::from_value(item)
            .map_err(|e| corrupt.at(format!("images[{}]", i), e.to_string()))?;

        let id = entry.id.ok_or_else(|| corrupt.at(field("id"), "missing"))?;
        if !seen.insert(id) {
            return Err(corrupt.at(field("id"), format!("duplicate id {}", id)));
        }
        max_id = max_id.max(id);
        if entry.name.is_none() {
            return Err(corrupt.at(field("name"), "missing"));
        }
        if entry.server_uri.is_none() {
            return Err(corrupt.at(field("serverUri"), "missing"));
        }
        if let Some(calibration) = &entry.pixel_calibration {
            calibration
                .validate()
                .map_err(|e| corrupt.at(field("pixelCalibration"), e.to_string()))?;
        }
        entries.push(entry);
    }

    let last_id = match root.remove("lastId") {
        None => max_id,
        Some(v) => {
            let id = v
                .as_u64()
                .map(EntryId::new)
                .ok_or_else(|| corrupt.at("lastId", format!("expected an integer, got {}", v)))?;
            if id < max_id {
                return Err(corrupt.at(
                    "lastId",
                    format!("{} is lower than image id {}", id, max_id),
                ));
            }
            id
        }
    };

    let path_classes = match root.remove("pathClasses") {
        None => Vec::new(),
        Some(Json::Array(items)) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                serde_json::from_value(item)
                    .map_err(|e| corrupt.at(format!("pathClasses[{}]", i), e.to_string()))
            })
            .collect::<Result<Vec<ManifestClass>, _>>()?,
        Some(_) => return Err(corrupt.at("pathClasses", "expected a list")),
    };

    let manifest = Manifest {
        version,
        last_id,
        images: entries,
        path_classes,
        extra: root,
    };
    manifest.classes(path)?;
    Ok(manifest)
}

/// Reads and validates the manifest at `path`.
pub(crate) fn read_manifest(path: &Path) -> Result<Manifest, PathMirrorError> {
    let bytes = fs::read(path)?;
    from_manifest_slice(&bytes, path)
}

/// Writes the manifest to a temporary file next to `path` and renames it
/// into place, so an interrupted save leaves the previous manifest intact.
pub(crate) fn write_manifest(path: &Path, manifest: &Manifest) -> Result<(), PathMirrorError> {
    let persistence = |source: std::io::Error| PathMirrorError::Persistence {
        path: path.to_path_buf(),
        source,
    };
    let dir: PathBuf = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut tmp = NamedTempFile::new_in(&dir).map_err(persistence)?;
    serde_json::to_writer_pretty(&mut tmp, manifest)
        .map_err(|e| persistence(e.into()))?;
    tmp.write_all(b"\n").map_err(persistence)?;
    tmp.flush().map_err(persistence)?;
    tmp.as_file().sync_all().map_err(persistence)?;
    tmp.persist(path).map_err(|e| persistence(e.error))?;
    Ok(())
}
