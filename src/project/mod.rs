//! Projects: an ordered set of image entries sharing one taxonomy.
//!
//! On disk a project is a directory holding the `project.qpproj` manifest
//! and a `data/<id>/` directory per entry. That directory holds the
//! `data.qpdata` hierarchy, written and read by the foreign runtime, and
//! `properties.json` with the entry's image data properties.
//!
//! Two processes must not save the same project concurrently; no
//! cross-process locking is done here.
//!
//! # Example
//!
//! ```
//! use pathmirror::bridge::Session;
//! use pathmirror::project::{ImageOptions, PixelCalibration, Project};
//!
//! let dir = tempfile::tempdir()?;
//! let session = Session::in_memory()?;
//! let mut project = Project::create(&session, dir.path())?;
//! let entry = project.add_image(
//!     "file:///data/slide.svs",
//!     ImageOptions::new().calibration(PixelCalibration::microns(0.5, 0.5)?),
//! )?;
//! assert_eq!(entry.name()?, "slide.svs");
//! project.save_and_close()?;
//! # Ok::<(), pathmirror::PathMirrorError>(())
//! ```

mod calibration;
mod entry;
mod ids;
pub mod manifest;
mod uri;

pub use calibration::{PixelCalibration, MICROMETER};
pub use entry::{ImageEntry, ImageType, PROPERTIES_FILE};
pub use ids::EntryId;
pub use uri::{compare_uris, path_from_uri, uri_from_path};

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value as Json};
use tracing::{debug, warn};

use self::manifest::{read_manifest, write_manifest, Manifest, ManifestClass, MANIFEST_FILE};
use crate::bridge::Session;
use crate::error::PathMirrorError;
use crate::revision::Revision;
use crate::taxonomy::Taxonomy;

/// Directory, relative to the project, holding per-entry data.
pub const DATA_DIR: &str = "data";

/// File name of a serialized hierarchy inside an entry's data directory.
pub const HIERARCHY_FILE: &str = "data.qpdata";

/// Optional attributes for [`Project::add_image`].
#[derive(Clone, Debug, Default)]
pub struct ImageOptions {
    /// Display name; defaults to the last path segment of the URI.
    pub name: Option<String>,
    pub description: Option<String>,
    pub calibration: Option<PixelCalibration>,
    pub image_type: ImageType,
    pub metadata: Vec<(String, String)>,
    /// Allow a URI that another entry already uses.
    pub allow_duplicates: bool,
}

impl ImageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn calibration(mut self, calibration: PixelCalibration) -> Self {
        self.calibration = Some(calibration);
        self
    }

    pub fn image_type(mut self, image_type: ImageType) -> Self {
        self.image_type = image_type;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    pub fn allow_duplicates(mut self, allow: bool) -> Self {
        self.allow_duplicates = allow;
        self
    }
}

/// Default display name: the decoded last path segment of the URI.
fn default_name(uri: &url::Url) -> Option<String> {
    let segment = uri.path_segments()?.next_back()?;
    let decoded = urlencoding::decode(segment).ok()?;
    (!decoded.is_empty()).then(|| decoded.into_owned())
}

fn same_uri(a: &str, b: &str) -> bool {
    a == b || compare_uris(a, b).unwrap_or(false)
}

fn hierarchy_path(entry: &ImageEntry) -> PathBuf {
    entry.entry_path().join(HIERARCHY_FILE)
}

/// A project opened against one runtime session.
///
/// Dropping or [closing](Project::close) a project with unsaved changes
/// discards them and logs a warning.
pub struct Project {
    dir: PathBuf,
    taxonomy: Taxonomy,
    revision: Revision,
    entries: Vec<ImageEntry>,
    removed: Vec<EntryId>,
    last_id: EntryId,
    extra: Map<String, Json>,
    saved_revision: u64,
    closed: bool,
}

impl Project {
    /// Creates a new project in `dir` and writes an empty manifest.
    ///
    /// # Errors
    /// `Persistence` if `dir` already holds a project or cannot be created.
    pub fn create(session: &Session, dir: impl AsRef<Path>) -> Result<Self, PathMirrorError> {
        let dir = dir.as_ref().to_path_buf();
        let manifest_path = dir.join(MANIFEST_FILE);
        if manifest_path.exists() {
            return Err(PathMirrorError::Persistence {
                path: manifest_path,
                source: std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "a project already exists here",
                ),
            });
        }
        fs::create_dir_all(&dir).map_err(|source| PathMirrorError::Persistence {
            path: dir.clone(),
            source,
        })?;

        let mut project = Self::empty(session, dir, &Manifest::empty());
        project.save()?;
        debug!(dir = %project.dir.display(), "project created");
        Ok(project)
    }

    /// Opens the project in `dir`.
    ///
    /// # Errors
    /// `ManifestParse` for malformed JSON, `ManifestCorruption` naming the
    /// offending field for invalid content, `Io` if the manifest cannot be
    /// read.
    pub fn open(session: &Session, dir: impl AsRef<Path>) -> Result<Self, PathMirrorError> {
        let dir = dir.as_ref().to_path_buf();
        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest = read_manifest(&manifest_path)?;

        let mut project = Self::empty(session, dir, &manifest);
        project.taxonomy.restore(&manifest.classes(&manifest_path)?)?;
        for record in &manifest.images {
            let entry =
                ImageEntry::from_manifest(&project.taxonomy, record, &project.dir.join(DATA_DIR))?;
            let data = hierarchy_path(&entry);
            if data.is_file() {
                entry.hierarchy().read_from(&data)?;
            }
            entry.read_properties()?;
            project.entries.push(entry);
        }
        project.saved_revision = project.revision.current();
        debug!(
            dir = %project.dir.display(),
            images = project.entries.len(),
            "project opened"
        );
        Ok(project)
    }

    fn empty(session: &Session, dir: PathBuf, manifest: &Manifest) -> Self {
        let revision = Revision::new();
        Self {
            dir,
            taxonomy: Taxonomy::with_revision(session, revision.clone()),
            saved_revision: revision.current(),
            revision,
            entries: Vec::new(),
            removed: Vec::new(),
            last_id: manifest.last_id,
            extra: manifest.extra.clone(),
            closed: false,
        }
    }

    /// The project directory.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    fn entry_dir(&self, id: EntryId) -> PathBuf {
        self.dir.join(DATA_DIR).join(id.to_string())
    }

    /// The taxonomy shared by every entry.
    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Registers an image and returns its entry.
    ///
    /// # Errors
    /// `InvalidUri` if `server_uri` does not parse, or names an image that
    /// is already in the project and `allow_duplicates` is not set.
    /// `InvalidCalibration` for an invalid calibration.
    pub fn add_image(
        &mut self,
        server_uri: &str,
        options: ImageOptions,
    ) -> Result<ImageEntry, PathMirrorError> {
        let url = url::Url::parse(server_uri).map_err(|e| PathMirrorError::InvalidUri {
            uri: server_uri.to_string(),
            reason: e.to_string(),
        })?;
        if !options.allow_duplicates {
            for entry in &self.entries {
                if same_uri(&entry.server_uri()?, server_uri) {
                    return Err(PathMirrorError::InvalidUri {
                        uri: server_uri.to_string(),
                        reason: format!("already in the project as entry {}", entry.id()),
                    });
                }
            }
        }
        if let Some(calibration) = &options.calibration {
            calibration.validate()?;
        }

        let name = options
            .name
            .clone()
            .or_else(|| default_name(&url))
            .unwrap_or_else(|| server_uri.to_string());
        let id = self.last_id.next();
        let entry = ImageEntry::create(&self.taxonomy, id, server_uri, &name, self.entry_dir(id))?;
        if options.description.is_some() {
            entry.set_description(options.description.as_deref())?;
        }
        if options.calibration.is_some() {
            entry.set_calibration(options.calibration.as_ref())?;
        }
        entry.set_image_type(options.image_type)?;
        for (key, value) in &options.metadata {
            entry.set_metadata_value(key, value)?;
        }

        self.last_id = id;
        self.entries.push(entry.clone());
        self.revision.bump();
        debug!(id = %id, uri = server_uri, "image added");
        Ok(entry)
    }

    /// Entries in insertion order.
    pub fn images(&self) -> &[ImageEntry] {
        &self.entries
    }

    pub fn image(&self, id: EntryId) -> Option<&ImageEntry> {
        self.entries.iter().find(|e| e.id() == id)
    }

    /// Removes an entry. Its data directory is deleted on the next save.
    pub fn remove_image(&mut self, id: EntryId) -> Option<ImageEntry> {
        let index = self.entries.iter().position(|e| e.id() == id)?;
        let entry = self.entries.remove(index);
        self.removed.push(id);
        self.revision.bump();
        Some(entry)
    }

    /// Points entries at moved images.
    ///
    /// `rebase` maps an entry's current URI to its new location, or returns
    /// `None` to leave the entry alone. Every new URI is checked before any
    /// entry changes; URIs naming the same image as before are skipped.
    /// Returns the number of entries updated.
    ///
    /// # Errors
    /// `InvalidUri` if a returned URI does not parse. No entry is changed.
    pub fn update_image_paths<F>(&mut self, mut rebase: F) -> Result<usize, PathMirrorError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut moves = Vec::new();
        for entry in &self.entries {
            let current = entry.server_uri()?;
            let Some(target) = rebase(&current) else {
                continue;
            };
            url::Url::parse(&target).map_err(|e| PathMirrorError::InvalidUri {
                uri: target.clone(),
                reason: e.to_string(),
            })?;
            if !same_uri(&current, &target) {
                moves.push((entry, current, target));
            }
        }

        for (entry, from, to) in &moves {
            entry.set_server_uri(to)?;
            debug!(id = %entry.id(), from = %from, to = %to, "image moved");
        }
        if !moves.is_empty() {
            self.revision.bump();
        }
        Ok(moves.len())
    }

    /// Returns true if anything changed since the last save or open.
    pub fn is_dirty(&self) -> bool {
        self.revision.current() != self.saved_revision
    }

    /// Flushes every entry and writes the manifest.
    ///
    /// References to removed classifications are dropped first. Each
    /// hierarchy is then written by the foreign runtime, and finally the
    /// manifest is replaced atomically. If anything fails the previous
    /// manifest stays in place.
    pub fn save(&mut self) -> Result<(), PathMirrorError> {
        let mut swept = 0;
        for entry in &self.entries {
            swept += entry.hierarchy().sweep_tombstoned()?;
        }
        if swept > 0 {
            warn!(objects = swept, "dropped references to removed classifications");
        }

        for entry in &self.entries {
            let dir = entry.entry_path();
            fs::create_dir_all(dir).map_err(|source| PathMirrorError::Persistence {
                path: dir.to_path_buf(),
                source,
            })?;
            entry.hierarchy().write_to(&hierarchy_path(entry))?;
            entry.write_properties()?;
        }

        let manifest = Manifest {
            last_id: self.last_id,
            images: self
                .entries
                .iter()
                .map(ImageEntry::to_manifest)
                .collect::<Result<_, _>>()?,
            path_classes: self
                .taxonomy
                .entries()?
                .into_iter()
                .map(|(path, color)| ManifestClass {
                    name: path.to_string(),
                    color: color.to_packed(),
                })
                .collect(),
            extra: self.extra.clone(),
            ..Manifest::empty()
        };
        write_manifest(&self.manifest_path(), &manifest)?;

        for id in std::mem::take(&mut self.removed) {
            let dir = self.entry_dir(id);
            if dir.is_dir() {
                fs::remove_dir_all(&dir).map_err(|source| PathMirrorError::Persistence {
                    path: dir.clone(),
                    source,
                })?;
            }
        }

        self.saved_revision = self.revision.current();
        debug!(
            dir = %self.dir.display(),
            images = self.entries.len(),
            "project saved"
        );
        Ok(())
    }

    /// Closes the project without saving.
    ///
    /// Unsaved changes are discarded; a warning is logged if there are any.
    pub fn close(mut self) {
        self.warn_if_dirty();
        self.closed = true;
    }

    /// Saves, then closes.
    pub fn save_and_close(mut self) -> Result<(), PathMirrorError> {
        self.save()?;
        self.closed = true;
        Ok(())
    }

    fn warn_if_dirty(&self) {
        if self.is_dirty() {
            warn!(
                dir = %self.dir.display(),
                "closing project with unsaved changes; they are discarded"
            );
        }
    }
}

impl Drop for Project {
    fn drop(&mut self) {
        if !self.closed {
            self.warn_if_dirty();
        }
    }
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("dir", &self.dir)
            .field("images", &self.entries.len())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}
