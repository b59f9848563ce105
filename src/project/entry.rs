use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use tempfile::NamedTempFile;

use super::calibration::PixelCalibration;
use super::ids::EntryId;
use super::manifest::ManifestEntry;
use super::uri::path_from_uri;
use crate::bridge::{classes, ForeignRef, Session, Value};
use crate::error::PathMirrorError;
use crate::hierarchy::Hierarchy;
use crate::taxonomy::Taxonomy;

/// How an image was acquired, which drives stain handling in the
/// application.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImageType {
    BrightfieldHDab,
    BrightfieldHE,
    BrightfieldOther,
    Fluorescence,
    Other,
    #[default]
    Unset,
}

impl ImageType {
    pub const ALL: [ImageType; 6] = [
        ImageType::BrightfieldHDab,
        ImageType::BrightfieldHE,
        ImageType::BrightfieldOther,
        ImageType::Fluorescence,
        ImageType::Other,
        ImageType::Unset,
    ];

    /// The application's enum constant name.
    pub fn constant(self) -> &'static str {
        match self {
            ImageType::BrightfieldHDab => "BRIGHTFIELD_H_DAB",
            ImageType::BrightfieldHE => "BRIGHTFIELD_H_E",
            ImageType::BrightfieldOther => "BRIGHTFIELD_OTHER",
            ImageType::Fluorescence => "FLUORESCENCE",
            ImageType::Other => "OTHER",
            ImageType::Unset => "UNSET",
        }
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ImageType::BrightfieldHDab => "Brightfield (H-DAB)",
            ImageType::BrightfieldHE => "Brightfield (H&E)",
            ImageType::BrightfieldOther => "Brightfield (other)",
            ImageType::Fluorescence => "Fluorescence",
            ImageType::Other => "Other",
            ImageType::Unset => "Not set",
        };
        f.write_str(label)
    }
}

/// Accepts either the constant name or the display label.
impl FromStr for ImageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImageType::ALL
            .into_iter()
            .find(|t| t.constant() == s || t.to_string() == s)
            .ok_or_else(|| format!("unknown image type '{}'", s))
    }
}

/// One image registered in a project.
///
/// A thin proxy over the foreign entry object. Cloning shares the entry and
/// its single [`Hierarchy`].
#[derive(Clone)]
pub struct ImageEntry {
    inner: Rc<EntryInner>,
}

/// File name of the image data properties inside an entry's directory.
pub const PROPERTIES_FILE: &str = "properties.json";

struct EntryInner {
    id: EntryId,
    handle: ForeignRef,
    taxonomy: Taxonomy,
    hierarchy: Hierarchy,
    dir: PathBuf,
    properties: RefCell<BTreeMap<String, Json>>,
    extra: Map<String, Json>,
}

impl ImageEntry {
    pub(crate) fn create(
        taxonomy: &Taxonomy,
        id: EntryId,
        server_uri: &str,
        name: &str,
        dir: PathBuf,
    ) -> Result<Self, PathMirrorError> {
        Self::build(taxonomy, id, server_uri, name, dir, Map::new())
    }

    fn build(
        taxonomy: &Taxonomy,
        id: EntryId,
        server_uri: &str,
        name: &str,
        dir: PathBuf,
        extra: Map<String, Json>,
    ) -> Result<Self, PathMirrorError> {
        let session = taxonomy.session();
        let handle = session.construct(
            classes::PROJECT_ENTRY,
            &[
                Value::Int(id.as_u64() as i64),
                server_uri.into(),
                name.into(),
            ],
        )?;
        Ok(Self {
            inner: Rc::new(EntryInner {
                id,
                handle,
                taxonomy: taxonomy.clone(),
                hierarchy: Hierarchy::new(taxonomy)?,
                dir,
                properties: RefCell::new(BTreeMap::new()),
                extra,
            }),
        })
    }

    /// Recreates an entry from a validated manifest record.
    pub(crate) fn from_manifest(
        taxonomy: &Taxonomy,
        record: &ManifestEntry,
        data_dir: &Path,
    ) -> Result<Self, PathMirrorError> {
        let unexpected = |field: &'static str| PathMirrorError::UnexpectedValue {
            context: "manifest entry".to_string(),
            expected: field,
            found: "nothing".to_string(),
        };
        let id = record.id.ok_or_else(|| unexpected("id"))?;
        let name = record.name.as_deref().ok_or_else(|| unexpected("name"))?;
        let uri = record
            .server_uri
            .as_deref()
            .ok_or_else(|| unexpected("serverUri"))?;

        let dir = data_dir.join(id.to_string());
        let entry = Self::build(taxonomy, id, uri, name, dir, record.extra.clone())?;
        entry.write_description(record.description.as_deref())?;
        entry.write_image_type(record.image_type)?;
        entry.write_calibration(record.pixel_calibration.as_ref())?;
        for (key, value) in &record.metadata {
            entry.call("putMetadataValue", &[key.as_str().into(), value.as_str().into()])?;
        }
        Ok(entry)
    }

    pub(crate) fn to_manifest(&self) -> Result<ManifestEntry, PathMirrorError> {
        Ok(ManifestEntry {
            id: Some(self.inner.id),
            name: Some(self.name()?),
            server_uri: Some(self.server_uri()?),
            description: self.description()?,
            image_type: self.image_type()?,
            metadata: self.metadata()?.into_iter().collect(),
            pixel_calibration: self.calibration()?,
            extra: self.inner.extra.clone(),
        })
    }

    fn session(&self) -> &Session {
        self.inner.taxonomy.session()
    }

    fn call(&self, method: &str, args: &[Value]) -> Result<Value, PathMirrorError> {
        self.session().call(self.inner.handle, method, args)
    }

    fn mutate(&self, method: &str, args: &[Value]) -> Result<Value, PathMirrorError> {
        let result = self.call(method, args)?;
        self.inner.taxonomy.revision().bump();
        Ok(result)
    }

    pub fn id(&self) -> EntryId {
        self.inner.id
    }

    /// Display name.
    pub fn name(&self) -> Result<String, PathMirrorError> {
        Ok(self
            .call("getImageName", &[])?
            .as_str("ProjectImageEntry.getImageName")?
            .to_string())
    }

    pub fn set_name(&self, name: &str) -> Result<(), PathMirrorError> {
        self.mutate("setImageName", &[name.into()])?;
        Ok(())
    }

    pub fn server_uri(&self) -> Result<String, PathMirrorError> {
        Ok(self
            .call("getServerURI", &[])?
            .as_str("ProjectImageEntry.getServerURI")?
            .to_string())
    }

    /// Points the entry at a moved image. The URI must parse.
    pub fn set_server_uri(&self, uri: &str) -> Result<(), PathMirrorError> {
        url::Url::parse(uri).map_err(|e| PathMirrorError::InvalidUri {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;
        self.mutate("setServerURI", &[uri.into()])?;
        Ok(())
    }

    pub fn description(&self) -> Result<Option<String>, PathMirrorError> {
        Ok(self
            .call("getDescription", &[])?
            .as_opt_str("ProjectImageEntry.getDescription")?
            .map(str::to_string))
    }

    fn write_description(&self, text: Option<&str>) -> Result<(), PathMirrorError> {
        self.call("setDescription", &[text.into()])?;
        Ok(())
    }

    pub fn set_description(&self, text: Option<&str>) -> Result<(), PathMirrorError> {
        self.write_description(text)?;
        self.inner.taxonomy.revision().bump();
        Ok(())
    }

    pub fn image_type(&self) -> Result<ImageType, PathMirrorError> {
        match self.call("getImageType", &[])? {
            Value::Null => Ok(ImageType::Unset),
            value => {
                let name = value.as_str("ProjectImageEntry.getImageType")?;
                name.parse().map_err(|_| PathMirrorError::UnexpectedValue {
                    context: "ProjectImageEntry.getImageType".to_string(),
                    expected: "image type constant",
                    found: name.to_string(),
                })
            }
        }
    }

    fn write_image_type(&self, image_type: ImageType) -> Result<(), PathMirrorError> {
        self.call("setImageType", &[image_type.constant().into()])?;
        Ok(())
    }

    pub fn set_image_type(&self, image_type: ImageType) -> Result<(), PathMirrorError> {
        self.write_image_type(image_type)?;
        self.inner.taxonomy.revision().bump();
        Ok(())
    }

    /// The pixel calibration, or `None` for pixel units only.
    pub fn calibration(&self) -> Result<Option<PixelCalibration>, PathMirrorError> {
        match self
            .call("getPixelCalibration", &[])?
            .as_opt_ref("ProjectImageEntry.getPixelCalibration")?
        {
            Some(handle) => PixelCalibration::from_foreign(self.session(), handle).map(Some),
            None => Ok(None),
        }
    }

    fn write_calibration(
        &self,
        calibration: Option<&PixelCalibration>,
    ) -> Result<(), PathMirrorError> {
        let value = match calibration {
            Some(calibration) => {
                calibration.validate()?;
                Value::Ref(calibration.to_foreign(self.session())?)
            }
            None => Value::Null,
        };
        self.call("setPixelCalibration", &[value])?;
        Ok(())
    }

    /// Replaces (or clears) the calibration.
    pub fn set_calibration(
        &self,
        calibration: Option<&PixelCalibration>,
    ) -> Result<(), PathMirrorError> {
        self.write_calibration(calibration)?;
        self.inner.taxonomy.revision().bump();
        Ok(())
    }

    /// All metadata pairs in insertion order.
    pub fn metadata(&self) -> Result<Vec<(String, String)>, PathMirrorError> {
        let keys = self.call("getMetadataKeys", &[])?;
        let mut out = Vec::new();
        for key in keys.as_list("ProjectImageEntry.getMetadataKeys")? {
            let key = key.as_str("ProjectImageEntry.getMetadataKeys")?;
            if let Some(value) = self.metadata_value(key)? {
                out.push((key.to_string(), value));
            }
        }
        Ok(out)
    }

    pub fn metadata_value(&self, key: &str) -> Result<Option<String>, PathMirrorError> {
        Ok(self
            .call("getMetadataValue", &[key.into()])?
            .as_opt_str("ProjectImageEntry.getMetadataValue")?
            .map(str::to_string))
    }

    pub fn set_metadata_value(&self, key: &str, value: &str) -> Result<(), PathMirrorError> {
        self.mutate("putMetadataValue", &[key.into(), value.into()])?;
        Ok(())
    }

    /// Returns true if the key was present.
    pub fn remove_metadata_value(&self, key: &str) -> Result<bool, PathMirrorError> {
        self.mutate("removeMetadataValue", &[key.into()])?
            .as_bool("ProjectImageEntry.removeMetadataValue")
    }

    pub fn clear_metadata(&self) -> Result<(), PathMirrorError> {
        self.mutate("clearMetadata", &[])?;
        Ok(())
    }

    /// The entry's annotation hierarchy. Always the same instance.
    pub fn hierarchy(&self) -> &Hierarchy {
        &self.inner.hierarchy
    }

    /// The directory holding this entry's data inside the project.
    ///
    /// It is created on the first save.
    pub fn entry_path(&self) -> &Path {
        &self.inner.dir
    }

    /// Image data properties: free-form values stored with the hierarchy.
    pub fn properties(&self) -> BTreeMap<String, Json> {
        self.inner.properties.borrow().clone()
    }

    pub fn property(&self, key: &str) -> Option<Json> {
        self.inner.properties.borrow().get(key).cloned()
    }

    pub fn set_property(&self, key: impl Into<String>, value: impl Into<Json>) {
        self.inner
            .properties
            .borrow_mut()
            .insert(key.into(), value.into());
        self.inner.taxonomy.revision().bump();
    }

    /// Removes a property and returns its value.
    pub fn remove_property(&self, key: &str) -> Option<Json> {
        let removed = self.inner.properties.borrow_mut().remove(key);
        if removed.is_some() {
            self.inner.taxonomy.revision().bump();
        }
        removed
    }

    pub fn clear_properties(&self) {
        let mut properties = self.inner.properties.borrow_mut();
        if !properties.is_empty() {
            properties.clear();
            self.inner.taxonomy.revision().bump();
        }
    }

    fn properties_path(&self) -> PathBuf {
        self.inner.dir.join(PROPERTIES_FILE)
    }

    /// Writes the properties next to the hierarchy file, replacing the
    /// previous file atomically. No file is kept for an empty map.
    pub(crate) fn write_properties(&self) -> Result<(), PathMirrorError> {
        let path = self.properties_path();
        let persistence = |source: std::io::Error| PathMirrorError::Persistence {
            path: path.clone(),
            source,
        };

        let properties = self.inner.properties.borrow();
        if properties.is_empty() {
            if path.is_file() {
                fs::remove_file(&path).map_err(persistence)?;
            }
            return Ok(());
        }

        fs::create_dir_all(&self.inner.dir).map_err(persistence)?;
        let mut tmp = NamedTempFile::new_in(&self.inner.dir).map_err(persistence)?;
        serde_json::to_writer_pretty(&mut tmp, &*properties).map_err(|e| persistence(e.into()))?;
        tmp.flush().map_err(persistence)?;
        tmp.as_file().sync_all().map_err(persistence)?;
        tmp.persist(&path).map_err(|e| persistence(e.error))?;
        Ok(())
    }

    /// Loads properties written by [`write_properties`](Self::write_properties),
    /// if there are any.
    pub(crate) fn read_properties(&self) -> Result<(), PathMirrorError> {
        let path = self.properties_path();
        if !path.is_file() {
            return Ok(());
        }
        let persistence = |source: std::io::Error| PathMirrorError::Persistence {
            path: path.clone(),
            source,
        };
        let bytes = fs::read(&path).map_err(persistence)?;
        let properties: BTreeMap<String, Json> =
            serde_json::from_slice(&bytes).map_err(|e| persistence(e.into()))?;
        *self.inner.properties.borrow_mut() = properties;
        Ok(())
    }

    /// Returns true if the server URI names an existing file.
    ///
    /// # Errors
    /// `InvalidUri` for URIs that are not `file:` URIs.
    pub fn is_readable(&self) -> Result<bool, PathMirrorError> {
        Ok(path_from_uri(&self.server_uri()?)?.is_file())
    }
}

impl PartialEq for ImageEntry {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ImageEntry {}

impl fmt::Debug for ImageEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageEntry")
            .field("id", &self.inner.id)
            .field("name", &self.name().ok())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_in(dir: &Path) -> ImageEntry {
        let taxonomy = Taxonomy::new(&Session::in_memory().unwrap());
        ImageEntry::create(
            &taxonomy,
            EntryId::new(1),
            "file:///data/a.svs",
            "a.svs",
            dir.join("1"),
        )
        .unwrap()
    }

    fn entry() -> ImageEntry {
        entry_in(Path::new("/projects/demo/data"))
    }

    #[test]
    fn test_image_type_names() {
        for t in ImageType::ALL {
            assert_eq!(t.constant().parse::<ImageType>().unwrap(), t);
            assert_eq!(t.to_string().parse::<ImageType>().unwrap(), t);
            assert_eq!(
                serde_json::to_value(t).unwrap(),
                serde_json::json!(t.constant())
            );
        }
        assert_eq!(ImageType::BrightfieldHE.to_string(), "Brightfield (H&E)");
        assert!("Darkfield".parse::<ImageType>().is_err());
    }

    #[test]
    fn test_basic_attributes() {
        let e = entry();
        assert_eq!(e.id(), EntryId::new(1));
        assert_eq!(e.name().unwrap(), "a.svs");
        e.set_name("slide A").unwrap();
        assert_eq!(e.name().unwrap(), "slide A");
        assert_eq!(e.description().unwrap(), None);
        e.set_description(Some("first cut")).unwrap();
        assert_eq!(e.description().unwrap().as_deref(), Some("first cut"));
        assert_eq!(e.image_type().unwrap(), ImageType::Unset);
        e.set_image_type(ImageType::Fluorescence).unwrap();
        assert_eq!(e.image_type().unwrap(), ImageType::Fluorescence);
        assert!(e.set_server_uri("not a uri").is_err());
        assert_eq!(e.server_uri().unwrap(), "file:///data/a.svs");
    }

    #[test]
    fn test_metadata() {
        let e = entry();
        e.set_metadata_value("stain", "HE").unwrap();
        e.set_metadata_value("scanner", "X").unwrap();
        e.set_metadata_value("stain", "DAB").unwrap();
        assert_eq!(
            e.metadata().unwrap(),
            vec![
                ("stain".to_string(), "DAB".to_string()),
                ("scanner".to_string(), "X".to_string())
            ]
        );
        assert!(e.remove_metadata_value("stain").unwrap());
        assert_eq!(e.metadata_value("stain").unwrap(), None);
        e.clear_metadata().unwrap();
        assert!(e.metadata().unwrap().is_empty());
    }

    #[test]
    fn test_calibration() {
        let e = entry();
        assert_eq!(e.calibration().unwrap(), None);
        let calibration = PixelCalibration::microns(0.5, 0.5).unwrap();
        e.set_calibration(Some(&calibration)).unwrap();
        assert_eq!(e.calibration().unwrap(), Some(calibration));
        e.set_calibration(None).unwrap();
        assert_eq!(e.calibration().unwrap(), None);
    }

    #[test]
    fn test_hierarchy_is_shared() {
        let e = entry();
        let copy = e.clone();
        let events = Rc::new(std::cell::Cell::new(0));
        let seen = events.clone();
        e.hierarchy().add_listener(move |_| seen.set(seen.get() + 1));
        copy.hierarchy()
            .add_annotation(&crate::geometry::Roi::empty(), None, crate::hierarchy::Parent::Root)
            .unwrap();
        assert_eq!(events.get(), 1);
    }

    #[test]
    fn test_properties_persist_next_to_the_hierarchy() {
        let dir = tempfile::tempdir().unwrap();
        let e = entry_in(dir.path());
        assert_eq!(e.entry_path(), dir.path().join("1"));
        assert!(e.properties().is_empty());

        e.set_property("stain_vectors", "0.65 0.70 0.29");
        e.set_property("reviewed", true);
        e.set_property("reviewed", false);
        assert_eq!(e.property("reviewed"), Some(Json::Bool(false)));
        e.write_properties().unwrap();
        assert!(e.entry_path().join(PROPERTIES_FILE).is_file());

        let copy = entry_in(dir.path());
        copy.read_properties().unwrap();
        assert_eq!(copy.properties(), e.properties());

        assert_eq!(e.remove_property("missing"), None);
        e.clear_properties();
        e.write_properties().unwrap();
        assert!(!e.entry_path().join(PROPERTIES_FILE).exists());
    }

    #[test]
    fn test_corrupt_properties_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let e = entry_in(dir.path());
        fs::create_dir_all(e.entry_path()).unwrap();
        fs::write(e.entry_path().join(PROPERTIES_FILE), "[1, 2").unwrap();
        let err = e.read_properties().unwrap_err();
        assert!(matches!(err, PathMirrorError::Persistence { .. }));
    }

    #[test]
    fn test_is_readable() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("slide.tif");
        std::fs::write(&image, b"II*\0").unwrap();

        let e = entry();
        assert!(!e.is_readable().unwrap());
        e.set_server_uri(&crate::project::uri_from_path(&image).unwrap())
            .unwrap();
        assert!(e.is_readable().unwrap());
        e.set_server_uri("https://example.org/slide.tif").unwrap();
        assert!(e.is_readable().is_err());
    }
}
