//! Path objects: annotations, detections, tiles and TMA cores.
//!
//! Each variant is a thin proxy over a foreign object; nothing is cached
//! natively, so every getter reflects the foreign state at the time of the
//! call. The common surface is [`PathObjectLike`]; variant-specific
//! accessors live on the variant types.

mod proxy;
mod variants;

pub use variants::{Annotation, Detection, Tile, TmaCore};

use std::fmt;

use tracing::warn;

use crate::bridge::{classes, ForeignRef, Value};
use crate::error::PathMirrorError;
use crate::geometry::{to_native, Roi};
use crate::taxonomy::{PathClass, Taxonomy};

pub(crate) use self::proxy::ObjectCore;

/// The closed set of path object variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Annotation,
    Detection,
    Tile,
    TmaCore,
}

impl ObjectKind {
    /// Detections and tiles may not have children.
    pub fn is_leaf(self) -> bool {
        matches!(self, ObjectKind::Detection | ObjectKind::Tile)
    }

    pub(crate) fn foreign_class(self) -> &'static str {
        match self {
            ObjectKind::Annotation => classes::ANNOTATION,
            ObjectKind::Detection => classes::DETECTION,
            ObjectKind::Tile => classes::TILE,
            ObjectKind::TmaCore => classes::TMA_CORE,
        }
    }

    /// Feature `id` used by QuPath's GeoJSON export.
    pub fn geojson_id(self) -> &'static str {
        match self {
            ObjectKind::Annotation => "PathAnnotationObject",
            ObjectKind::Detection => "PathDetectionObject",
            ObjectKind::Tile => "PathTileObject",
            ObjectKind::TmaCore => "TMACoreObject",
        }
    }

    pub fn from_geojson_id(id: &str) -> Option<Self> {
        [
            ObjectKind::Annotation,
            ObjectKind::Detection,
            ObjectKind::Tile,
            ObjectKind::TmaCore,
        ]
        .into_iter()
        .find(|kind| kind.geojson_id() == id)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectKind::Annotation => "annotation",
            ObjectKind::Detection => "detection",
            ObjectKind::Tile => "tile",
            ObjectKind::TmaCore => "TMA core",
        };
        f.write_str(name)
    }
}

/// Where an object is in its life.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// Constructed but not in any hierarchy.
    Detached,
    /// In a hierarchy, with a parent.
    Attached,
    /// Excised from its hierarchy. Terminal.
    Removed,
}

/// Operations shared by every path object variant.
pub trait PathObjectLike {
    #[doc(hidden)]
    fn core(&self) -> &ObjectCore;

    fn kind(&self) -> ObjectKind;

    /// The object's ROI, read from the foreign object.
    fn roi(&self) -> Result<Roi, PathMirrorError> {
        let core = self.core();
        match core.get("getROI")?.as_opt_ref("PathObject.getROI")? {
            Some(roi) => to_native(core.session(), roi),
            None => Ok(Roi::empty()),
        }
    }

    fn name(&self) -> Result<Option<String>, PathMirrorError> {
        Ok(self
            .core()
            .get("getName")?
            .as_opt_str("PathObject.getName")?
            .map(str::to_string))
    }

    fn set_name(&self, name: Option<&str>) -> Result<(), PathMirrorError> {
        self.core().mutate("setName", &[name.into()])?;
        Ok(())
    }

    /// The classification, or `None`.
    ///
    /// A reference to a class that has since been removed from the
    /// taxonomy is dropped here (with a warning) and `None` is returned.
    fn path_class(&self) -> Result<Option<PathClass>, PathMirrorError> {
        let core = self.core();
        let Some(handle) = core
            .get("getPathClass")?
            .as_opt_ref("PathObject.getPathClass")?
        else {
            return Ok(None);
        };

        let taxonomy = core.taxonomy();
        if let Some(path) = taxonomy.tombstoned(handle) {
            warn!(
                object = %core.handle(),
                class = %path,
                "dropping reference to removed classification"
            );
            core.mutate("setPathClass", &[Value::Null])?;
            return Ok(None);
        }

        let class = taxonomy.resolve(handle)?;
        if class.handle() != handle {
            core.session()
                .call(core.handle(), "setPathClass", &[class.handle().into()])?;
        }
        Ok(Some(class))
    }

    /// Sets or clears the classification.
    ///
    /// # Errors
    /// `InvalidClassName` if `class` is not a live class of this object's
    /// taxonomy.
    fn set_path_class(&self, class: Option<&PathClass>) -> Result<(), PathMirrorError> {
        let core = self.core();
        if let Some(class) = class {
            if !core.taxonomy().contains(class) {
                return Err(PathMirrorError::InvalidClassName {
                    name: class.to_string(),
                    reason: "class is not part of this taxonomy".to_string(),
                });
            }
        }
        core.mutate("setPathClass", &[class.map(PathClass::handle).into()])?;
        Ok(())
    }

    fn measurement(&self, name: &str) -> Result<Option<f64>, PathMirrorError> {
        let value = self
            .core()
            .session()
            .call(self.core().handle(), "getMeasurement", &[name.into()])?;
        if value.is_null() {
            Ok(None)
        } else {
            value.as_f64("PathObject.getMeasurement").map(Some)
        }
    }

    /// All measurements in insertion order.
    fn measurements(&self) -> Result<Vec<(String, f64)>, PathMirrorError> {
        let names = self.core().get("getMeasurementNames")?;
        let mut out = Vec::new();
        for name in names.as_list("PathObject.getMeasurementNames")? {
            let name = name.as_str("PathObject.getMeasurementNames")?;
            if let Some(value) = self.measurement(name)? {
                out.push((name.to_string(), value));
            }
        }
        Ok(out)
    }

    /// Adds or replaces a measurement.
    fn set_measurement(&self, name: &str, value: f64) -> Result<(), PathMirrorError> {
        self.core()
            .mutate("putMeasurement", &[name.into(), value.into()])?;
        Ok(())
    }

    fn remove_measurement(&self, name: &str) -> Result<bool, PathMirrorError> {
        self.core()
            .mutate("removeMeasurement", &[name.into()])?
            .as_bool("PathObject.removeMeasurement")
    }

    fn lifecycle(&self) -> Result<Lifecycle, PathMirrorError> {
        let core = self.core();
        if core.session().is_retired(core.handle()) {
            return Ok(Lifecycle::Removed);
        }
        let parent = core.get("getParent")?.as_opt_ref("PathObject.getParent")?;
        Ok(if parent.is_some() {
            Lifecycle::Attached
        } else {
            Lifecycle::Detached
        })
    }
}

/// Any path object.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PathObject {
    Annotation(Annotation),
    Detection(Detection),
    Tile(Tile),
    TmaCore(TmaCore),
}

impl PathObject {
    /// Wraps an existing foreign object in the matching variant.
    pub(crate) fn from_foreign(
        taxonomy: &Taxonomy,
        handle: ForeignRef,
    ) -> Result<Self, PathMirrorError> {
        let session = taxonomy.session();
        let core = ObjectCore::new(taxonomy, handle);
        // Tile before Detection: a tile is a detection.
        if session.is_instance(handle, classes::TILE)? {
            Ok(PathObject::Tile(Tile::from_core(core)))
        } else if session.is_instance(handle, classes::DETECTION)? {
            Ok(PathObject::Detection(Detection::from_core(core)))
        } else if session.is_instance(handle, classes::ANNOTATION)? {
            Ok(PathObject::Annotation(Annotation::from_core(core)))
        } else if session.is_instance(handle, classes::TMA_CORE)? {
            Ok(PathObject::TmaCore(TmaCore::from_core(core)))
        } else {
            Err(PathMirrorError::UnexpectedValue {
                context: format!("object {}", handle),
                expected: "path object",
                found: "unknown class".to_string(),
            })
        }
    }

    /// Copies any variant handle into the enum.
    pub(crate) fn from_like(object: &dyn PathObjectLike) -> Self {
        let core = object.core().clone();
        match object.kind() {
            ObjectKind::Annotation => PathObject::Annotation(Annotation::from_core(core)),
            ObjectKind::Detection => PathObject::Detection(Detection::from_core(core)),
            ObjectKind::Tile => PathObject::Tile(Tile::from_core(core)),
            ObjectKind::TmaCore => PathObject::TmaCore(TmaCore::from_core(core)),
        }
    }

    pub(crate) fn handle(&self) -> ForeignRef {
        self.core().handle()
    }

    pub fn as_annotation(&self) -> Option<&Annotation> {
        match self {
            PathObject::Annotation(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_detection(&self) -> Option<&Detection> {
        match self {
            PathObject::Detection(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_tile(&self) -> Option<&Tile> {
        match self {
            PathObject::Tile(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_tma_core(&self) -> Option<&TmaCore> {
        match self {
            PathObject::TmaCore(c) => Some(c),
            _ => None,
        }
    }
}

impl PathObjectLike for PathObject {
    fn core(&self) -> &ObjectCore {
        match self {
            PathObject::Annotation(o) => o.core(),
            PathObject::Detection(o) => o.core(),
            PathObject::Tile(o) => o.core(),
            PathObject::TmaCore(o) => o.core(),
        }
    }

    fn kind(&self) -> ObjectKind {
        match self {
            PathObject::Annotation(_) => ObjectKind::Annotation,
            PathObject::Detection(_) => ObjectKind::Detection,
            PathObject::Tile(_) => ObjectKind::Tile,
            PathObject::TmaCore(_) => ObjectKind::TmaCore,
        }
    }
}
