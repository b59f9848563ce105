use std::fmt;

use super::{ObjectCore, ObjectKind, PathObject, PathObjectLike};
use crate::error::PathMirrorError;
use crate::geometry::{to_foreign, Roi};
use crate::taxonomy::Taxonomy;

macro_rules! path_object_variant {
    ($(#[$meta:meta])* $name:ident, $kind:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash)]
        pub struct $name {
            core: ObjectCore,
        }

        impl $name {
            /// Creates a detached object with `roi`.
            pub fn new(taxonomy: &Taxonomy, roi: &Roi) -> Result<Self, PathMirrorError> {
                ObjectCore::create(taxonomy, ObjectKind::$kind.foreign_class(), roi)
                    .map(Self::from_core)
            }

            pub(crate) fn from_core(core: ObjectCore) -> Self {
                Self { core }
            }
        }

        impl PathObjectLike for $name {
            fn core(&self) -> &ObjectCore {
                &self.core
            }

            fn kind(&self) -> ObjectKind {
                ObjectKind::$kind
            }
        }

        impl From<$name> for PathObject {
            fn from(object: $name) -> Self {
                PathObject::$kind(object)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.core.handle())
            }
        }
    };
}

path_object_variant!(
    /// A user-drawn region. Annotations may be locked, carry a free-text
    /// description, and have children.
    Annotation,
    Annotation
);

path_object_variant!(
    /// A detected structure (cell, nucleus, ...). Detections are leaves.
    Detection,
    Detection
);

path_object_variant!(
    /// A detection produced by tiling a region. Tiles are leaves.
    Tile,
    Tile
);

path_object_variant!(
    /// A tissue microarray core.
    TmaCore,
    TmaCore
);

impl Annotation {
    /// Replaces the ROI.
    pub fn set_roi(&self, roi: &Roi) -> Result<(), PathMirrorError> {
        let foreign = to_foreign(self.core.session(), roi.geometry(), roi.plane())?;
        self.core.mutate("setROI", &[foreign.into()])?;
        Ok(())
    }

    pub fn is_locked(&self) -> Result<bool, PathMirrorError> {
        self.core.get("isLocked")?.as_bool("Annotation.isLocked")
    }

    pub fn set_locked(&self, locked: bool) -> Result<(), PathMirrorError> {
        self.core.mutate("setLocked", &[locked.into()])?;
        Ok(())
    }

    pub fn description(&self) -> Result<Option<String>, PathMirrorError> {
        Ok(self
            .core
            .get("getDescription")?
            .as_opt_str("Annotation.getDescription")?
            .map(str::to_string))
    }

    pub fn set_description(&self, description: Option<&str>) -> Result<(), PathMirrorError> {
        self.core.mutate("setDescription", &[description.into()])?;
        Ok(())
    }
}

impl TmaCore {
    /// True if the core is marked as missing from the array.
    pub fn is_missing(&self) -> Result<bool, PathMirrorError> {
        self.core.get("isMissing")?.as_bool("TMACoreObject.isMissing")
    }

    pub fn set_missing(&self, missing: bool) -> Result<(), PathMirrorError> {
        self.core.mutate("setMissing", &[missing.into()])?;
        Ok(())
    }
}
