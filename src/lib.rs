//! Pathmirror: a native object model for QuPath projects.
//!
//! Pathmirror mirrors the project, image and annotation model of QuPath
//! through a runtime bridge. Native types are thin proxies over foreign
//! objects: reading a property asks the foreign runtime, and every mutation
//! is validated natively before it is issued.
//!
//! # Modules
//!
//! - [`bridge`]: the [`Bridge`](bridge::Bridge) trait, [`Session`](bridge::Session)
//!   and an in-process reference runtime
//! - [`geometry`]: planar geometry, ROI conversion and GeoJSON encoding
//! - [`taxonomy`]: classifications with name-path identity
//! - [`objects`]: annotations, detections, tiles and TMA cores
//! - [`hierarchy`]: the per-image object tree
//! - [`project`]: image entries, calibration and the project manifest
//! - [`settings`]: read-only settings for bridge adapters
//! - [`error`]: error types
//!
//! # Example
//!
//! ```
//! use pathmirror::bridge::Session;
//! use pathmirror::geometry::{ImagePlane, Polygon, Roi};
//! use pathmirror::hierarchy::Parent;
//! use pathmirror::objects::PathObjectLike;
//! use pathmirror::project::{ImageOptions, Project};
//!
//! let dir = tempfile::tempdir()?;
//! let session = Session::in_memory()?;
//! let mut project = Project::create(&session, dir.path())?;
//! let entry = project.add_image("file:///data/slide.svs", ImageOptions::new())?;
//!
//! let tumor = project.taxonomy().parse("Tumor")?;
//! let roi = Roi::new(
//!     Polygon::from_bounds(0.0, 0.0, 100.0, 100.0).into(),
//!     ImagePlane::default(),
//! );
//! let annotation = entry.hierarchy().add_annotation(&roi, Some(&tumor), Parent::Root)?;
//! assert_eq!(annotation.path_class()?, Some(tumor));
//!
//! project.save_and_close()?;
//! # Ok::<(), pathmirror::PathMirrorError>(())
//! ```

pub mod bridge;
pub mod error;
pub mod geometry;
pub mod hierarchy;
pub mod objects;
pub mod project;
mod revision;
pub mod settings;
pub mod taxonomy;

pub use error::PathMirrorError;
pub use hierarchy::{Hierarchy, HierarchyEvent, Parent};
pub use objects::{Annotation, Detection, PathObject, PathObjectLike, Tile, TmaCore};
pub use project::{ImageEntry, ImageOptions, PixelCalibration, Project};
pub use taxonomy::{PathClass, Taxonomy};
