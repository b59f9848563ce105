//! Native geometry and its mapping to foreign ROIs.
//!
//! All stored geometry is in full-resolution pixel coordinates
//! ([`Pixel`]). Physical units only appear when a [`Roi`] is measured
//! against a [`PixelCalibration`](crate::project::PixelCalibration).

mod bbox;
mod convert;
mod coord;
pub mod geojson;
mod plane;
mod shape;
mod space;

pub use bbox::BBox;
pub use convert::{to_foreign, to_native, Roi, ROUND_TRIP_TOLERANCE};
pub use coord::Coord;
pub use plane::ImagePlane;
pub use shape::{Geometry, PixelCoord, Polygon};
pub use space::{Calibrated, Pixel};
