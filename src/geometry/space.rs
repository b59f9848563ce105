//! The two coordinate spaces geometry can live in.
//!
//! [`Coord`](super::Coord) and [`BBox`](super::BBox) take one of these as a
//! type parameter. Everything a hierarchy stores, imports or exports is in
//! [`Pixel`] space. [`Calibrated`] values only come out of
//! [`PixelCalibration::to_calibrated`](crate::project::PixelCalibration::to_calibrated),
//! so a physical measurement cannot be handed back to the runtime as if it
//! were a ROI.
//!
//! Neither marker has values; they exist only in types.

/// Level-0 pixel space of one image.
///
/// The origin is the top-left corner of the full-resolution image. x grows
/// to the right and y grows downwards. Coordinates are fractional, so the
/// centre of the pixel in column `i`, row `j` is `(i + 0.5, j + 0.5)`.
/// z-slice and timepoint are not part of the coordinate; they are carried
/// by the ROI's [`ImagePlane`](super::ImagePlane).
///
/// Downsampled pyramid levels are never used for stored geometry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pixel {}

/// Pixel space scaled by a calibration's pixel width and height.
///
/// Origin and axis directions are those of [`Pixel`]; only the scale
/// differs, and it may differ per axis. The unit (usually `µm`) belongs to
/// the calibration and is not tracked by the type. An image without a
/// calibration has no calibrated space: its measurements stay in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Calibrated {}
