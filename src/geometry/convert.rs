//! Translation between native geometry and foreign ROI objects.
//!
//! | Native                          | Foreign                          |
//! |---------------------------------|----------------------------------|
//! | `Point`, `MultiPoint` (2+)      | `PointsROI`                      |
//! | `MultiPoint` (1)                | `GeometryROI` kind `MultiPoint`  |
//! | `LineString` (2)                | `LineROI`                        |
//! | `LineString` (3+)               | `PolylineROI`                    |
//! | `Polygon` without holes         | `PolygonROI`                     |
//! | `Polygon` with holes            | `GeometryROI` kind `Polygon`     |
//! | `MultiPolygon`                  | `GeometryROI` kind `MultiPolygon`|
//! | empty or degenerate             | zero-size `RectangleROI`         |
//!
//! Foreign rings are open and their exterior runs clockwise; native rings
//! are closed with a counter-clockwise exterior. Rings are reversed and
//! closed/opened in both directions.

use tracing::warn;

use super::coord::Coord;
use super::plane::ImagePlane;
use super::shape::{Geometry, PixelCoord, Polygon};
use crate::bridge::{classes, ForeignRef, Session, Value};
use crate::error::PathMirrorError;
use crate::project::PixelCalibration;

/// Absolute coordinate tolerance of a foreign round trip.
pub const ROUND_TRIP_TOLERANCE: f64 = 1e-9;

/// A region of interest: a geometry on one image plane, in pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct Roi {
    geometry: Geometry,
    plane: ImagePlane,
}

impl Roi {
    pub fn new(geometry: Geometry, plane: ImagePlane) -> Self {
        Self { geometry, plane }
    }

    /// The empty ROI on the default plane.
    pub fn empty() -> Self {
        Self::new(Geometry::Empty, ImagePlane::default())
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn plane(&self) -> ImagePlane {
        self.plane
    }

    pub fn into_geometry(self) -> Geometry {
        self.geometry
    }

    pub fn is_empty(&self) -> bool {
        self.geometry.is_empty()
    }

    /// Area in squared calibration units. Stored coordinates are unchanged.
    pub fn area_calibrated(&self, calibration: &PixelCalibration) -> f64 {
        self.geometry.area() * calibration.pixel_width() * calibration.pixel_height()
    }

    /// Length (or perimeter) in calibration units.
    ///
    /// Each segment is scaled before measuring, so anisotropic pixels are
    /// handled correctly.
    pub fn length_calibrated(&self, calibration: &PixelCalibration) -> f64 {
        self.geometry
            .paths()
            .into_iter()
            .flat_map(|path| path.windows(2))
            .map(|w| {
                calibration
                    .to_calibrated(&w[0])
                    .distance(&calibration.to_calibrated(&w[1]))
            })
            .sum()
    }
}

fn floats(values: impl Iterator<Item = f64>) -> Value {
    Value::List(values.map(Value::Float).collect())
}

fn position(c: &PixelCoord) -> Value {
    Value::List(vec![Value::Float(c.x), Value::Float(c.y)])
}

/// Native closed ring to a foreign open ring with reversed orientation.
fn ring_to_foreign(ring: &[PixelCoord]) -> Value {
    let open = &ring[..ring.len().saturating_sub(1)];
    Value::List(open.iter().rev().map(position).collect())
}

fn polygon_to_foreign(polygon: &Polygon) -> Value {
    Value::List(polygon.rings().map(ring_to_foreign).collect())
}

fn plane_args(plane: ImagePlane) -> [Value; 2] {
    [Value::Int(plane.z.into()), Value::Int(plane.t.into())]
}

fn construct_geometry_roi(
    session: &Session,
    kind: &str,
    coordinates: Value,
    plane: ImagePlane,
) -> Result<ForeignRef, PathMirrorError> {
    let [z, t] = plane_args(plane);
    session.construct(classes::GEOMETRY_ROI, &[kind.into(), coordinates, z, t])
}

fn construct_xy(
    session: &Session,
    class: &str,
    coords: &[PixelCoord],
    plane: ImagePlane,
) -> Result<ForeignRef, PathMirrorError> {
    let [z, t] = plane_args(plane);
    let xs = floats(coords.iter().map(|c| c.x));
    let ys = floats(coords.iter().map(|c| c.y));
    session.construct(class, &[xs, ys, z, t])
}

fn construct_empty(session: &Session, plane: ImagePlane) -> Result<ForeignRef, PathMirrorError> {
    let [z, t] = plane_args(plane);
    session.construct(
        classes::RECTANGLE_ROI,
        &[0.0.into(), 0.0.into(), 0.0.into(), 0.0.into(), z, t],
    )
}

/// Creates a foreign ROI for `geometry` on `plane`.
///
/// # Errors
/// `GeometryConversion` for non-finite coordinates and for collections
/// that mix incompatible kinds. Degenerate input yields the empty ROI.
pub fn to_foreign(
    session: &Session,
    geometry: &Geometry,
    plane: ImagePlane,
) -> Result<ForeignRef, PathMirrorError> {
    if !geometry.is_finite() {
        return Err(PathMirrorError::geometry(format!(
            "{} has non-finite coordinates",
            geometry.type_name()
        )));
    }
    if geometry.is_degenerate() {
        return construct_empty(session, plane);
    }

    match geometry {
        Geometry::Empty => construct_empty(session, plane),
        Geometry::Point(c) => construct_xy(session, classes::POINTS_ROI, &[*c], plane),
        Geometry::MultiPoint(cs) if cs.len() == 1 => construct_geometry_roi(
            session,
            "MultiPoint",
            Value::List(cs.iter().map(position).collect()),
            plane,
        ),
        Geometry::MultiPoint(cs) => construct_xy(session, classes::POINTS_ROI, cs, plane),
        Geometry::LineString(cs) if cs.len() == 2 => {
            let [z, t] = plane_args(plane);
            session.construct(
                classes::LINE_ROI,
                &[
                    cs[0].x.into(),
                    cs[0].y.into(),
                    cs[1].x.into(),
                    cs[1].y.into(),
                    z,
                    t,
                ],
            )
        }
        Geometry::LineString(cs) => construct_xy(session, classes::POLYLINE_ROI, cs, plane),
        Geometry::Polygon(p) if p.holes().is_empty() => {
            let ring = &p.exterior()[..p.exterior().len() - 1];
            let reversed: Vec<PixelCoord> = ring.iter().rev().copied().collect();
            construct_xy(session, classes::POLYGON_ROI, &reversed, plane)
        }
        Geometry::Polygon(p) => {
            construct_geometry_roi(session, "Polygon", polygon_to_foreign(p), plane)
        }
        Geometry::MultiPolygon(ps) => construct_geometry_roi(
            session,
            "MultiPolygon",
            Value::List(ps.iter().map(polygon_to_foreign).collect()),
            plane,
        ),
        Geometry::Collection(_) => to_foreign(session, &geometry.flatten()?, plane),
    }
}

fn get(session: &Session, roi: ForeignRef, method: &str) -> Result<Value, PathMirrorError> {
    session.call(roi, method, &[])
}

fn get_f64(session: &Session, roi: ForeignRef, method: &str) -> Result<f64, PathMirrorError> {
    get(session, roi, method)?.as_f64(method)
}

fn read_plane(session: &Session, roi: ForeignRef) -> Result<ImagePlane, PathMirrorError> {
    let read = |method: &str| -> Result<i32, PathMirrorError> {
        let value = get(session, roi, method)?;
        if value.is_null() {
            return Ok(0);
        }
        let raw = value.as_i64(method)?;
        i32::try_from(raw).map_err(|_| PathMirrorError::UnexpectedValue {
            context: method.to_string(),
            expected: "32-bit plane index",
            found: raw.to_string(),
        })
    };
    Ok(ImagePlane::new(read("getZ")?, read("getT")?))
}

fn read_xy(session: &Session, roi: ForeignRef) -> Result<Vec<PixelCoord>, PathMirrorError> {
    let xs = get(session, roi, "getX")?;
    let ys = get(session, roi, "getY")?;
    let xs = xs.as_list("getX")?;
    let ys = ys.as_list("getY")?;
    if xs.len() != ys.len() {
        return Err(PathMirrorError::geometry(format!(
            "ROI {} has {} x values but {} y values",
            roi,
            xs.len(),
            ys.len()
        )));
    }
    xs.iter()
        .zip(ys)
        .map(|(x, y)| Ok(Coord::new(x.as_f64("getX")?, y.as_f64("getY")?)))
        .collect()
}

fn value_to_position(value: &Value) -> Result<PixelCoord, PathMirrorError> {
    match value.as_list("coordinates")? {
        [x, y] => Ok(Coord::new(x.as_f64("coordinates")?, y.as_f64("coordinates")?)),
        other => Err(PathMirrorError::geometry(format!(
            "position with {} components",
            other.len()
        ))),
    }
}

fn value_to_ring(value: &Value) -> Result<Vec<PixelCoord>, PathMirrorError> {
    let mut ring = value
        .as_list("coordinates")?
        .iter()
        .map(value_to_position)
        .collect::<Result<Vec<_>, _>>()?;
    ring.reverse();
    Ok(ring)
}

fn value_to_polygon(value: &Value) -> Result<Polygon, PathMirrorError> {
    let mut rings = value
        .as_list("coordinates")?
        .iter()
        .map(value_to_ring)
        .collect::<Result<Vec<_>, _>>()?
        .into_iter();
    let exterior = rings
        .next()
        .ok_or_else(|| PathMirrorError::geometry("polygon without exterior ring"))?;
    Ok(Polygon::new(exterior, rings.collect()))
}

/// Reads a foreign ROI into a native [`Roi`].
///
/// # Errors
/// `GeometryConversion` if the foreign object is not a known ROI kind or
/// carries malformed coordinates.
pub fn to_native(session: &Session, roi: ForeignRef) -> Result<Roi, PathMirrorError> {
    let plane = read_plane(session, roi)?;

    let geometry = if session.is_instance(roi, classes::POINTS_ROI)? {
        let mut coords = read_xy(session, roi)?;
        match coords.len() {
            0 => Geometry::Empty,
            1 => Geometry::Point(coords.remove(0)),
            _ => Geometry::MultiPoint(coords),
        }
    } else if session.is_instance(roi, classes::LINE_ROI)? {
        Geometry::LineString(vec![
            Coord::new(get_f64(session, roi, "getX1")?, get_f64(session, roi, "getY1")?),
            Coord::new(get_f64(session, roi, "getX2")?, get_f64(session, roi, "getY2")?),
        ])
    } else if session.is_instance(roi, classes::POLYLINE_ROI)? {
        Geometry::LineString(read_xy(session, roi)?)
    } else if session.is_instance(roi, classes::POLYGON_ROI)? {
        let mut ring = read_xy(session, roi)?;
        ring.reverse();
        Geometry::Polygon(Polygon::new(ring, Vec::new()))
    } else if session.is_instance(roi, classes::RECTANGLE_ROI)? {
        let x = get_f64(session, roi, "getX")?;
        let y = get_f64(session, roi, "getY")?;
        let width = get_f64(session, roi, "getWidth")?;
        let height = get_f64(session, roi, "getHeight")?;
        if width <= 0.0 || height <= 0.0 {
            Geometry::Empty
        } else {
            Geometry::Polygon(Polygon::from_bounds(x, y, x + width, y + height))
        }
    } else if session.is_instance(roi, classes::GEOMETRY_ROI)? {
        let kind = get(session, roi, "getKind")?;
        let coordinates = get(session, roi, "getCoordinates")?;
        match kind.as_str("getKind")? {
            "MultiPoint" => Geometry::MultiPoint(
                coordinates
                    .as_list("coordinates")?
                    .iter()
                    .map(value_to_position)
                    .collect::<Result<_, _>>()?,
            ),
            "Polygon" => Geometry::Polygon(value_to_polygon(&coordinates)?),
            "MultiPolygon" => Geometry::MultiPolygon(
                coordinates
                    .as_list("coordinates")?
                    .iter()
                    .map(value_to_polygon)
                    .collect::<Result<_, _>>()?,
            ),
            other => {
                return Err(PathMirrorError::geometry(format!(
                    "unsupported GeometryROI kind '{}'",
                    other
                )))
            }
        }
    } else {
        warn!(roi = %roi, "foreign object is not a known ROI class");
        return Err(PathMirrorError::geometry(format!(
            "{} is not a supported ROI",
            roi
        )));
    };

    Ok(Roi::new(geometry, plane))
}
