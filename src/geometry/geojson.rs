//! GeoJSON encoding of native geometry.
//!
//! Only the `geometry` member of a feature lives here; feature properties
//! (classification, measurements) are handled by the hierarchy, which owns
//! the taxonomy needed to resolve them.

use serde_json::{json, Map, Value as Json};

use super::coord::Coord;
use super::shape::{Geometry, PixelCoord, Polygon};
use crate::error::PathMirrorError;

/// Largest integer exactly representable in an f64 (2^53).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Writes integral values as JSON integers, matching QuPath's output.
fn number(v: f64) -> Json {
    if v.fract() == 0.0 && v.abs() < MAX_SAFE_INTEGER {
        json!(v as i64)
    } else {
        json!(v)
    }
}

fn position(c: &PixelCoord) -> Json {
    Json::Array(vec![number(c.x), number(c.y)])
}

fn positions(cs: &[PixelCoord]) -> Json {
    Json::Array(cs.iter().map(position).collect())
}

fn polygon(p: &Polygon) -> Json {
    Json::Array(p.rings().map(positions).collect())
}

/// Encodes a geometry as a GeoJSON geometry object.
///
/// The empty geometry is written as an empty `GeometryCollection`.
pub fn geometry_to_json(geometry: &Geometry) -> Json {
    match geometry {
        Geometry::Empty => json!({"type": "GeometryCollection", "geometries": []}),
        Geometry::Point(c) => json!({"type": "Point", "coordinates": position(c)}),
        Geometry::MultiPoint(cs) => json!({"type": "MultiPoint", "coordinates": positions(cs)}),
        Geometry::LineString(cs) => json!({"type": "LineString", "coordinates": positions(cs)}),
        Geometry::Polygon(p) => json!({"type": "Polygon", "coordinates": polygon(p)}),
        Geometry::MultiPolygon(ps) => json!({
            "type": "MultiPolygon",
            "coordinates": Json::Array(ps.iter().map(polygon).collect()),
        }),
        Geometry::Collection(items) => json!({
            "type": "GeometryCollection",
            "geometries": Json::Array(items.iter().map(geometry_to_json).collect()),
        }),
    }
}

fn invalid(message: impl Into<String>) -> PathMirrorError {
    PathMirrorError::GeoJson(message.into())
}

fn array<'a>(value: &'a Json, what: &str) -> Result<&'a Vec<Json>, PathMirrorError> {
    value
        .as_array()
        .ok_or_else(|| invalid(format!("{} must be an array", what)))
}

fn read_position(value: &Json) -> Result<PixelCoord, PathMirrorError> {
    let items = array(value, "position")?;
    // a third (z) component is tolerated and ignored
    match items.as_slice() {
        [x, y] | [x, y, _] => {
            let x = x.as_f64().ok_or_else(|| invalid("x is not a number"))?;
            let y = y.as_f64().ok_or_else(|| invalid("y is not a number"))?;
            Ok(Coord::new(x, y))
        }
        _ => Err(invalid(format!(
            "position must have 2 components, found {}",
            items.len()
        ))),
    }
}

fn read_positions(value: &Json) -> Result<Vec<PixelCoord>, PathMirrorError> {
    array(value, "coordinates")?.iter().map(read_position).collect()
}

fn read_polygon(value: &Json) -> Result<Polygon, PathMirrorError> {
    let mut rings = array(value, "polygon coordinates")?
        .iter()
        .map(read_positions)
        .collect::<Result<Vec<_>, _>>()?
        .into_iter();
    let exterior = rings
        .next()
        .ok_or_else(|| invalid("polygon has no exterior ring"))?;
    Ok(Polygon::new(exterior, rings.collect()))
}

/// Decodes a GeoJSON geometry object.
///
/// # Errors
/// `GeoJson` for unknown types, missing members or malformed positions.
pub fn geometry_from_json(value: &Json) -> Result<Geometry, PathMirrorError> {
    let object: &Map<String, Json> = value
        .as_object()
        .ok_or_else(|| invalid("geometry must be an object"))?;
    let kind = object
        .get("type")
        .and_then(Json::as_str)
        .ok_or_else(|| invalid("geometry has no 'type'"))?;

    if kind == "GeometryCollection" {
        let members = object
            .get("geometries")
            .ok_or_else(|| invalid("GeometryCollection has no 'geometries'"))?;
        let items = array(members, "geometries")?
            .iter()
            .map(geometry_from_json)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(if items.is_empty() {
            Geometry::Empty
        } else {
            Geometry::Collection(items)
        });
    }

    let coordinates = object
        .get("coordinates")
        .ok_or_else(|| invalid(format!("{} has no 'coordinates'", kind)))?;
    match kind {
        "Point" => Ok(Geometry::Point(read_position(coordinates)?)),
        "MultiPoint" => Ok(Geometry::MultiPoint(read_positions(coordinates)?)),
        "LineString" => Ok(Geometry::LineString(read_positions(coordinates)?)),
        "Polygon" => Ok(Geometry::Polygon(read_polygon(coordinates)?)),
        "MultiPolygon" => Ok(Geometry::MultiPolygon(
            array(coordinates, "coordinates")?
                .iter()
                .map(read_polygon)
                .collect::<Result<_, _>>()?,
        )),
        other => Err(invalid(format!("unsupported geometry type '{}'", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polygon_layout() {
        let square = Polygon::from_bounds(0.0, 0.0, 10.0, 10.0);
        let value = geometry_to_json(&square.into());
        assert_eq!(
            value,
            json!({
                "type": "Polygon",
                "coordinates": [[[0, 0], [10, 0], [10, 10], [0, 10], [0, 0]]],
            })
        );
    }

    #[test]
    fn test_fractional_coordinates_stay_floats() {
        let value = geometry_to_json(&Geometry::point(1.5, 2.0));
        assert_eq!(value["coordinates"], json!([1.5, 2]));
    }

    #[test]
    fn test_decode_normalizes_orientation() {
        let value = json!({
            "type": "Polygon",
            "coordinates": [[[0, 0], [0, 10], [10, 10], [10, 0], [0, 0]]],
        });
        let geometry = geometry_from_json(&value).unwrap();
        assert_eq!(geometry, Polygon::from_bounds(0.0, 0.0, 10.0, 10.0).into());
    }

    #[test]
    fn test_decode_collections() {
        let empty = json!({"type": "GeometryCollection", "geometries": []});
        assert_eq!(geometry_from_json(&empty).unwrap(), Geometry::Empty);

        let mixed = json!({"type": "GeometryCollection", "geometries": [
            {"type": "Point", "coordinates": [1, 2]},
            {"type": "LineString", "coordinates": [[0, 0], [1, 1]]},
        ]});
        assert!(matches!(
            geometry_from_json(&mixed).unwrap(),
            Geometry::Collection(items) if items.len() == 2
        ));
    }

    #[test]
    fn test_decode_errors() {
        for bad in [
            json!([1, 2]),
            json!({"coordinates": [1, 2]}),
            json!({"type": "Point"}),
            json!({"type": "Point", "coordinates": [1]}),
            json!({"type": "Point", "coordinates": ["a", 1]}),
            json!({"type": "MultiLineString", "coordinates": []}),
            json!({"type": "Polygon", "coordinates": []}),
        ] {
            let err = geometry_from_json(&bad).unwrap_err();
            assert!(matches!(err, PathMirrorError::GeoJson(_)), "{}", bad);
        }
    }
}
