//! Native planar geometry in full-resolution pixel space.
//!
//! Polygons are normalized on construction: every ring is closed (first
//! coordinate repeated at the end), the exterior ring has positive signed
//! area and holes have negative signed area. Normalizing here is what lets
//! the ROI converter promise an exact round trip.

use super::bbox::BBox;
use super::coord::Coord;
use super::space::Pixel;
use crate::error::PathMirrorError;

/// A coordinate in full-resolution pixel space.
pub type PixelCoord = Coord<Pixel>;

/// A polygon with an exterior ring and zero or more holes.
#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
    exterior: Vec<PixelCoord>,
    holes: Vec<Vec<PixelCoord>>,
}

/// Shoelace signed area of a closed ring.
fn signed_area(ring: &[PixelCoord]) -> f64 {
    ring.windows(2)
        .map(|w| w[0].x * w[1].y - w[1].x * w[0].y)
        .sum::<f64>()
        / 2.0
}

fn close_ring(mut ring: Vec<PixelCoord>) -> Vec<PixelCoord> {
    if let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied()) {
        if first != last {
            ring.push(first);
        }
    }
    ring
}

/// Closes the ring and reverses it if its orientation disagrees with `positive`.
fn orient_ring(ring: Vec<PixelCoord>, positive: bool) -> Vec<PixelCoord> {
    let mut ring = close_ring(ring);
    let area = signed_area(&ring);
    if (positive && area < 0.0) || (!positive && area > 0.0) {
        ring.reverse();
    }
    ring
}

fn path_length(coords: &[PixelCoord]) -> f64 {
    coords.windows(2).map(|w| w[0].distance(&w[1])).sum()
}

impl Polygon {
    /// Builds a normalized polygon. Rings may be given open or closed and in
    /// either orientation.
    pub fn new(exterior: Vec<PixelCoord>, holes: Vec<Vec<PixelCoord>>) -> Self {
        Self {
            exterior: orient_ring(exterior, true),
            holes: holes.into_iter().map(|h| orient_ring(h, false)).collect(),
        }
    }

    /// Convenience constructor from `(x, y)` tuples, without holes.
    pub fn from_xy(points: &[(f64, f64)]) -> Self {
        Self::new(points.iter().map(|&p| p.into()).collect(), Vec::new())
    }

    /// Axis-aligned rectangle.
    pub fn from_bounds(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self::from_xy(&[(xmin, ymin), (xmax, ymin), (xmax, ymax), (xmin, ymax)])
    }

    /// Closed exterior ring.
    pub fn exterior(&self) -> &[PixelCoord] {
        &self.exterior
    }

    /// Closed hole rings.
    pub fn holes(&self) -> &[Vec<PixelCoord>] {
        &self.holes
    }

    /// Exterior followed by holes.
    pub fn rings(&self) -> impl Iterator<Item = &[PixelCoord]> {
        std::iter::once(self.exterior.as_slice()).chain(self.holes.iter().map(Vec::as_slice))
    }

    /// Enclosed area with holes subtracted.
    pub fn area(&self) -> f64 {
        let holes: f64 = self.holes.iter().map(|h| signed_area(h).abs()).sum();
        (signed_area(&self.exterior).abs() - holes).max(0.0)
    }

    /// Total length of all rings.
    pub fn perimeter(&self) -> f64 {
        self.rings().map(path_length).sum()
    }

    /// Returns true if `c` is inside the polygon or on its boundary.
    pub fn contains_coord(&self, c: &PixelCoord) -> bool {
        if self.rings().any(|ring| ring_boundary_contains(ring, c)) {
            return true;
        }
        ring_contains(&self.exterior, c) && !self.holes.iter().any(|h| ring_contains(h, c))
    }

    fn edges(&self) -> impl Iterator<Item = (&PixelCoord, &PixelCoord)> {
        self.rings().flat_map(|r| r.windows(2).map(|w| (&w[0], &w[1])))
    }

    fn translate(&self, dx: f64, dy: f64) -> Self {
        let shift = |ring: &Vec<PixelCoord>| ring.iter().map(|c| c.translate(dx, dy)).collect();
        Self {
            exterior: shift(&self.exterior),
            holes: self.holes.iter().map(shift).collect(),
        }
    }

    fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        self.holes.len() == other.holes.len()
            && self
                .rings()
                .zip(other.rings())
                .all(|(a, b)| coords_approx_eq(a, b, tolerance))
    }
}

/// A geometry value in pixel space.
#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    Empty,
    Point(PixelCoord),
    MultiPoint(Vec<PixelCoord>),
    LineString(Vec<PixelCoord>),
    Polygon(Polygon),
    MultiPolygon(Vec<Polygon>),
    Collection(Vec<Geometry>),
}

impl From<Polygon> for Geometry {
    fn from(p: Polygon) -> Self {
        Geometry::Polygon(p)
    }
}

impl From<PixelCoord> for Geometry {
    fn from(c: PixelCoord) -> Self {
        Geometry::Point(c)
    }
}

fn coords_approx_eq(a: &[PixelCoord], b: &[PixelCoord], tolerance: f64) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(p, q)| p.approx_eq(q, tolerance))
}

impl Geometry {
    pub fn point(x: f64, y: f64) -> Self {
        Geometry::Point(Coord::new(x, y))
    }

    pub fn line(points: &[(f64, f64)]) -> Self {
        Geometry::LineString(points.iter().map(|&p| p.into()).collect())
    }

    /// The GeoJSON type name of this geometry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Empty => "Empty",
            Geometry::Point(_) => "Point",
            Geometry::MultiPoint(_) => "MultiPoint",
            Geometry::LineString(_) => "LineString",
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiPolygon(_) => "MultiPolygon",
            Geometry::Collection(_) => "GeometryCollection",
        }
    }

    /// Every coordinate of the geometry, rings included with their closing point.
    pub fn coords(&self) -> Vec<PixelCoord> {
        let mut out = Vec::new();
        self.collect_coords(&mut out);
        out
    }

    fn collect_coords(&self, out: &mut Vec<PixelCoord>) {
        match self {
            Geometry::Empty => {}
            Geometry::Point(c) => out.push(*c),
            Geometry::MultiPoint(cs) | Geometry::LineString(cs) => out.extend_from_slice(cs),
            Geometry::Polygon(p) => p.rings().for_each(|r| out.extend_from_slice(r)),
            Geometry::MultiPolygon(ps) => ps
                .iter()
                .flat_map(Polygon::rings)
                .for_each(|r| out.extend_from_slice(r)),
            Geometry::Collection(items) => items.iter().for_each(|g| g.collect_coords(out)),
        }
    }

    /// True if the geometry holds no coordinates at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Geometry::Empty => true,
            Geometry::Point(_) => false,
            Geometry::MultiPoint(cs) | Geometry::LineString(cs) => cs.is_empty(),
            Geometry::Polygon(p) => p.exterior.is_empty(),
            Geometry::MultiPolygon(ps) => ps.iter().all(|p| p.exterior.is_empty()),
            Geometry::Collection(items) => items.iter().all(Geometry::is_empty),
        }
    }

    /// True for empty geometries, lines with fewer than two points and
    /// polygonal geometries without area.
    pub fn is_degenerate(&self) -> bool {
        match self {
            Geometry::LineString(cs) => cs.len() < 2,
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) => self.area() == 0.0,
            Geometry::Collection(items) => items.iter().all(Geometry::is_degenerate),
            other => other.is_empty(),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.coords().iter().all(Coord::is_finite)
    }

    pub fn bounds(&self) -> Option<BBox<Pixel>> {
        BBox::from_coords(&self.coords())
    }

    /// Enclosed area in square pixels; zero for points and lines.
    pub fn area(&self) -> f64 {
        match self {
            Geometry::Polygon(p) => p.area(),
            Geometry::MultiPolygon(ps) => ps.iter().map(Polygon::area).sum(),
            Geometry::Collection(items) => items.iter().map(Geometry::area).sum(),
            _ => 0.0,
        }
    }

    /// Line length, or perimeter for polygonal geometries, in pixels.
    pub fn length(&self) -> f64 {
        match self {
            Geometry::LineString(cs) => path_length(cs),
            Geometry::Polygon(p) => p.perimeter(),
            Geometry::MultiPolygon(ps) => ps.iter().map(Polygon::perimeter).sum(),
            Geometry::Collection(items) => items.iter().map(Geometry::length).sum(),
            _ => 0.0,
        }
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Geometry {
        let shift = |cs: &[PixelCoord]| cs.iter().map(|c| c.translate(dx, dy)).collect();
        match self {
            Geometry::Empty => Geometry::Empty,
            Geometry::Point(c) => Geometry::Point(c.translate(dx, dy)),
            Geometry::MultiPoint(cs) => Geometry::MultiPoint(shift(cs)),
            Geometry::LineString(cs) => Geometry::LineString(shift(cs)),
            Geometry::Polygon(p) => Geometry::Polygon(p.translate(dx, dy)),
            Geometry::MultiPolygon(ps) => {
                Geometry::MultiPolygon(ps.iter().map(|p| p.translate(dx, dy)).collect())
            }
            Geometry::Collection(items) => {
                Geometry::Collection(items.iter().map(|g| g.translate(dx, dy)).collect())
            }
        }
    }

    /// Structural equality with an absolute coordinate tolerance.
    pub fn approx_eq(&self, other: &Geometry, tolerance: f64) -> bool {
        match (self, other) {
            (Geometry::Empty, Geometry::Empty) => true,
            (Geometry::Point(a), Geometry::Point(b)) => a.approx_eq(b, tolerance),
            (Geometry::MultiPoint(a), Geometry::MultiPoint(b))
            | (Geometry::LineString(a), Geometry::LineString(b)) => {
                coords_approx_eq(a, b, tolerance)
            }
            (Geometry::Polygon(a), Geometry::Polygon(b)) => a.approx_eq(b, tolerance),
            (Geometry::MultiPolygon(a), Geometry::MultiPolygon(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(p, q)| p.approx_eq(q, tolerance))
            }
            (Geometry::Collection(a), Geometry::Collection(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(p, q)| p.approx_eq(q, tolerance))
            }
            _ => false,
        }
    }

    /// Resolves a collection into the single homogeneous kind it holds.
    ///
    /// Points and multi-points merge into a multi-point, polygons and
    /// multi-polygons into a multi-polygon, and a lone line-string stays a
    /// line-string. Anything else has no single-geometry equivalent.
    pub fn flatten(&self) -> Result<Geometry, PathMirrorError> {
        let Geometry::Collection(items) = self else {
            return Ok(self.clone());
        };

        let mut points = Vec::new();
        let mut polygons = Vec::new();
        let mut lines = Vec::new();
        for item in items {
            match item.flatten()? {
                Geometry::Empty => {}
                Geometry::Point(c) => points.push(c),
                Geometry::MultiPoint(cs) => points.extend(cs),
                Geometry::Polygon(p) => polygons.push(p),
                Geometry::MultiPolygon(ps) => polygons.extend(ps),
                Geometry::LineString(cs) => lines.push(cs),
                Geometry::Collection(_) => unreachable!("flatten never returns a collection"),
            }
        }

        let kinds = [!points.is_empty(), !polygons.is_empty(), !lines.is_empty()]
            .iter()
            .filter(|k| **k)
            .count();
        if kinds > 1 {
            return Err(PathMirrorError::geometry(
                "geometry collection mixes incompatible geometry types",
            ));
        }
        if lines.len() > 1 {
            return Err(PathMirrorError::geometry(
                "multiple line-strings have no ROI equivalent",
            ));
        }

        Ok(if !points.is_empty() {
            Geometry::MultiPoint(points)
        } else if !polygons.is_empty() {
            Geometry::MultiPolygon(polygons)
        } else if let Some(line) = lines.pop() {
            Geometry::LineString(line)
        } else {
            Geometry::Empty
        })
    }

    /// Returns true if the geometries share at least one point.
    ///
    /// Both geometries must be in the same (pixel) space; no calibration is
    /// involved.
    pub fn intersects(&self, other: &Geometry) -> bool {
        match (self.bounds(), other.bounds()) {
            (Some(a), Some(b)) if a.intersects(&b) => {}
            _ => return false,
        }
        let mine = self.parts();
        let theirs = other.parts();
        mine.iter()
            .any(|a| theirs.iter().any(|b| parts_intersect(a, b)))
    }

    /// Every open path (line-strings) and closed ring (polygons) of the geometry.
    pub(crate) fn paths(&self) -> Vec<&[PixelCoord]> {
        match self {
            Geometry::LineString(cs) => vec![cs.as_slice()],
            Geometry::Polygon(p) => p.rings().collect(),
            Geometry::MultiPolygon(ps) => ps.iter().flat_map(Polygon::rings).collect(),
            Geometry::Collection(items) => items.iter().flat_map(Geometry::paths).collect(),
            _ => Vec::new(),
        }
    }

    fn parts(&self) -> Vec<Part<'_>> {
        let mut out = Vec::new();
        self.collect_parts(&mut out);
        out
    }

    fn collect_parts<'a>(&'a self, out: &mut Vec<Part<'a>>) {
        match self {
            Geometry::Empty => {}
            Geometry::Point(c) => out.push(Part::Point(*c)),
            Geometry::MultiPoint(cs) => out.extend(cs.iter().map(|c| Part::Point(*c))),
            Geometry::LineString(cs) if cs.len() == 1 => out.push(Part::Point(cs[0])),
            Geometry::LineString(cs) => {
                if !cs.is_empty() {
                    out.push(Part::Path(cs))
                }
            }
            Geometry::Polygon(p) => out.push(Part::Area(p)),
            Geometry::MultiPolygon(ps) => out.extend(ps.iter().map(Part::Area)),
            Geometry::Collection(items) => items.iter().for_each(|g| g.collect_parts(out)),
        }
    }
}

enum Part<'a> {
    Point(PixelCoord),
    Path(&'a [PixelCoord]),
    Area(&'a Polygon),
}

fn parts_intersect(a: &Part<'_>, b: &Part<'_>) -> bool {
    match (a, b) {
        (Part::Point(p), Part::Point(q)) => p == q,
        (Part::Point(p), Part::Path(path)) | (Part::Path(path), Part::Point(p)) => path
            .windows(2)
            .any(|w| orientation(&w[0], &w[1], p) == 0.0 && on_segment(&w[0], &w[1], p)),
        (Part::Point(p), Part::Area(poly)) | (Part::Area(poly), Part::Point(p)) => {
            poly.contains_coord(p)
        }
        (Part::Path(a), Part::Path(b)) => a.windows(2).any(|s| {
            b.windows(2)
                .any(|t| segments_intersect(&s[0], &s[1], &t[0], &t[1]))
        }),
        (Part::Path(path), Part::Area(poly)) | (Part::Area(poly), Part::Path(path)) => {
            path.iter().any(|c| poly.contains_coord(c))
                || path.windows(2).any(|s| {
                    poly.edges()
                        .any(|(e0, e1)| segments_intersect(&s[0], &s[1], e0, e1))
                })
        }
        (Part::Area(a), Part::Area(b)) => {
            a.edges()
                .any(|(a0, a1)| b.edges().any(|(b0, b1)| segments_intersect(a0, a1, b0, b1)))
                || a.exterior.first().is_some_and(|c| b.contains_coord(c))
                || b.exterior.first().is_some_and(|c| a.contains_coord(c))
        }
    }
}

/// Twice the signed area of the triangle (p, q, r).
fn orientation(p: &PixelCoord, q: &PixelCoord, r: &PixelCoord) -> f64 {
    (q.x - p.x) * (r.y - p.y) - (q.y - p.y) * (r.x - p.x)
}

/// Assumes `r` is collinear with `p`-`q`.
fn on_segment(p: &PixelCoord, q: &PixelCoord, r: &PixelCoord) -> bool {
    r.x >= p.x.min(q.x) && r.x <= p.x.max(q.x) && r.y >= p.y.min(q.y) && r.y <= p.y.max(q.y)
}

fn segments_intersect(p1: &PixelCoord, p2: &PixelCoord, q1: &PixelCoord, q2: &PixelCoord) -> bool {
    let d1 = orientation(q1, q2, p1);
    let d2 = orientation(q1, q2, p2);
    let d3 = orientation(p1, p2, q1);
    let d4 = orientation(p1, p2, q2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    (d1 == 0.0 && on_segment(q1, q2, p1))
        || (d2 == 0.0 && on_segment(q1, q2, p2))
        || (d3 == 0.0 && on_segment(p1, p2, q1))
        || (d4 == 0.0 && on_segment(p1, p2, q2))
}

fn ring_boundary_contains(ring: &[PixelCoord], c: &PixelCoord) -> bool {
    ring.windows(2)
        .any(|w| orientation(&w[0], &w[1], c) == 0.0 && on_segment(&w[0], &w[1], c))
}

/// Even-odd ray cast; boundary points are not handled here.
fn ring_contains(ring: &[PixelCoord], c: &PixelCoord) -> bool {
    let mut inside = false;
    for w in ring.windows(2) {
        let (a, b) = (&w[0], &w[1]);
        if (a.y > c.y) != (b.y > c.y) {
            let x_cross = a.x + (c.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if c.x < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}
