#![allow(dead_code)]

use pathmirror::geometry::{Coord, Geometry, ImagePlane, PixelCoord, Polygon};
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

fn arb_ordinate() -> impl Strategy<Value = f64> {
    -50_000.0f64..50_000.0
}

pub fn arb_coord() -> impl Strategy<Value = PixelCoord> {
    (arb_ordinate(), arb_ordinate()).prop_map(|(x, y)| Coord::new(x, y))
}

pub fn arb_rectangle() -> impl Strategy<Value = Polygon> {
    (arb_ordinate(), arb_ordinate(), 0.5f64..5_000.0, 0.5f64..5_000.0)
        .prop_map(|(x, y, w, h)| Polygon::from_bounds(x, y, x + w, y + h))
}

/// A triangle with a clearly non-zero area.
pub fn arb_triangle() -> impl Strategy<Value = Polygon> {
    (arb_coord(), arb_coord(), arb_coord())
        .prop_filter("triangle must have area", |(a, b, c)| {
            ((b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)).abs() > 1.0
        })
        .prop_map(|(a, b, c)| Polygon::new(vec![a, b, c], Vec::new()))
}

/// A rectangle with one rectangular hole strictly inside it.
pub fn arb_polygon_with_hole() -> impl Strategy<Value = Polygon> {
    (arb_ordinate(), arb_ordinate(), 10.0f64..5_000.0, 10.0f64..5_000.0).prop_map(
        |(x, y, w, h)| {
            let outer = Polygon::from_bounds(x, y, x + w, y + h);
            let hole = Polygon::from_bounds(x + w / 4.0, y + h / 4.0, x + w / 2.0, y + h / 2.0);
            Polygon::new(outer.exterior().to_vec(), vec![hole.exterior().to_vec()])
        },
    )
}

pub fn arb_polygon() -> BoxedStrategy<Polygon> {
    prop_oneof![arb_rectangle(), arb_triangle(), arb_polygon_with_hole()].boxed()
}

/// Every geometry kind that survives a foreign round trip unchanged.
pub fn arb_geometry() -> BoxedStrategy<Geometry> {
    prop_oneof![
        arb_coord().prop_map(Geometry::Point),
        proptest::collection::vec(arb_coord(), 1..8).prop_map(Geometry::MultiPoint),
        proptest::collection::vec(arb_coord(), 2..8).prop_map(Geometry::LineString),
        arb_polygon().prop_map(Geometry::Polygon),
        proptest::collection::vec(arb_polygon(), 1..4).prop_map(Geometry::MultiPolygon),
    ]
    .boxed()
}

pub fn arb_plane() -> impl Strategy<Value = ImagePlane> {
    (0i32..16, 0i32..8).prop_map(|(z, t)| ImagePlane::new(z, t))
}

pub fn arb_class_name() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9_]{0,8}"
}

pub fn arb_class_path(max_depth: usize) -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec(arb_class_name(), 1..=max_depth)
}

/// One structural edit of a hierarchy, with indices into the list of
/// objects created so far.
#[derive(Clone, Debug)]
pub enum TreeOp {
    InsertAnnotation { parent: Option<usize> },
    InsertDetection { parent: Option<usize> },
    Reparent { object: usize, parent: Option<usize> },
    Remove { object: usize, cascade: bool },
}

pub fn arb_tree_op() -> BoxedStrategy<TreeOp> {
    let index = 0usize..64;
    prop_oneof![
        3 => proptest::option::of(index.clone()).prop_map(|parent| TreeOp::InsertAnnotation { parent }),
        2 => proptest::option::of(index.clone()).prop_map(|parent| TreeOp::InsertDetection { parent }),
        3 => (index.clone(), proptest::option::of(index.clone()))
            .prop_map(|(object, parent)| TreeOp::Reparent { object, parent }),
        2 => (index, any::<bool>()).prop_map(|(object, cascade)| TreeOp::Remove { object, cascade }),
    ]
    .boxed()
}

pub fn arb_tree_ops(max_len: usize) -> impl Strategy<Value = Vec<TreeOp>> {
    proptest::collection::vec(arb_tree_op(), 1..=max_len)
}
