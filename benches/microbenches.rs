//! Criterion microbenches for pathmirror conversion and parsing.
//!
//! Run with: `cargo bench`
//!
//! These benchmarks measure the performance of:
//! - ROI conversion to and from the in-memory runtime (to_foreign, to_native)
//! - GeoJSON geometry encoding and decoding
//! - Project manifest parsing (from_manifest_str)

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::path::Path;

use pathmirror::bridge::Session;
use pathmirror::geometry::geojson::{geometry_from_json, geometry_to_json};
use pathmirror::geometry::{to_foreign, to_native, Geometry, ImagePlane, Polygon};
use pathmirror::project::manifest::from_manifest_str;

/// A closed outline with `n` vertices on a circle, like a traced region.
fn outline(n: usize) -> Geometry {
    let points: Vec<(f64, f64)> = (0..n)
        .map(|i| {
            let angle = i as f64 / n as f64 * std::f64::consts::TAU;
            (5000.0 + 400.0 * angle.cos(), 5000.0 + 400.0 * angle.sin())
        })
        .collect();
    Polygon::from_xy(&points).into()
}

fn manifest(images: usize) -> String {
    let entries: Vec<String> = (1..=images)
        .map(|id| {
            format!(
                r#"{{"id": {id}, "name": "slide_{id}.svs", "serverUri": "file:///slides/slide_{id}.svs",
                "imageType": "BRIGHTFIELD_H_E", "metadata": {{"stain": "H&E"}},
                "pixelCalibration": {{"pixelWidth": 0.25, "pixelHeight": 0.25, "unit": "µm"}}}}"#
            )
        })
        .collect();
    format!(
        r#"{{"version": 1, "lastId": {}, "images": [{}],
        "pathClasses": [{{"name": "Tumor", "color": -3670016}}, {{"name": "Tumor: Positive", "color": -65536}}]}}"#,
        images,
        entries.join(",")
    )
}

/// Benchmark writing geometry into the runtime.
fn bench_to_foreign(c: &mut Criterion) {
    let session = Session::in_memory().expect("Failed to start session");
    let mut group = c.benchmark_group("to_foreign");

    for n in [16, 256, 4096] {
        let geometry = outline(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &geometry, |b, g| {
            b.iter(|| {
                let roi = to_foreign(&session, black_box(g), ImagePlane::default()).unwrap();
                black_box(roi)
            })
        });
    }

    group.finish();
}

/// Benchmark reading geometry back out of the runtime.
fn bench_to_native(c: &mut Criterion) {
    let session = Session::in_memory().expect("Failed to start session");
    let mut group = c.benchmark_group("to_native");

    for n in [16, 256, 4096] {
        let roi = to_foreign(&session, &outline(n), ImagePlane::default())
            .expect("Failed to create ROI");
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &roi, |b, roi| {
            b.iter(|| {
                let native = to_native(&session, black_box(*roi)).unwrap();
                black_box(native)
            })
        });
    }

    group.finish();
}

/// Benchmark GeoJSON geometry encoding and decoding.
fn bench_geojson(c: &mut Criterion) {
    let geometry = outline(1024);
    let json = geometry_to_json(&geometry);

    let mut group = c.benchmark_group("geojson");
    group.throughput(Throughput::Elements(1024));

    group.bench_function("geometry_to_json", |b| {
        b.iter(|| black_box(geometry_to_json(black_box(&geometry))))
    });
    group.bench_function("geometry_from_json", |b| {
        b.iter(|| black_box(geometry_from_json(black_box(&json)).unwrap()))
    });

    group.finish();
}

/// Benchmark manifest parsing and validation.
fn bench_manifest_parse(c: &mut Criterion) {
    let text = manifest(500);
    let path = Path::new("project.qpproj");

    let mut group = c.benchmark_group("manifest_parse");
    group.throughput(Throughput::Bytes(text.len() as u64));

    group.bench_function("from_manifest_str", |b| {
        b.iter(|| {
            let manifest = from_manifest_str(black_box(&text), path).unwrap();
            black_box(manifest)
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_to_foreign,
    bench_to_native,
    bench_geojson,
    bench_manifest_parse,
);
criterion_main!(benches);
