//! GeoJSON feature import and export for a hierarchy.
//!
//! Features follow QuPath's layout: `id` (or `properties.objectType`)
//! names the object type and `properties` carries `classification`
//! (`name`, `colorRGB`), `name`, `isLocked`, `isMissing` and a
//! `measurements` list of `{name, value}` records.

use std::collections::HashSet;

use serde_json::{json, Map, Value as Json};
use tracing::debug;

use super::{Hierarchy, Parent};
use crate::error::PathMirrorError;
use crate::geometry::geojson::{geometry_from_json, geometry_to_json};
use crate::geometry::{Geometry, ImagePlane, Roi};
use crate::objects::{Annotation, Detection, ObjectKind, PathObject, PathObjectLike, Tile, TmaCore};
use crate::taxonomy::{ClassPath, Rgb};

fn invalid(message: impl Into<String>) -> PathMirrorError {
    PathMirrorError::GeoJson(message.into())
}

/// A feature parsed and validated, but not yet created in the runtime.
struct PendingFeature {
    kind: ObjectKind,
    geometry: Geometry,
    class: Option<(ClassPath, Option<Rgb>)>,
    name: Option<String>,
    locked: bool,
    missing: bool,
    measurements: Vec<(String, f64)>,
}

fn parse_classification(value: &Json, at: &str) -> Result<(ClassPath, Option<Rgb>), PathMirrorError> {
    let object = value
        .as_object()
        .ok_or_else(|| invalid(format!("{}.classification must be an object", at)))?;
    let name = object
        .get("name")
        .and_then(Json::as_str)
        .ok_or_else(|| invalid(format!("{}.classification has no 'name'", at)))?;
    let color = match object.get("colorRGB") {
        None | Some(Json::Null) => None,
        Some(v) => {
            let packed = v
                .as_i64()
                .and_then(|n| i32::try_from(n).ok())
                .ok_or_else(|| invalid(format!("{}.classification.colorRGB is not an int", at)))?;
            Some(Rgb::from_packed(packed))
        }
    };
    Ok((ClassPath::parse(name)?, color))
}

fn parse_measurements(value: &Json, at: &str) -> Result<Vec<(String, f64)>, PathMirrorError> {
    let bad = || invalid(format!("{}.measurements is malformed", at));
    match value {
        Json::Null => Ok(Vec::new()),
        Json::Array(items) => items
            .iter()
            .map(|item| {
                let name = item.get("name").and_then(Json::as_str).ok_or_else(bad)?;
                let value = item.get("value").and_then(Json::as_f64).ok_or_else(bad)?;
                Ok((name.to_string(), value))
            })
            .collect(),
        Json::Object(map) => map
            .iter()
            .map(|(name, v)| Ok((name.clone(), v.as_f64().ok_or_else(bad)?)))
            .collect(),
        _ => Err(bad()),
    }
}

fn parse_feature(feature: &Json, index: usize) -> Result<PendingFeature, PathMirrorError> {
    let at = format!("features[{}]", index);
    let object = feature
        .as_object()
        .ok_or_else(|| invalid(format!("{} must be an object", at)))?;
    if object.get("type").and_then(Json::as_str) != Some("Feature") {
        return Err(invalid(format!("{} is not a Feature", at)));
    }

    let empty = Map::new();
    let properties = match object.get("properties") {
        None | Some(Json::Null) => &empty,
        Some(Json::Object(map)) => map,
        Some(_) => return Err(invalid(format!("{}.properties must be an object", at))),
    };

    // Newer QuPath versions use a UUID as `id` and put the type in
    // properties.objectType.
    let kind = match properties.get("objectType") {
        Some(Json::String(name)) => match name.as_str() {
            "annotation" => ObjectKind::Annotation,
            "detection" | "cell" => ObjectKind::Detection,
            "tile" => ObjectKind::Tile,
            "tma_core" => ObjectKind::TmaCore,
            other => {
                return Err(invalid(format!(
                    "{}.properties.objectType '{}' is not a known object type",
                    at, other
                )))
            }
        },
        Some(_) => return Err(invalid(format!("{}.properties.objectType must be a string", at))),
        None => match object.get("id") {
            None | Some(Json::Null) => ObjectKind::Annotation,
            Some(Json::String(id)) => ObjectKind::from_geojson_id(id).ok_or_else(|| {
                invalid(format!("{}.id '{}' is not a known object type", at, id))
            })?,
            Some(_) => return Err(invalid(format!("{}.id must be a string", at))),
        },
    };

    let geometry = object
        .get("geometry")
        .ok_or_else(|| invalid(format!("{} has no geometry", at)))
        .and_then(geometry_from_json)?;
    // collections must resolve to one ROI kind
    if !geometry.is_degenerate() {
        geometry
            .flatten()
            .map_err(|e| invalid(format!("{}.geometry: {}", at, e)))?;
    }

    let class = match properties.get("classification") {
        None | Some(Json::Null) => None,
        Some(value) => Some(parse_classification(value, &at)?),
    };
    let name = properties
        .get("name")
        .and_then(Json::as_str)
        .map(str::to_string);
    let flag = |key: &str| properties.get(key).and_then(Json::as_bool).unwrap_or(false);
    let locked = flag("isLocked");
    let missing = flag("isMissing");
    let measurements = match properties.get("measurements") {
        Some(value) => parse_measurements(value, &at)?,
        None => Vec::new(),
    };

    Ok(PendingFeature {
        kind,
        geometry,
        class,
        name,
        locked,
        missing,
        measurements,
    })
}

fn parse_features(input: &Json) -> Result<Vec<PendingFeature>, PathMirrorError> {
    let features = match input {
        Json::Array(items) => items,
        Json::Object(map) if map.get("type").and_then(Json::as_str) == Some("FeatureCollection") => {
            map.get("features")
                .and_then(Json::as_array)
                .ok_or_else(|| invalid("FeatureCollection has no 'features' list"))?
        }
        _ => return Err(invalid("expected a list of features or a FeatureCollection")),
    };

    features
        .iter()
        .enumerate()
        .map(|(i, f)| parse_feature(f, i))
        .collect()
}

/// Parses feature JSON without a session and returns the feature count.
#[cfg(feature = "fuzzing")]
#[doc(hidden)]
pub fn parse_features_for_fuzzing(input: &[u8]) -> Result<usize, PathMirrorError> {
    let json: Json =
        serde_json::from_slice(input).map_err(|e| invalid(format!("invalid JSON: {}", e)))?;
    parse_features(&json).map(|features| features.len())
}

impl Hierarchy {
    /// Exports every object as a GeoJSON feature, in pre-order.
    ///
    /// The output is a flat list; parent/child structure is not encoded.
    pub fn to_geojson(&self) -> Result<Json, PathMirrorError> {
        let mut features = Vec::new();
        for object in self.objects()? {
            let mut properties = Map::new();
            if let Some(name) = object.name()? {
                properties.insert("name".into(), json!(name));
            }
            if let Some(class) = object.path_class()? {
                properties.insert(
                    "classification".into(),
                    json!({
                        "name": class.to_string(),
                        "colorRGB": class.color()?.to_packed(),
                    }),
                );
            }
            match &object {
                PathObject::Annotation(a) => {
                    properties.insert("isLocked".into(), json!(a.is_locked()?));
                }
                PathObject::TmaCore(c) => {
                    properties.insert("isMissing".into(), json!(c.is_missing()?));
                }
                _ => {}
            }
            let measurements: Vec<Json> = object
                .measurements()?
                .into_iter()
                .map(|(name, value)| json!({"name": name, "value": value}))
                .collect();
            properties.insert("measurements".into(), Json::Array(measurements));

            features.push(json!({
                "type": "Feature",
                "id": object.kind().geojson_id(),
                "geometry": geometry_to_json(object.roi()?.geometry()),
                "properties": properties,
            }));
        }
        Ok(Json::Array(features))
    }

    /// Imports GeoJSON features as top-level objects and returns how many
    /// were added.
    ///
    /// Accepts a list of features or a `FeatureCollection`. Every feature
    /// is parsed and every object built before the taxonomy or the tree is
    /// touched, so malformed input leaves both unchanged. Classifications
    /// missing from the taxonomy are created with the feature's color, and
    /// removed again if the import fails afterwards.
    ///
    /// # Errors
    /// `GeoJson` for input that is not a feature list or contains a
    /// malformed feature or an unknown object type; `InvalidClassName` for
    /// bad classification names.
    pub fn load_geojson(&self, input: &Json) -> Result<usize, PathMirrorError> {
        let pending = parse_features(input)?;

        let taxonomy = self.taxonomy();
        let mut built = Vec::with_capacity(pending.len());
        for feature in pending {
            let roi = Roi::new(feature.geometry, ImagePlane::default());
            let object: PathObject = match feature.kind {
                ObjectKind::Annotation => {
                    let a = Annotation::new(taxonomy, &roi)?;
                    if feature.locked {
                        a.set_locked(true)?;
                    }
                    a.into()
                }
                ObjectKind::Detection => Detection::new(taxonomy, &roi)?.into(),
                ObjectKind::Tile => Tile::new(taxonomy, &roi)?.into(),
                ObjectKind::TmaCore => {
                    let core = TmaCore::new(taxonomy, &roi)?;
                    if feature.missing {
                        core.set_missing(true)?;
                    }
                    core.into()
                }
            };
            if feature.name.is_some() {
                object.set_name(feature.name.as_deref())?;
            }
            for (name, value) in &feature.measurements {
                object.set_measurement(name, *value)?;
            }
            built.push((object, feature.class));
        }

        let known: HashSet<ClassPath> = taxonomy
            .list()
            .iter()
            .map(|c| c.path().clone())
            .collect();
        let result = self.classify_and_insert(built);
        if result.is_err() {
            for class in taxonomy.list() {
                if !known.contains(class.path()) {
                    taxonomy.remove(&class);
                }
            }
        }
        result
    }

    fn classify_and_insert(
        &self,
        built: Vec<(PathObject, Option<(ClassPath, Option<Rgb>)>)>,
    ) -> Result<usize, PathMirrorError> {
        let taxonomy = self.taxonomy();
        let mut objects = Vec::with_capacity(built.len());
        for (object, class) in built {
            if let Some((path, color)) = class {
                let fresh = taxonomy.get(&path).is_none();
                let class = taxonomy.get_or_create_path(&path)?;
                if let (true, Some(color)) = (fresh, color) {
                    taxonomy.set_color(&class, color)?;
                }
                object.set_path_class(Some(&class))?;
            }
            objects.push(object);
        }

        let count = objects.len();
        self.insert_all(objects, Parent::Root)?;
        debug!(count, "GeoJSON features imported");
        Ok(count)
    }
}
