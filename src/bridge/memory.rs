//! An in-process implementation of the foreign object model.
//!
//! `InMemoryRuntime` stores objects as a class name plus a bag of
//! properties, mirroring how the JVM side exposes bean accessors:
//! `getX()`, `isX()` and `setX(v)` read and write property `x`
//! (case-insensitive). Parent/child links, measurement lists, entry
//! metadata and hierarchy persistence have dedicated methods.
//!
//! Constructor arguments are positional and bound to properties per class;
//! see [`constructor_params`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::classes;
use super::{Bridge, ForeignRef, Value};
use crate::error::PathMirrorError;
use crate::settings::BridgeSettings;

/// Version tag written into serialized hierarchy files.
const HIERARCHY_FILE_VERSION: u32 = 1;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct ForeignObject {
    class: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    props: BTreeMap<String, Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<ForeignRef>,

    #[serde(skip)]
    parent: Option<ForeignRef>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    measurements: Vec<(String, f64)>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    metadata: Vec<(String, String)>,
}

/// On-disk layout of one serialized hierarchy.
#[derive(Debug, Serialize, Deserialize)]
struct HierarchyFile {
    version: u32,
    root: ForeignRef,
    objects: Vec<(ForeignRef, ForeignObject)>,
}

/// Property names bound to positional constructor arguments.
fn constructor_params(class: &str) -> Option<&'static [&'static str]> {
    let params: &'static [&'static str] = match class {
        classes::POINTS_ROI | classes::POLYLINE_ROI | classes::POLYGON_ROI => &["x", "y", "z", "t"],
        classes::LINE_ROI => &["x1", "y1", "x2", "y2", "z", "t"],
        classes::RECTANGLE_ROI => &["x", "y", "width", "height", "z", "t"],
        classes::GEOMETRY_ROI => &["kind", "coordinates", "z", "t"],
        classes::PATH_CLASS => &["name", "parent", "color"],
        classes::PIXEL_CALIBRATION => &["pixelwidth", "pixelheight", "zspacing", "unit"],
        classes::ANNOTATION | classes::DETECTION | classes::TILE | classes::TMA_CORE => {
            &["roi", "pathclass"]
        }
        classes::PROJECT_ENTRY => &["id", "serveruri", "imagename"],
        classes::HIERARCHY | classes::ROOT_OBJECT => &[],
        _ => return None,
    };
    Some(params)
}

fn foreign_error(class: &str, method: &str, message: impl Into<String>) -> PathMirrorError {
    PathMirrorError::ForeignCall {
        class: class.to_string(),
        method: method.to_string(),
        message: message.into(),
    }
}

/// Maps a bean accessor to its property key: `getImageName` -> `imagename`.
fn accessor_key(method: &str, prefix: &str) -> Option<String> {
    method
        .strip_prefix(prefix)
        .filter(|rest| rest.starts_with(|c: char| c.is_ascii_uppercase()))
        .map(|rest| rest.to_ascii_lowercase())
}

/// A self-contained foreign runtime living in this process.
#[derive(Debug, Default)]
pub struct InMemoryRuntime {
    objects: HashMap<ForeignRef, ForeignObject>,
    next_id: u64,
    started: bool,
    exclusive: bool,
    settings: BridgeSettings,
}

impl InMemoryRuntime {
    /// Creates an empty, non-exclusive runtime.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a runtime configured from resolved bridge settings.
    pub fn with_settings(settings: BridgeSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Marks the runtime as a process singleton, like a real JVM.
    pub fn exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    /// Number of live objects, including unreachable ones.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn ensure_started(&self) -> Result<(), PathMirrorError> {
        if self.started {
            Ok(())
        } else {
            Err(PathMirrorError::BridgeUnavailable(
                "runtime not started".into(),
            ))
        }
    }

    fn alloc(&mut self, object: ForeignObject) -> ForeignRef {
        self.next_id += 1;
        let id = ForeignRef(self.next_id);
        self.objects.insert(id, object);
        id
    }

    fn get(&self, object: ForeignRef) -> Result<&ForeignObject, PathMirrorError> {
        self.objects.get(&object).ok_or_else(|| {
            foreign_error("?", "?", format!("NullPointerException: no object {}", object))
        })
    }

    fn get_mut(&mut self, object: ForeignRef) -> Result<&mut ForeignObject, PathMirrorError> {
        self.objects.get_mut(&object).ok_or_else(|| {
            foreign_error("?", "?", format!("NullPointerException: no object {}", object))
        })
    }

    fn is_ancestor(&self, candidate: ForeignRef, of: ForeignRef) -> bool {
        let mut current = self.objects.get(&of).and_then(|o| o.parent);
        while let Some(id) = current {
            if id == candidate {
                return true;
            }
            current = self.objects.get(&id).and_then(|o| o.parent);
        }
        false
    }

    /// Moves every child under `parent`. Validates all children first so the
    /// operation is all-or-nothing.
    fn attach(
        &mut self,
        parent: ForeignRef,
        children: &[ForeignRef],
        method: &str,
    ) -> Result<(), PathMirrorError> {
        let parent_class = self.get(parent)?.class.clone();
        let mut seen = HashSet::new();
        for &child in children {
            self.get(child)?;
            if child == parent || self.is_ancestor(child, parent) {
                return Err(foreign_error(
                    &parent_class,
                    method,
                    format!("IllegalArgumentException: {} would become its own ancestor", child),
                ));
            }
            if !seen.insert(child) {
                return Err(foreign_error(
                    &parent_class,
                    method,
                    format!("IllegalArgumentException: {} listed twice", child),
                ));
            }
        }

        for &child in children {
            self.detach(child);
            self.get_mut(parent)?.children.push(child);
            self.get_mut(child)?.parent = Some(parent);
        }
        Ok(())
    }

    fn detach(&mut self, child: ForeignRef) -> bool {
        let Some(old_parent) = self.objects.get(&child).and_then(|o| o.parent) else {
            return false;
        };
        if let Some(p) = self.objects.get_mut(&old_parent) {
            p.children.retain(|c| *c != child);
        }
        if let Some(c) = self.objects.get_mut(&child) {
            c.parent = None;
        }
        true
    }

    fn refs_of(&self, items: &[Value], class: &str, method: &str) -> Result<Vec<ForeignRef>, PathMirrorError> {
        items
            .iter()
            .map(|v| match v {
                Value::Ref(r) => Ok(*r),
                other => Err(foreign_error(
                    class,
                    method,
                    format!("ClassCastException: expected object, got {}", other.kind_name()),
                )),
            })
            .collect()
    }

    fn root_of_hierarchy(&self, hierarchy: ForeignRef) -> Result<ForeignRef, PathMirrorError> {
        match self.get(hierarchy)?.props.get("rootobject") {
            Some(Value::Ref(root)) => Ok(*root),
            _ => Err(foreign_error(
                classes::HIERARCHY,
                "getRootObject",
                "IllegalStateException: hierarchy has no root",
            )),
        }
    }

    /// Every object reachable from `root` through children and references.
    fn reachable(&self, root: ForeignRef) -> Vec<ForeignRef> {
        fn push_refs(value: &Value, stack: &mut Vec<ForeignRef>) {
            match value {
                Value::Ref(r) => stack.push(*r),
                Value::List(items) => items.iter().for_each(|v| push_refs(v, stack)),
                _ => {}
            }
        }

        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let Some(obj) = self.objects.get(&id) else {
                continue;
            };
            order.push(id);
            stack.extend(obj.children.iter().rev().copied());
            obj.props.values().for_each(|v| push_refs(v, &mut stack));
        }
        order
    }

    fn write_hierarchy(&self, hierarchy: ForeignRef, path: &Path) -> Result<(), PathMirrorError> {
        let io_err = |e: std::io::Error| {
            foreign_error(classes::HIERARCHY, "writeHierarchy", format!("IOException: {}", e))
        };

        let root = self.root_of_hierarchy(hierarchy)?;
        let objects = self
            .reachable(root)
            .into_iter()
            .filter_map(|id| self.objects.get(&id).map(|o| (id, o.clone())))
            .collect();
        let file = HierarchyFile {
            version: HIERARCHY_FILE_VERSION,
            root,
            objects,
        };

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(io_err)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        serde_json::to_writer(&mut tmp, &file).map_err(|e| {
            foreign_error(classes::HIERARCHY, "writeHierarchy", format!("IOException: {}", e))
        })?;
        tmp.flush().map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;
        debug!(path = %path.display(), "hierarchy written");
        Ok(())
    }

    fn read_hierarchy(&mut self, hierarchy: ForeignRef, path: &Path) -> Result<(), PathMirrorError> {
        let err = |message: String| foreign_error(classes::HIERARCHY, "readHierarchy", message);

        let bytes = fs::read(path).map_err(|e| err(format!("IOException: {}", e)))?;
        let file: HierarchyFile =
            serde_json::from_slice(&bytes).map_err(|e| err(format!("IOException: {}", e)))?;
        if file.version != HIERARCHY_FILE_VERSION {
            return Err(err(format!(
                "IOException: unsupported hierarchy version {}",
                file.version
            )));
        }

        let mut remap = HashMap::new();
        for (old, _) in &file.objects {
            self.next_id += 1;
            remap.insert(*old, ForeignRef(self.next_id));
        }
        let new_root = *remap
            .get(&file.root)
            .ok_or_else(|| err("IOException: root object missing".into()))?;

        fn rewrite(value: Value, remap: &HashMap<ForeignRef, ForeignRef>) -> Value {
            match value {
                Value::Ref(r) => remap.get(&r).map_or(Value::Null, |n| Value::Ref(*n)),
                Value::List(items) => {
                    Value::List(items.into_iter().map(|v| rewrite(v, remap)).collect())
                }
                other => other,
            }
        }

        let mut loaded = Vec::with_capacity(file.objects.len());
        for (old, mut obj) in file.objects {
            obj.props = obj
                .props
                .into_iter()
                .map(|(k, v)| (k, rewrite(v, &remap)))
                .collect();
            obj.children = obj
                .children
                .iter()
                .filter_map(|c| remap.get(c).copied())
                .collect();
            obj.parent = None;
            loaded.push((remap[&old], obj));
        }
        for (id, obj) in &loaded {
            for child in &obj.children {
                self.objects.entry(*child).or_default().parent = Some(*id);
            }
        }
        for (id, obj) in loaded {
            let parent = self.objects.get(&id).and_then(|o| o.parent);
            self.objects.insert(id, ForeignObject { parent, ..obj });
        }

        self.get_mut(hierarchy)?
            .props
            .insert("rootobject".into(), Value::Ref(new_root));
        debug!(path = %path.display(), "hierarchy read");
        Ok(())
    }
}

impl Bridge for InMemoryRuntime {
    fn start(&mut self) -> Result<(), PathMirrorError> {
        if let Some(dir) = &self.settings.install_dir {
            if !dir.is_dir() {
                return Err(PathMirrorError::BridgeUnavailable(format!(
                    "installation directory {} does not exist",
                    dir.display()
                )));
            }
        }
        debug!(version = ?self.settings.version, "in-memory runtime started");
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.started = false;
        self.objects.clear();
    }

    fn exclusive(&self) -> bool {
        self.exclusive
    }

    fn construct(&mut self, class: &str, args: &[Value]) -> Result<ForeignRef, PathMirrorError> {
        self.ensure_started()?;
        let params = constructor_params(class).ok_or_else(|| {
            foreign_error(class, "<init>", format!("ClassNotFoundException: {}", class))
        })?;
        if params.len() != args.len() {
            return Err(foreign_error(
                class,
                "<init>",
                format!(
                    "NoSuchMethodException: expected {} arguments, got {}",
                    params.len(),
                    args.len()
                ),
            ));
        }

        let props = params
            .iter()
            .zip(args)
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        let id = self.alloc(ForeignObject {
            class: class.to_string(),
            props,
            ..ForeignObject::default()
        });

        if class == classes::HIERARCHY {
            let root = self.alloc(ForeignObject {
                class: classes::ROOT_OBJECT.to_string(),
                ..ForeignObject::default()
            });
            self.get_mut(id)?
                .props
                .insert("rootobject".into(), Value::Ref(root));
        }
        Ok(id)
    }

    fn call(
        &mut self,
        object: ForeignRef,
        method: &str,
        args: &[Value],
    ) -> Result<Value, PathMirrorError> {
        self.ensure_started()?;
        let class = self.get(object)?.class.clone();
        let cast_err = || {
            foreign_error(
                &class,
                method,
                "IllegalArgumentException: argument type mismatch",
            )
        };

        match (method, args) {
            // a class's parent is a constructor property, not a tree link
            ("getParent", []) if class == classes::PATH_CLASS => Ok(self
                .get(object)?
                .props
                .get("parent")
                .cloned()
                .unwrap_or(Value::Null)),
            ("getParent", []) => Ok(self.get(object)?.parent.into()),
            ("getChildObjects", []) => Ok(Value::List(
                self.get(object)?.children.iter().map(|c| Value::Ref(*c)).collect(),
            )),
            ("addChildObject", [Value::Ref(child)]) => {
                self.attach(object, &[*child], method)?;
                Ok(Value::Null)
            }
            ("addChildObjects", [Value::List(items)]) => {
                let refs = self.refs_of(items, &class, method)?;
                self.attach(object, &refs, method)?;
                Ok(Value::Null)
            }
            ("removeChildObject", [Value::Ref(child)]) => {
                if self.get(*child)?.parent != Some(object) {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.detach(*child)))
            }
            ("addObjects", [Value::List(items), Value::Ref(parent)])
                if class == classes::HIERARCHY =>
            {
                let refs = self.refs_of(items, &class, method)?;
                self.attach(*parent, &refs, method)?;
                Ok(Value::Bool(!refs.is_empty()))
            }
            ("writeHierarchy", [Value::Str(path)]) if class == classes::HIERARCHY => {
                self.write_hierarchy(object, Path::new(path))?;
                Ok(Value::Null)
            }
            ("readHierarchy", [Value::Str(path)]) if class == classes::HIERARCHY => {
                self.read_hierarchy(object, Path::new(path))?;
                Ok(Value::Null)
            }

            ("putMeasurement", [Value::Str(name), value]) => {
                let value = value.as_f64(method).map_err(|_| cast_err())?;
                let list = &mut self.get_mut(object)?.measurements;
                match list.iter_mut().find(|(k, _)| k == name) {
                    Some(slot) => slot.1 = value,
                    None => list.push((name.clone(), value)),
                }
                Ok(Value::Null)
            }
            ("getMeasurement", [Value::Str(name)]) => Ok(self
                .get(object)?
                .measurements
                .iter()
                .find(|(k, _)| k == name)
                .map_or(Value::Null, |(_, v)| Value::Float(*v))),
            ("removeMeasurement", [Value::Str(name)]) => {
                let list = &mut self.get_mut(object)?.measurements;
                let before = list.len();
                list.retain(|(k, _)| k != name);
                Ok(Value::Bool(list.len() != before))
            }
            ("getMeasurementNames", []) => Ok(Value::List(
                self.get(object)?
                    .measurements
                    .iter()
                    .map(|(k, _)| Value::Str(k.clone()))
                    .collect(),
            )),

            ("putMetadataValue", [Value::Str(key), Value::Str(value)]) => {
                let map = &mut self.get_mut(object)?.metadata;
                match map.iter_mut().find(|(k, _)| k == key) {
                    Some(slot) => slot.1 = value.clone(),
                    None => map.push((key.clone(), value.clone())),
                }
                Ok(Value::Null)
            }
            ("getMetadataValue", [Value::Str(key)]) => Ok(self
                .get(object)?
                .metadata
                .iter()
                .find(|(k, _)| k == key)
                .map_or(Value::Null, |(_, v)| Value::Str(v.clone()))),
            ("removeMetadataValue", [Value::Str(key)]) => {
                let map = &mut self.get_mut(object)?.metadata;
                let before = map.len();
                map.retain(|(k, _)| k != key);
                Ok(Value::Bool(map.len() != before))
            }
            ("getMetadataKeys", []) => Ok(Value::List(
                self.get(object)?
                    .metadata
                    .iter()
                    .map(|(k, _)| Value::Str(k.clone()))
                    .collect(),
            )),
            ("clearMetadata", []) => {
                self.get_mut(object)?.metadata.clear();
                Ok(Value::Null)
            }

            (m, []) if accessor_key(m, "get").is_some() => {
                let key = accessor_key(m, "get").unwrap_or_default();
                Ok(self.get(object)?.props.get(&key).cloned().unwrap_or(Value::Null))
            }
            (m, []) if accessor_key(m, "is").is_some() => {
                let key = accessor_key(m, "is").unwrap_or_default();
                match self.get(object)?.props.get(&key) {
                    Some(Value::Bool(b)) => Ok(Value::Bool(*b)),
                    None | Some(Value::Null) => Ok(Value::Bool(false)),
                    Some(_) => Err(cast_err()),
                }
            }
            (m, [value]) if accessor_key(m, "set").is_some() => {
                let key = accessor_key(m, "set").unwrap_or_default();
                self.get_mut(object)?.props.insert(key, value.clone());
                Ok(Value::Null)
            }
            _ => Err(foreign_error(
                &class,
                method,
                format!("NoSuchMethodException: {}.{}/{}", class, method, args.len()),
            )),
        }
    }

    /// Evicts each object with the ROIs it owns. Children that are still
    /// present lose their parent link.
    fn release(&mut self, objects: &[ForeignRef]) {
        for &id in objects {
            self.detach(id);
            let Some(obj) = self.objects.remove(&id) else {
                continue;
            };
            for child in &obj.children {
                if let Some(c) = self.objects.get_mut(child) {
                    c.parent = None;
                }
            }
            if let Some(Value::Ref(roi)) = obj.props.get("roi") {
                if self.is_instance(*roi, classes::ROI).unwrap_or(false) {
                    self.objects.remove(roi);
                }
            }
        }
        debug!(count = objects.len(), live = self.objects.len(), "objects evicted");
    }

    fn is_instance(&self, object: ForeignRef, class: &str) -> Result<bool, PathMirrorError> {
        let mut current = Some(self.get(object)?.class.as_str());
        while let Some(name) = current {
            if name == class {
                return Ok(true);
            }
            current = classes::superclass(name);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> InMemoryRuntime {
        let mut rt = InMemoryRuntime::new();
        rt.start().unwrap();
        rt
    }

    fn annotation(rt: &mut InMemoryRuntime) -> ForeignRef {
        rt.construct(classes::ANNOTATION, &[Value::Null, Value::Null])
            .unwrap()
    }

    #[test]
    fn test_calls_before_start_fail() {
        let mut rt = InMemoryRuntime::new();
        let err = rt.construct(classes::HIERARCHY, &[]).unwrap_err();
        assert!(matches!(err, PathMirrorError::BridgeUnavailable(_)));
    }

    #[test]
    fn test_bean_accessors() {
        let mut rt = started();
        let obj = annotation(&mut rt);

        assert_eq!(rt.call(obj, "getName", &[]).unwrap(), Value::Null);
        rt.call(obj, "setName", &["tumor region".into()]).unwrap();
        assert_eq!(
            rt.call(obj, "getName", &[]).unwrap(),
            Value::Str("tumor region".into())
        );

        assert_eq!(rt.call(obj, "isLocked", &[]).unwrap(), Value::Bool(false));
        rt.call(obj, "setLocked", &[true.into()]).unwrap();
        assert_eq!(rt.call(obj, "isLocked", &[]).unwrap(), Value::Bool(true));

        // constructor arguments are readable as properties
        assert_eq!(rt.call(obj, "getPathClass", &[]).unwrap(), Value::Null);
    }

    #[test]
    fn test_unknown_class_and_method() {
        let mut rt = started();
        assert!(rt.construct("java.lang.Thread", &[]).is_err());
        let obj = annotation(&mut rt);
        let err = rt.call(obj, "explode", &[]).unwrap_err();
        assert!(err.to_string().contains("NoSuchMethodException"));
    }

    #[test]
    fn test_constructor_arity_is_checked() {
        let mut rt = started();
        assert!(rt.construct(classes::ANNOTATION, &[Value::Null]).is_err());
    }

    #[test]
    fn test_attach_moves_between_parents() {
        let mut rt = started();
        let a = annotation(&mut rt);
        let b = annotation(&mut rt);
        let c = annotation(&mut rt);

        rt.call(a, "addChildObject", &[c.into()]).unwrap();
        rt.call(b, "addChildObject", &[c.into()]).unwrap();

        assert_eq!(rt.call(a, "getChildObjects", &[]).unwrap(), Value::List(vec![]));
        assert_eq!(rt.call(c, "getParent", &[]).unwrap(), Value::Ref(b));
    }

    #[test]
    fn test_attach_rejects_cycles_without_partial_change() {
        let mut rt = started();
        let a = annotation(&mut rt);
        let b = annotation(&mut rt);
        let other = annotation(&mut rt);
        rt.call(a, "addChildObject", &[b.into()]).unwrap();

        let err = rt
            .call(b, "addChildObjects", &[Value::List(vec![other.into(), a.into()])])
            .unwrap_err();
        assert!(err.to_string().contains("own ancestor"));
        assert_eq!(rt.call(other, "getParent", &[]).unwrap(), Value::Null);
    }

    #[test]
    fn test_measurement_list_keeps_insertion_order() {
        let mut rt = started();
        let obj = annotation(&mut rt);
        rt.call(obj, "putMeasurement", &["b".into(), 2.0.into()]).unwrap();
        rt.call(obj, "putMeasurement", &["a".into(), Value::Int(1)]).unwrap();
        rt.call(obj, "putMeasurement", &["b".into(), 3.0.into()]).unwrap();

        assert_eq!(
            rt.call(obj, "getMeasurementNames", &[]).unwrap(),
            Value::List(vec!["b".into(), "a".into()])
        );
        assert_eq!(
            rt.call(obj, "getMeasurement", &["b".into()]).unwrap(),
            Value::Float(3.0)
        );
        assert_eq!(
            rt.call(obj, "removeMeasurement", &["a".into()]).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_hierarchy_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("1").join("data.qpdata");
        let path_arg = Value::Str(path.to_string_lossy().into_owned());

        let mut rt = started();
        let hierarchy = rt.construct(classes::HIERARCHY, &[]).unwrap();
        let root = rt.root_of_hierarchy(hierarchy).unwrap();
        let class = rt
            .construct(classes::PATH_CLASS, &["Tumor".into(), Value::Null, Value::Int(-3670016)])
            .unwrap();
        let obj = rt
            .construct(classes::ANNOTATION, &[Value::Null, class.into()])
            .unwrap();
        rt.call(obj, "putMeasurement", &["area".into(), 12.5.into()]).unwrap();
        rt.call(root, "addChildObject", &[obj.into()]).unwrap();
        rt.call(hierarchy, "writeHierarchy", &[path_arg.clone()]).unwrap();

        let mut fresh = started();
        let h2 = fresh.construct(classes::HIERARCHY, &[]).unwrap();
        fresh
            .call(h2, "readHierarchy", &[path_arg])
            .unwrap();
        let root2 = fresh.root_of_hierarchy(h2).unwrap();
        let children = fresh.call(root2, "getChildObjects", &[]).unwrap();
        let child = children.as_list("t").unwrap()[0].as_ref("t").unwrap();

        assert_eq!(fresh.call(child, "getParent", &[]).unwrap(), Value::Ref(root2));
        assert_eq!(
            fresh.call(child, "getMeasurement", &["area".into()]).unwrap(),
            Value::Float(12.5)
        );
        let class2 = fresh.call(child, "getPathClass", &[]).unwrap().as_ref("t").unwrap();
        assert_eq!(
            fresh.call(class2, "getName", &[]).unwrap(),
            Value::Str("Tumor".into())
        );
        assert!(fresh.is_instance(child, classes::PATH_OBJECT).unwrap());
    }

    #[test]
    fn test_release_evicts_object_and_its_roi() {
        let mut rt = started();
        let hierarchy = rt.construct(classes::HIERARCHY, &[]).unwrap();
        let root = rt.root_of_hierarchy(hierarchy).unwrap();
        let roi = rt
            .construct(
                classes::POINTS_ROI,
                &[
                    Value::List(vec![1.0.into()]),
                    Value::List(vec![2.0.into()]),
                    Value::Int(0),
                    Value::Int(0),
                ],
            )
            .unwrap();
        let parent = rt
            .construct(classes::ANNOTATION, &[roi.into(), Value::Null])
            .unwrap();
        let child = annotation(&mut rt);
        rt.call(root, "addChildObject", &[parent.into()]).unwrap();
        rt.call(parent, "addChildObject", &[child.into()]).unwrap();
        let before = rt.object_count();

        rt.release(&[parent]);
        assert_eq!(rt.object_count(), before - 2);
        assert_eq!(rt.call(root, "getChildObjects", &[]).unwrap(), Value::List(vec![]));
        assert_eq!(rt.call(child, "getParent", &[]).unwrap(), Value::Null);
        assert!(rt.call(parent, "getName", &[]).is_err());

        // releasing twice is harmless
        rt.release(&[parent]);
        assert_eq!(rt.object_count(), before - 2);
    }

    #[test]
    fn test_class_parent_is_its_constructor_argument() {
        let mut rt = started();
        let tumor = rt
            .construct(classes::PATH_CLASS, &["Tumor".into(), Value::Null, Value::Int(-3670016)])
            .unwrap();
        let positive = rt
            .construct(
                classes::PATH_CLASS,
                &["Positive".into(), tumor.into(), Value::Int(-65536)],
            )
            .unwrap();

        assert_eq!(rt.call(positive, "getParent", &[]).unwrap(), Value::Ref(tumor));
        assert_eq!(rt.call(tumor, "getParent", &[]).unwrap(), Value::Null);
    }

    #[test]
    fn test_missing_install_dir_fails_start() {
        let settings = BridgeSettings {
            install_dir: Some("/definitely/not/here".into()),
            ..BridgeSettings::default()
        };
        let mut rt = InMemoryRuntime::with_settings(settings);
        assert!(matches!(
            rt.start().unwrap_err(),
            PathMirrorError::BridgeUnavailable(_)
        ));
    }
}
