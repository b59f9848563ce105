//! The per-image tree of path objects.
//!
//! A [`Hierarchy`] wraps one foreign hierarchy object. The tree lives in
//! the foreign runtime; this type validates every structural change before
//! issuing it, so a rejected operation leaves the tree untouched.
//!
//! Invariants maintained here:
//! - every attached object has exactly one parent and is reachable from
//!   the root
//! - no object is its own ancestor
//! - detections and tiles never have children
//! - removed objects are never inserted again

mod geojson;
mod integrity;

pub use integrity::{Defect, IntegrityReport};

#[cfg(feature = "fuzzing")]
#[doc(hidden)]
pub use geojson::parse_features_for_fuzzing;

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::rc::Rc;

use tracing::debug;

use crate::bridge::{classes, ForeignRef, Session, Value};
use crate::error::PathMirrorError;
use crate::geometry::{Geometry, ImagePlane, Roi};
use crate::objects::{
    Annotation, Detection, Lifecycle, PathObject, PathObjectLike, Tile, TmaCore,
};
use crate::taxonomy::{PathClass, Taxonomy};

/// Where to attach an object: the implicit root or an attached object.
#[derive(Clone, Copy)]
pub enum Parent<'a> {
    Root,
    Object(&'a dyn PathObjectLike),
}

impl<'a, T: PathObjectLike> From<&'a T> for Parent<'a> {
    fn from(object: &'a T) -> Self {
        Parent::Object(object)
    }
}

/// A structural change, delivered to listeners after it is committed.
#[derive(Clone, Debug, PartialEq)]
pub enum HierarchyEvent {
    /// Objects were inserted (one event per `insert` or bulk import).
    Added(Vec<PathObject>),
    /// Objects were removed, including cascaded descendants.
    Removed(Vec<PathObject>),
    /// An object moved to a new parent.
    Reparented(PathObject),
    /// Every object was removed.
    Cleared,
}

/// Handle returned by [`Hierarchy::add_listener`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn Fn(&HierarchyEvent)>;

/// The annotation/detection tree of one image. Cloning shares the same tree
/// and the same listeners.
#[derive(Clone)]
pub struct Hierarchy {
    inner: Rc<HierarchyInner>,
}

struct HierarchyInner {
    taxonomy: Taxonomy,
    handle: ForeignRef,
    listeners: RefCell<Vec<(ListenerId, Listener)>>,
    next_listener: Cell<u64>,
}

fn integrity(message: impl Into<String>) -> PathMirrorError {
    PathMirrorError::integrity(message)
}

impl Hierarchy {
    /// Creates an empty, standalone hierarchy.
    pub fn new(taxonomy: &Taxonomy) -> Result<Self, PathMirrorError> {
        let handle = taxonomy.session().construct(classes::HIERARCHY, &[])?;
        Ok(Self::from_handle(taxonomy, handle))
    }

    pub(crate) fn from_handle(taxonomy: &Taxonomy, handle: ForeignRef) -> Self {
        Self {
            inner: Rc::new(HierarchyInner {
                taxonomy: taxonomy.clone(),
                handle,
                listeners: RefCell::new(Vec::new()),
                next_listener: Cell::new(0),
            }),
        }
    }

    pub(crate) fn handle(&self) -> ForeignRef {
        self.inner.handle
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.inner.taxonomy
    }

    fn session(&self) -> &Session {
        self.inner.taxonomy.session()
    }

    fn root(&self) -> Result<ForeignRef, PathMirrorError> {
        self.session()
            .call(self.inner.handle, "getRootObject", &[])?
            .as_ref("PathObjectHierarchy.getRootObject")
    }

    fn children_of(&self, node: ForeignRef) -> Result<Vec<ForeignRef>, PathMirrorError> {
        self.session()
            .call(node, "getChildObjects", &[])?
            .as_list("PathObject.getChildObjects")?
            .iter()
            .map(|v| v.as_ref("PathObject.getChildObjects"))
            .collect()
    }

    fn parent_of(&self, node: ForeignRef) -> Result<Option<ForeignRef>, PathMirrorError> {
        self.session()
            .call(node, "getParent", &[])?
            .as_opt_ref("PathObject.getParent")
    }

    fn wrap(&self, handle: ForeignRef) -> Result<PathObject, PathMirrorError> {
        PathObject::from_foreign(&self.inner.taxonomy, handle)
    }

    /// Every object below `node` in pre-order, excluding `node`.
    fn descendants(&self, node: ForeignRef) -> Result<Vec<ForeignRef>, PathMirrorError> {
        let mut out = Vec::new();
        let mut stack: Vec<ForeignRef> = self.children_of(node)?.into_iter().rev().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children_of(current)?.into_iter().rev());
        }
        Ok(out)
    }

    fn contains_handle(&self, handle: ForeignRef) -> Result<bool, PathMirrorError> {
        if self.session().is_retired(handle) {
            return Ok(false);
        }
        let root = self.root()?;
        let mut current = handle;
        while let Some(parent) = self.parent_of(current)? {
            if parent == root {
                return Ok(true);
            }
            current = parent;
        }
        Ok(false)
    }

    fn ensure_same_taxonomy(&self, object: &dyn PathObjectLike) -> Result<(), PathMirrorError> {
        if object.core().taxonomy().same_as(&self.inner.taxonomy) {
            Ok(())
        } else {
            Err(integrity(
                "object was created against a different taxonomy than this hierarchy",
            ))
        }
    }

    fn ensure_attached(&self, object: &dyn PathObjectLike) -> Result<ForeignRef, PathMirrorError> {
        self.ensure_same_taxonomy(object)?;
        let handle = object.core().handle();
        if self.contains_handle(handle)? {
            Ok(handle)
        } else {
            Err(integrity(format!(
                "{} {} is not attached to this hierarchy",
                object.kind(),
                handle
            )))
        }
    }

    fn ensure_detached(&self, object: &dyn PathObjectLike) -> Result<(), PathMirrorError> {
        self.ensure_same_taxonomy(object)?;
        let handle = object.core().handle();
        match object.lifecycle()? {
            Lifecycle::Detached => Ok(()),
            Lifecycle::Attached => Err(integrity(format!(
                "{} {} is already attached to a hierarchy",
                object.kind(),
                handle
            ))),
            Lifecycle::Removed => Err(integrity(format!(
                "{} {} was removed and cannot be inserted again",
                object.kind(),
                handle
            ))),
        }
    }

    /// Resolves a parent for queries: the root, or an attached object.
    fn locate(&self, parent: Parent<'_>) -> Result<ForeignRef, PathMirrorError> {
        match parent {
            Parent::Root => self.root(),
            Parent::Object(object) => self.ensure_attached(object),
        }
    }

    /// Resolves a parent that is about to receive children.
    fn locate_container(&self, parent: Parent<'_>) -> Result<ForeignRef, PathMirrorError> {
        if let Parent::Object(object) = parent {
            if object.kind().is_leaf() {
                return Err(integrity(format!(
                    "a {} cannot have children",
                    object.kind()
                )));
            }
        }
        self.locate(parent)
    }

    fn commit(&self, event: HierarchyEvent) {
        self.inner.taxonomy.revision().bump();
        for (_, listener) in self.inner.listeners.borrow().iter() {
            listener(&event);
        }
    }

    /// Inserts a detached object under `parent`.
    ///
    /// # Errors
    /// `HierarchyIntegrity` if the object is attached or removed, if the
    /// parent is not attached to this hierarchy, or if the parent is a
    /// detection or tile.
    pub fn insert<'a>(
        &self,
        object: &impl PathObjectLike,
        parent: impl Into<Parent<'a>>,
    ) -> Result<(), PathMirrorError> {
        self.ensure_detached(object)?;
        let parent = self.locate_container(parent.into())?;
        let handle = object.core().handle();
        self.session()
            .call(parent, "addChildObject", &[handle.into()])?;
        self.commit(HierarchyEvent::Added(vec![PathObject::from_like(object)]));
        Ok(())
    }

    /// Inserts many detached objects under `parent` in one step.
    ///
    /// Every object is validated before anything is attached, and the
    /// foreign runtime receives a single bulk call, so observers see either
    /// all of the objects or none of them. Listeners get one `Added` event.
    pub fn insert_all<'a, I>(
        &self,
        objects: I,
        parent: impl Into<Parent<'a>>,
    ) -> Result<(), PathMirrorError>
    where
        I: IntoIterator,
        I::Item: Into<PathObject>,
    {
        let objects: Vec<PathObject> = objects.into_iter().map(Into::into).collect();
        let mut seen = HashSet::new();
        for object in &objects {
            self.ensure_detached(object)?;
            if !seen.insert(object.handle()) {
                return Err(integrity(format!(
                    "{} {} is listed more than once",
                    object.kind(),
                    object.handle()
                )));
            }
        }
        let parent = self.locate_container(parent.into())?;
        if objects.is_empty() {
            return Ok(());
        }

        let refs = objects.iter().map(|o| Value::Ref(o.handle())).collect();
        self.session().call(
            self.inner.handle,
            "addObjects",
            &[Value::List(refs), parent.into()],
        )?;
        debug!(count = objects.len(), "objects added to hierarchy");
        self.commit(HierarchyEvent::Added(objects));
        Ok(())
    }

    /// Moves an attached object (with its subtree) under `new_parent`.
    ///
    /// # Errors
    /// `HierarchyIntegrity` if `new_parent` is the object itself or one of
    /// its descendants, or is not attached to this hierarchy.
    pub fn reparent<'a>(
        &self,
        object: &impl PathObjectLike,
        new_parent: impl Into<Parent<'a>>,
    ) -> Result<(), PathMirrorError> {
        let handle = self.ensure_attached(object)?;
        let parent = self.locate_container(new_parent.into())?;

        let mut ancestor = Some(parent);
        while let Some(current) = ancestor {
            if current == handle {
                return Err(integrity(format!(
                    "moving {} under {} would make it its own ancestor",
                    handle, parent
                )));
            }
            ancestor = self.parent_of(current)?;
        }

        self.session()
            .call(parent, "addChildObject", &[handle.into()])?;
        self.commit(HierarchyEvent::Reparented(PathObject::from_like(object)));
        Ok(())
    }

    /// Removes an attached object.
    ///
    /// With `cascade` the whole subtree is removed; otherwise the children
    /// move to the object's former parent. Returns the removed objects.
    /// Removed objects are terminal and cannot be inserted again.
    pub fn remove(
        &self,
        object: &impl PathObjectLike,
        cascade: bool,
    ) -> Result<Vec<PathObject>, PathMirrorError> {
        let handle = self.ensure_attached(object)?;
        let parent = self
            .parent_of(handle)?
            .ok_or_else(|| integrity(format!("{} has no parent", handle)))?;

        let mut removed = vec![handle];
        let orphans = if cascade {
            removed.extend(self.descendants(handle)?);
            Vec::new()
        } else {
            self.children_of(handle)?
        };
        let wrapped = removed
            .iter()
            .map(|h| self.wrap(*h))
            .collect::<Result<Vec<_>, _>>()?;

        if !orphans.is_empty() {
            let refs = orphans.into_iter().map(Value::Ref).collect();
            self.session()
                .call(parent, "addChildObjects", &[Value::List(refs)])?;
        }
        self.session()
            .call(parent, "removeChildObject", &[handle.into()])?;
        self.session().retire(removed);
        self.commit(HierarchyEvent::Removed(wrapped.clone()));
        Ok(wrapped)
    }

    /// Removes every object.
    pub fn clear(&self) -> Result<(), PathMirrorError> {
        let root = self.root()?;
        let top_level = self.children_of(root)?;
        if top_level.is_empty() {
            return Ok(());
        }
        let mut removed = Vec::new();
        for child in top_level {
            removed.push(child);
            removed.extend(self.descendants(child)?);
            self.session()
                .call(root, "removeChildObject", &[child.into()])?;
        }
        self.session().retire(removed);
        self.commit(HierarchyEvent::Cleared);
        Ok(())
    }

    /// Every object in depth-first pre-order.
    pub fn objects(&self) -> Result<Vec<PathObject>, PathMirrorError> {
        self.descendants(self.root()?)?
            .into_iter()
            .map(|h| self.wrap(h))
            .collect()
    }

    pub fn annotations(&self) -> Result<Vec<Annotation>, PathMirrorError> {
        Ok(self
            .objects()?
            .into_iter()
            .filter_map(|o| match o {
                PathObject::Annotation(a) => Some(a),
                _ => None,
            })
            .collect())
    }

    /// Detections, not including tiles.
    pub fn detections(&self) -> Result<Vec<Detection>, PathMirrorError> {
        Ok(self
            .objects()?
            .into_iter()
            .filter_map(|o| match o {
                PathObject::Detection(d) => Some(d),
                _ => None,
            })
            .collect())
    }

    pub fn tiles(&self) -> Result<Vec<Tile>, PathMirrorError> {
        Ok(self
            .objects()?
            .into_iter()
            .filter_map(|o| match o {
                PathObject::Tile(t) => Some(t),
                _ => None,
            })
            .collect())
    }

    pub fn tma_cores(&self) -> Result<Vec<TmaCore>, PathMirrorError> {
        Ok(self
            .objects()?
            .into_iter()
            .filter_map(|o| match o {
                PathObject::TmaCore(c) => Some(c),
                _ => None,
            })
            .collect())
    }

    /// Direct children of `of`, in insertion order.
    pub fn children<'a>(
        &self,
        of: impl Into<Parent<'a>>,
    ) -> Result<Vec<PathObject>, PathMirrorError> {
        let node = self.locate(of.into())?;
        self.children_of(node)?
            .into_iter()
            .map(|h| self.wrap(h))
            .collect()
    }

    /// The parent of an attached object; `None` for top-level objects.
    pub fn parent(
        &self,
        of: &impl PathObjectLike,
    ) -> Result<Option<PathObject>, PathMirrorError> {
        let handle = self.ensure_attached(of)?;
        let root = self.root()?;
        match self.parent_of(handle)? {
            Some(parent) if parent != root => self.wrap(parent).map(Some),
            _ => Ok(None),
        }
    }

    /// Returns true if `object` is attached to this hierarchy.
    pub fn contains(&self, object: &impl PathObjectLike) -> Result<bool, PathMirrorError> {
        if !object.core().taxonomy().same_as(&self.inner.taxonomy) {
            return Ok(false);
        }
        self.contains_handle(object.core().handle())
    }

    pub fn len(&self) -> Result<usize, PathMirrorError> {
        Ok(self.descendants(self.root()?)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, PathMirrorError> {
        Ok(self.children_of(self.root()?)?.is_empty())
    }

    /// Objects whose ROI lies on `plane`.
    pub fn objects_in_plane(&self, plane: ImagePlane) -> Result<Vec<PathObject>, PathMirrorError> {
        let mut out = Vec::new();
        for object in self.objects()? {
            if object.roi()?.plane() == plane {
                out.push(object);
            }
        }
        Ok(out)
    }

    /// Objects whose ROI intersects `geometry`, on any plane.
    ///
    /// `geometry` is in full-resolution pixel coordinates, like stored ROIs;
    /// no calibration is applied.
    pub fn objects_intersecting(
        &self,
        geometry: &Geometry,
    ) -> Result<Vec<PathObject>, PathMirrorError> {
        let mut out = Vec::new();
        for object in self.objects()? {
            if object.roi()?.geometry().intersects(geometry) {
                out.push(object);
            }
        }
        Ok(out)
    }

    fn add_new<T, F>(
        &self,
        create: F,
        roi: &Roi,
        class: Option<&PathClass>,
        parent: Parent<'_>,
    ) -> Result<T, PathMirrorError>
    where
        T: PathObjectLike,
        F: FnOnce(&Taxonomy, &Roi) -> Result<T, PathMirrorError>,
    {
        self.locate_container(parent)?;
        let object = create(&self.inner.taxonomy, roi)?;
        if class.is_some() {
            object.set_path_class(class)?;
        }
        self.insert(&object, parent)?;
        Ok(object)
    }

    /// Creates an annotation and inserts it under `parent`.
    pub fn add_annotation<'a>(
        &self,
        roi: &Roi,
        class: Option<&PathClass>,
        parent: impl Into<Parent<'a>>,
    ) -> Result<Annotation, PathMirrorError> {
        self.add_new(Annotation::new, roi, class, parent.into())
    }

    /// Creates a detection and inserts it under `parent`.
    pub fn add_detection<'a>(
        &self,
        roi: &Roi,
        class: Option<&PathClass>,
        parent: impl Into<Parent<'a>>,
    ) -> Result<Detection, PathMirrorError> {
        self.add_new(Detection::new, roi, class, parent.into())
    }

    /// Creates a tile and inserts it under `parent`.
    pub fn add_tile<'a>(
        &self,
        roi: &Roi,
        class: Option<&PathClass>,
        parent: impl Into<Parent<'a>>,
    ) -> Result<Tile, PathMirrorError> {
        self.add_new(Tile::new, roi, class, parent.into())
    }

    /// Registers a callback invoked after every committed structural change.
    ///
    /// Listeners must not add or remove listeners from within the callback.
    pub fn add_listener(&self, listener: impl Fn(&HierarchyEvent) + 'static) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.get());
        self.inner.next_listener.set(id.0 + 1);
        self.inner
            .listeners
            .borrow_mut()
            .push((id, Box::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(l, _)| *l != id);
        listeners.len() != before
    }

    /// Checks the tree invariants and reports every violation found.
    pub fn check_integrity(&self) -> Result<IntegrityReport, PathMirrorError> {
        integrity::check(self)
    }

    /// Drops every reference to a tombstoned class. Returns how many
    /// objects were affected.
    pub(crate) fn sweep_tombstoned(&self) -> Result<usize, PathMirrorError> {
        let mut swept = 0;
        for object in self.objects()? {
            let class = object
                .core()
                .get("getPathClass")?
                .as_opt_ref("PathObject.getPathClass")?;
            if class.is_some_and(|h| self.inner.taxonomy.tombstoned(h).is_some()) {
                // reading drops the reference and logs it
                object.path_class()?;
                swept += 1;
            }
        }
        Ok(swept)
    }

    /// Asks the foreign runtime to serialize the tree to `path`.
    pub(crate) fn write_to(&self, path: &Path) -> Result<(), PathMirrorError> {
        let path = path.to_string_lossy().into_owned();
        self.session()
            .call(self.inner.handle, "writeHierarchy", &[path.into()])?;
        Ok(())
    }

    /// Replaces the tree with the one serialized at `path`.
    pub(crate) fn read_from(&self, path: &Path) -> Result<(), PathMirrorError> {
        let path = path.to_string_lossy().into_owned();
        self.session()
            .call(self.inner.handle, "readHierarchy", &[path.into()])?;
        Ok(())
    }
}

impl fmt::Debug for Hierarchy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hierarchy")
            .field("handle", &self.inner.handle)
            .field("len", &self.len().ok())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::memory::InMemoryRuntime;
    use crate::bridge::Bridge;
    use crate::geometry::Polygon;
    use std::cell::RefCell;

    fn hierarchy() -> Hierarchy {
        let session = Session::in_memory().unwrap();
        Hierarchy::new(&Taxonomy::new(&session)).unwrap()
    }

    fn square(x: f64) -> Roi {
        Roi::new(
            Polygon::from_bounds(x, 0.0, x + 5.0, 5.0).into(),
            ImagePlane::default(),
        )
    }

    fn annotations(h: &Hierarchy, n: usize) -> Vec<Annotation> {
        (0..n)
            .map(|i| Annotation::new(h.taxonomy(), &square(10.0 * i as f64)).unwrap())
            .collect()
    }

    #[test]
    fn test_initial_state() {
        let h = hierarchy();
        assert!(h.is_empty().unwrap());
        assert_eq!(h.len().unwrap(), 0);
        assert!(h.objects().unwrap().is_empty());
    }

    #[test]
    fn test_insert_and_query() {
        let h = hierarchy();
        let items = annotations(&h, 10);
        h.insert_all(items.clone(), Parent::Root).unwrap();
        assert_eq!(h.len().unwrap(), 10);
        assert!(h.contains(&items[3]).unwrap());
        assert_eq!(items[3].lifecycle().unwrap(), Lifecycle::Attached);

        h.remove(&items[7], true).unwrap();
        assert_eq!(h.len().unwrap(), 9);
        assert!(!h.contains(&items[7]).unwrap());
    }

    #[test]
    fn test_annotations_detections_separation() {
        let h = hierarchy();
        h.insert_all(annotations(&h, 5), Parent::Root).unwrap();
        for i in 0..7 {
            h.add_detection(&square(i as f64), None, Parent::Root).unwrap();
        }
        h.add_tile(&square(0.0), None, Parent::Root).unwrap();
        assert_eq!(h.annotations().unwrap().len(), 5);
        assert_eq!(h.detections().unwrap().len(), 7);
        assert_eq!(h.tiles().unwrap().len(), 1);
        assert!(h.tma_cores().unwrap().is_empty());
    }

    #[test]
    fn test_insert_rejects_attached_and_removed() {
        let h = hierarchy();
        let a = h.add_annotation(&square(0.0), None, Parent::Root).unwrap();
        let err = h.insert(&a, Parent::Root).unwrap_err();
        assert!(matches!(err, PathMirrorError::HierarchyIntegrity(_)));

        h.remove(&a, true).unwrap();
        assert_eq!(a.lifecycle().unwrap(), Lifecycle::Removed);
        let err = h.insert(&a, Parent::Root).unwrap_err();
        assert!(matches!(err, PathMirrorError::HierarchyIntegrity(_)));
    }

    #[test]
    fn test_insert_rejects_leaf_and_foreign_parents() {
        let h = hierarchy();
        let detection = h.add_detection(&square(0.0), None, Parent::Root).unwrap();
        let child = Annotation::new(h.taxonomy(), &square(1.0)).unwrap();
        assert!(h.insert(&child, &detection).is_err());

        let detached_parent = Annotation::new(h.taxonomy(), &square(2.0)).unwrap();
        assert!(h.insert(&child, &detached_parent).is_err());

        let other = Hierarchy::new(h.taxonomy()).unwrap();
        let elsewhere = other.add_annotation(&square(3.0), None, Parent::Root).unwrap();
        assert!(h.insert(&child, &elsewhere).is_err());

        assert_eq!(child.lifecycle().unwrap(), Lifecycle::Detached);
        assert_eq!(h.len().unwrap(), 1);
    }

    #[test]
    fn test_insert_all_is_atomic() {
        let h = hierarchy();
        let attached = h.add_annotation(&square(0.0), None, Parent::Root).unwrap();
        let mut batch = annotations(&h, 3);
        batch.push(attached);

        let err = h.insert_all(batch.clone(), Parent::Root).unwrap_err();
        assert!(matches!(err, PathMirrorError::HierarchyIntegrity(_)));
        assert_eq!(h.len().unwrap(), 1);
        assert!(batch[..3]
            .iter()
            .all(|a| a.lifecycle().unwrap() == Lifecycle::Detached));

        let dup = annotations(&h, 1);
        let err = h
            .insert_all([dup[0].clone(), dup[0].clone()], Parent::Root)
            .unwrap_err();
        assert!(matches!(err, PathMirrorError::HierarchyIntegrity(_)));
    }

    #[test]
    fn test_reparent_to_descendant_is_rejected() {
        let h = hierarchy();
        let x = h.add_annotation(&square(0.0), None, Parent::Root).unwrap();
        let y = h.add_annotation(&square(0.0), None, &x).unwrap();
        let z = h.add_annotation(&square(0.0), None, &y).unwrap();
        let before: Vec<_> = h.objects().unwrap();

        for target in [&x, &z] {
            let err = h.reparent(&x, target).unwrap_err();
            assert!(matches!(err, PathMirrorError::HierarchyIntegrity(_)));
        }
        assert_eq!(h.objects().unwrap(), before);
        assert_eq!(h.parent(&z).unwrap(), Some(PathObject::Annotation(y.clone())));

        h.reparent(&z, Parent::Root).unwrap();
        assert_eq!(h.parent(&z).unwrap(), None);
    }

    #[test]
    fn test_remove_without_cascade_keeps_children() {
        let h = hierarchy();
        let top = h.add_annotation(&square(0.0), None, Parent::Root).unwrap();
        let middle = h.add_annotation(&square(0.0), None, &top).unwrap();
        let leaf_a = h.add_detection(&square(1.0), None, &middle).unwrap();
        let leaf_b = h.add_detection(&square(2.0), None, &middle).unwrap();

        let removed = h.remove(&middle, false).unwrap();
        assert_eq!(removed, vec![PathObject::Annotation(middle)]);
        assert_eq!(
            h.children(&top).unwrap(),
            vec![PathObject::Detection(leaf_a), PathObject::Detection(leaf_b)]
        );
        assert_eq!(h.len().unwrap(), 3);
    }

    #[test]
    fn test_remove_with_cascade_removes_subtree() {
        let h = hierarchy();
        let top = h.add_annotation(&square(0.0), None, Parent::Root).unwrap();
        let middle = h.add_annotation(&square(0.0), None, &top).unwrap();
        let leaf = h.add_detection(&square(1.0), None, &middle).unwrap();
        let sibling = h.add_annotation(&square(20.0), None, Parent::Root).unwrap();

        let removed = h.remove(&top, true).unwrap();
        assert_eq!(removed.len(), 3);
        assert_eq!(leaf.lifecycle().unwrap(), Lifecycle::Removed);
        assert_eq!(h.objects().unwrap(), vec![PathObject::Annotation(sibling)]);
    }

    #[test]
    fn test_failed_remove_changes_nothing() {
        let h = hierarchy();
        let top = h.add_annotation(&square(0.0), None, Parent::Root).unwrap();
        let child = h.add_annotation(&square(1.0), None, &top).unwrap();
        // a node that cannot be wrapped as a path object
        let junk = h.session().construct(classes::HIERARCHY, &[]).unwrap();
        h.session()
            .call(child.core().handle(), "addChildObject", &[junk.into()])
            .unwrap();
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        h.add_listener(move |e| sink.borrow_mut().push(e.clone()));
        let before = h.len().unwrap();

        assert!(h.remove(&top, true).is_err());
        assert_eq!(h.len().unwrap(), before);
        assert_eq!(top.lifecycle().unwrap(), Lifecycle::Attached);
        assert_eq!(h.parent(&child).unwrap(), Some(PathObject::Annotation(top)));
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn test_listeners_see_one_event_per_bulk_insert() {
        let h = hierarchy();
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        let id = h.add_listener(move |e| sink.borrow_mut().push(e.clone()));

        h.insert_all(annotations(&h, 4), Parent::Root).unwrap();
        assert_eq!(events.borrow().len(), 1);
        assert!(matches!(&events.borrow()[0], HierarchyEvent::Added(v) if v.len() == 4));

        h.clear().unwrap();
        assert_eq!(events.borrow().last(), Some(&HierarchyEvent::Cleared));

        assert!(h.remove_listener(id));
        h.add_annotation(&square(0.0), None, Parent::Root).unwrap();
        assert_eq!(events.borrow().len(), 2);
    }

    #[test]
    fn test_spatial_queries() {
        let h = hierarchy();
        let near = h.add_annotation(&square(0.0), None, Parent::Root).unwrap();
        h.add_annotation(&square(100.0), None, Parent::Root).unwrap();
        let other_plane = Roi::new(
            Polygon::from_bounds(0.0, 0.0, 5.0, 5.0).into(),
            ImagePlane::new(3, 0),
        );
        let deep = h.add_annotation(&other_plane, None, Parent::Root).unwrap();

        let point = Geometry::point(2.0, 2.0);
        assert_eq!(
            h.objects_intersecting(&point).unwrap(),
            vec![PathObject::Annotation(near), PathObject::Annotation(deep.clone())]
        );
        assert_eq!(
            h.objects_in_plane(ImagePlane::new(3, 0)).unwrap(),
            vec![PathObject::Annotation(deep)]
        );
        assert_eq!(h.objects_in_plane(ImagePlane::default()).unwrap().len(), 2);
    }

    #[test]
    fn test_sweep_tombstoned() {
        let h = hierarchy();
        let tumor = h.taxonomy().parse("Tumor").unwrap();
        let stroma = h.taxonomy().parse("Stroma").unwrap();
        h.add_annotation(&square(0.0), Some(&tumor), Parent::Root).unwrap();
        let kept = h.add_annotation(&square(10.0), Some(&stroma), Parent::Root).unwrap();

        h.taxonomy().remove(&tumor);
        assert_eq!(h.sweep_tombstoned().unwrap(), 1);
        assert_eq!(h.sweep_tombstoned().unwrap(), 0);
        assert_eq!(kept.path_class().unwrap(), Some(stroma));
    }

    /// The in-memory runtime, recording every released handle.
    struct Recording {
        runtime: InMemoryRuntime,
        released: Rc<RefCell<Vec<ForeignRef>>>,
    }

    impl Bridge for Recording {
        fn start(&mut self) -> Result<(), PathMirrorError> {
            self.runtime.start()
        }

        fn stop(&mut self) {
            self.runtime.stop()
        }

        fn exclusive(&self) -> bool {
            false
        }

        fn construct(&mut self, class: &str, args: &[Value]) -> Result<ForeignRef, PathMirrorError> {
            self.runtime.construct(class, args)
        }

        fn call(
            &mut self,
            object: ForeignRef,
            method: &str,
            args: &[Value],
        ) -> Result<Value, PathMirrorError> {
            self.runtime.call(object, method, args)
        }

        fn is_instance(&self, object: ForeignRef, class: &str) -> Result<bool, PathMirrorError> {
            self.runtime.is_instance(object, class)
        }

        fn release(&mut self, objects: &[ForeignRef]) {
            self.released.borrow_mut().extend_from_slice(objects);
            self.runtime.release(objects);
        }
    }

    #[test]
    fn test_removed_objects_are_released_when_unheld() {
        let released = Rc::new(RefCell::new(Vec::new()));
        let session = Session::start(Recording {
            runtime: InMemoryRuntime::new(),
            released: released.clone(),
        })
        .unwrap();
        let h = Hierarchy::new(&Taxonomy::new(&session)).unwrap();
        let top = h.add_annotation(&square(0.0), None, Parent::Root).unwrap();
        let leaf = h.add_detection(&square(1.0), None, &top).unwrap();
        let kept = h.add_annotation(&square(20.0), None, Parent::Root).unwrap();
        let (top_handle, kept_handle) = (top.core().handle(), kept.core().handle());

        let removed = h.remove(&top, true).unwrap();
        drop(removed);
        assert!(released.borrow().is_empty());
        drop(top);
        assert_eq!(*released.borrow(), vec![top_handle]);

        // the leaf is still readable while held
        assert_eq!(leaf.lifecycle().unwrap(), Lifecycle::Removed);
        assert!(leaf.roi().is_ok());
        drop(leaf);
        assert_eq!(released.borrow().len(), 2);

        drop(kept);
        h.clear().unwrap();
        assert_eq!(released.borrow().last(), Some(&kept_handle));
        assert!(h.is_empty().unwrap());
    }

    #[test]
    fn test_closed_session_fails_cleanly() {
        let h = hierarchy();
        let a = h.add_annotation(&square(0.0), None, Parent::Root).unwrap();
        h.taxonomy().session().close();
        assert!(matches!(
            h.len().unwrap_err(),
            PathMirrorError::BridgeUnavailable(_)
        ));
        assert!(matches!(
            a.roi().unwrap_err(),
            PathMirrorError::BridgeUnavailable(_)
        ));
    }
}
