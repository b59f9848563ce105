//! The classification taxonomy: named, colored labels with name-path identity.
//!
//! A [`Taxonomy`] is shared by reference between a project, its entries and
//! their hierarchies. Every class it hands out is backed by exactly one
//! foreign `PathClass` object per name path, so two [`PathClass`] handles
//! obtained independently for the same path compare equal and observe each
//! other's color changes.
//!
//! Removing a class tombstones it together with every derived class.
//! Objects that still reference a tombstoned class lose the reference the
//! next time it is read, or when the owning project is saved; a warning is
//! logged each time this happens.

mod color;
mod path;

pub use color::Rgb;
pub use path::{ClassPath, SEPARATOR};

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use tracing::debug;

use crate::bridge::{classes, ForeignRef, Session, Value};
use crate::error::PathMirrorError;
use crate::revision::Revision;

/// A classification label.
///
/// Equality and hashing use the full name path only.
#[derive(Clone)]
pub struct PathClass {
    path: ClassPath,
    handle: ForeignRef,
    session: Session,
}

impl PathClass {
    pub fn path(&self) -> &ClassPath {
        &self.path
    }

    /// The innermost name, e.g. `Positive` for `Tumor: Positive`.
    pub fn name(&self) -> &str {
        self.path.name()
    }

    /// The class this one is derived from, if any.
    pub fn parent(&self) -> Result<Option<PathClass>, PathMirrorError> {
        let Some(parent_path) = self.path.parent() else {
            return Ok(None);
        };
        let handle = self
            .session
            .call(self.handle, "getParent", &[])?
            .as_opt_ref("PathClass.getParent")?;
        Ok(handle.map(|handle| PathClass {
            path: parent_path,
            handle,
            session: self.session.clone(),
        }))
    }

    /// The current display color, read from the foreign class.
    pub fn color(&self) -> Result<Rgb, PathMirrorError> {
        let packed = self
            .session
            .call(self.handle, "getColor", &[])?
            .as_i64("PathClass.getColor")?;
        Ok(Rgb::from_packed(packed as i32))
    }

    pub(crate) fn handle(&self) -> ForeignRef {
        self.handle
    }
}

impl PartialEq for PathClass {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for PathClass {}

impl Hash for PathClass {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl fmt::Debug for PathClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PathClass({:?})", self.path.to_string())
    }
}

impl fmt::Display for PathClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.path, f)
    }
}

/// A shared classification taxonomy. Cloning shares the same taxonomy.
#[derive(Clone)]
pub struct Taxonomy {
    inner: Rc<TaxonomyInner>,
}

struct TaxonomyInner {
    session: Session,
    revision: Revision,
    by_path: RefCell<BTreeMap<ClassPath, ForeignRef>>,
    by_handle: RefCell<HashMap<ForeignRef, ClassPath>>,
    /// Handles of removed classes, with the path they had.
    tombstones: RefCell<HashMap<ForeignRef, ClassPath>>,
}

impl Taxonomy {
    /// Creates an empty taxonomy with its own change tracker.
    pub fn new(session: &Session) -> Self {
        Self::with_revision(session, Revision::new())
    }

    pub(crate) fn with_revision(session: &Session, revision: Revision) -> Self {
        Self {
            inner: Rc::new(TaxonomyInner {
                session: session.clone(),
                revision,
                by_path: RefCell::new(BTreeMap::new()),
                by_handle: RefCell::new(HashMap::new()),
                tombstones: RefCell::new(HashMap::new()),
            }),
        }
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    pub(crate) fn revision(&self) -> &Revision {
        &self.inner.revision
    }

    /// Returns true if both handles refer to the same taxonomy.
    pub fn same_as(&self, other: &Taxonomy) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn class(&self, path: ClassPath, handle: ForeignRef) -> PathClass {
        PathClass {
            path,
            handle,
            session: self.inner.session.clone(),
        }
    }

    /// Returns the class for `names`, creating it and any missing ancestors.
    ///
    /// # Errors
    /// `InvalidClassName` for empty names or names containing `:`.
    pub fn get_or_create<I>(&self, names: I) -> Result<PathClass, PathMirrorError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.get_or_create_path(&ClassPath::new(names)?)
    }

    /// Parses a derived name such as `"Tumor: Positive"` and returns its class.
    pub fn parse(&self, name: &str) -> Result<PathClass, PathMirrorError> {
        self.get_or_create_path(&ClassPath::parse(name)?)
    }

    pub fn get_or_create_path(&self, path: &ClassPath) -> Result<PathClass, PathMirrorError> {
        if let Some(existing) = self.get(path) {
            return Ok(existing);
        }

        let parent = path
            .parent()
            .map(|p| self.get_or_create_path(&p))
            .transpose()?;
        let color = match &parent {
            Some(parent) => parent.color()?,
            None => Rgb::for_name(path.name()),
        };
        let handle = self.inner.session.construct(
            classes::PATH_CLASS,
            &[
                path.name().into(),
                parent.as_ref().map(PathClass::handle).into(),
                Value::Int(color.to_packed().into()),
            ],
        )?;

        self.inner.by_path.borrow_mut().insert(path.clone(), handle);
        self.inner.by_handle.borrow_mut().insert(handle, path.clone());
        self.inner.revision.bump();
        debug!(class = %path, "classification created");
        Ok(self.class(path.clone(), handle))
    }

    /// Returns the class for `path` if it exists.
    pub fn get(&self, path: &ClassPath) -> Option<PathClass> {
        let handle = *self.inner.by_path.borrow().get(path)?;
        Some(self.class(path.clone(), handle))
    }

    /// True if `class` is the live class of its path in this taxonomy.
    pub fn contains(&self, class: &PathClass) -> bool {
        self.inner.by_path.borrow().get(&class.path) == Some(&class.handle)
    }

    /// Every live class, ordered by name path.
    pub fn list(&self) -> Vec<PathClass> {
        self.inner
            .by_path
            .borrow()
            .iter()
            .map(|(path, handle)| self.class(path.clone(), *handle))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.by_path.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.by_path.borrow().is_empty()
    }

    fn ensure_live(&self, class: &PathClass) -> Result<(), PathMirrorError> {
        if self.contains(class) {
            Ok(())
        } else {
            Err(PathMirrorError::InvalidClassName {
                name: class.path.to_string(),
                reason: "class is not part of this taxonomy".to_string(),
            })
        }
    }

    /// Changes the display color. Derived classes keep their own colors.
    pub fn set_color(&self, class: &PathClass, color: Rgb) -> Result<(), PathMirrorError> {
        self.ensure_live(class)?;
        self.inner.session.call(
            class.handle,
            "setColor",
            &[Value::Int(color.to_packed().into())],
        )?;
        self.inner.revision.bump();
        Ok(())
    }

    /// Removes `class` and every class derived from it.
    ///
    /// Returns how many classes were tombstoned. Removing a class that is
    /// not (or no longer) in the taxonomy is a no-op.
    pub fn remove(&self, class: &PathClass) -> usize {
        if !self.contains(class) {
            return 0;
        }

        let doomed: Vec<(ClassPath, ForeignRef)> = self
            .inner
            .by_path
            .borrow()
            .range(class.path.clone()..)
            .take_while(|(path, _)| class.path.is_prefix_of(path))
            .map(|(path, handle)| (path.clone(), *handle))
            .collect();

        let mut by_path = self.inner.by_path.borrow_mut();
        let mut by_handle = self.inner.by_handle.borrow_mut();
        let mut tombstones = self.inner.tombstones.borrow_mut();
        for (path, handle) in &doomed {
            by_path.remove(path);
            by_handle.remove(handle);
            tombstones.insert(*handle, path.clone());
        }
        self.inner.revision.bump();
        debug!(class = %class.path, removed = doomed.len(), "classification removed");
        doomed.len()
    }

    /// Path of a tombstoned class handle.
    pub(crate) fn tombstoned(&self, handle: ForeignRef) -> Option<ClassPath> {
        self.inner.tombstones.borrow().get(&handle).cloned()
    }

    /// Maps a foreign class handle to its canonical class in this taxonomy.
    ///
    /// Foreign classes this taxonomy never created (for instance ones read
    /// back from disk) are matched by name path and registered if new,
    /// keeping their color.
    pub(crate) fn resolve(&self, handle: ForeignRef) -> Result<PathClass, PathMirrorError> {
        if let Some(path) = self.inner.by_handle.borrow().get(&handle) {
            return Ok(self.class(path.clone(), handle));
        }

        let mut names = Vec::new();
        let mut current = Some(handle);
        while let Some(h) = current {
            let name = self.inner.session.call(h, "getName", &[])?;
            names.push(name.as_str("PathClass.getName")?.to_string());
            current = self
                .inner
                .session
                .call(h, "getParent", &[])?
                .as_opt_ref("PathClass.getParent")?;
        }
        names.reverse();
        let path = ClassPath::new(names)?;
        if let Some(existing) = self.get(&path) {
            return Ok(existing);
        }

        let color = self
            .inner
            .session
            .call(handle, "getColor", &[])?
            .as_i64("PathClass.getColor")?;
        let class = self.get_or_create_path(&path)?;
        self.set_color(&class, Rgb::from_packed(color as i32))?;
        Ok(class)
    }

    /// `(path, color)` of every live class, for the manifest.
    pub(crate) fn entries(&self) -> Result<Vec<(ClassPath, Rgb)>, PathMirrorError> {
        self.list()
            .into_iter()
            .map(|class| Ok((class.path.clone(), class.color()?)))
            .collect()
    }

    /// Recreates classes read from a manifest.
    pub(crate) fn restore(&self, entries: &[(ClassPath, Rgb)]) -> Result<(), PathMirrorError> {
        for (path, color) in entries {
            let class = self.get_or_create_path(path)?;
            self.set_color(&class, *color)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Taxonomy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.inner.by_path.borrow().keys().map(|p| p.to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taxonomy() -> Taxonomy {
        Taxonomy::new(&Session::in_memory().unwrap())
    }

    #[test]
    fn test_identity_by_name_path() {
        let tax = taxonomy();
        let a = tax.get_or_create(["Tumor", "Positive"]).unwrap();
        let b = tax.parse("Tumor: Positive").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.handle(), b.handle());
        assert_eq!(tax.len(), 2);

        tax.set_color(&b, Rgb::new(1, 2, 3)).unwrap();
        assert_eq!(a.color().unwrap(), Rgb::new(1, 2, 3));
    }

    #[test]
    fn test_derived_class_inherits_color() {
        let tax = taxonomy();
        let tumor = tax.parse("Tumor").unwrap();
        assert_eq!(tumor.color().unwrap(), Rgb::for_name("Tumor"));
        tax.set_color(&tumor, Rgb::new(200, 0, 0)).unwrap();

        let positive = tax.parse("Tumor: Positive").unwrap();
        assert_eq!(positive.color().unwrap(), Rgb::new(200, 0, 0));
        assert_eq!(positive.parent().unwrap(), Some(tumor));
    }

    #[test]
    fn test_remove_tombstones_descendants() {
        let tax = taxonomy();
        let tumor = tax.parse("Tumor").unwrap();
        let positive = tax.parse("Tumor: Positive").unwrap();
        let stroma = tax.parse("Stroma").unwrap();
        let tumoral = tax.parse("Tumoral").unwrap();

        assert_eq!(tax.remove(&tumor), 2);
        assert!(tax.get(tumor.path()).is_none());
        assert!(tax.get(positive.path()).is_none());
        assert!(tax.contains(&stroma));
        assert!(tax.contains(&tumoral));
        assert_eq!(tax.tombstoned(positive.handle()), Some(positive.path().clone()));

        // removed twice is a no-op
        assert_eq!(tax.remove(&tumor), 0);
        assert!(tax.set_color(&tumor, Rgb::new(0, 0, 0)).is_err());

        // recreating yields a fresh, live class
        let again = tax.parse("Tumor").unwrap();
        assert_ne!(again.handle(), tumor.handle());
        assert!(tax.contains(&again));
    }

    #[test]
    fn test_resolve_foreign_class_by_path() {
        let tax = taxonomy();
        let session = tax.session().clone();
        let foreign_parent = session
            .construct(
                classes::PATH_CLASS,
                &["Tumor".into(), Value::Null, Value::Int(-3670016)],
            )
            .unwrap();
        let foreign = session
            .construct(
                classes::PATH_CLASS,
                &["Positive".into(), foreign_parent.into(), Value::Int(-16711936)],
            )
            .unwrap();

        let class = tax.resolve(foreign).unwrap();
        assert_eq!(class.path(), &ClassPath::parse("Tumor: Positive").unwrap());
        assert_eq!(class.color().unwrap(), Rgb::new(0, 255, 0));
        assert_eq!(tax.resolve(foreign).unwrap().handle(), class.handle());
    }

    #[test]
    fn test_list_is_ordered() {
        let tax = taxonomy();
        tax.parse("Stroma").unwrap();
        tax.parse("Immune cells").unwrap();
        let names: Vec<String> = tax.list().iter().map(|c| c.to_string()).collect();
        assert_eq!(names, ["Immune cells", "Stroma"]);
    }

    #[test]
    fn test_revision_tracks_changes() {
        let tax = taxonomy();
        let before = tax.revision().current();
        let tumor = tax.parse("Tumor").unwrap();
        tax.parse("Tumor").unwrap();
        let after_create = tax.revision().current();
        assert!(after_create > before);
        tax.set_color(&tumor, Rgb::new(9, 9, 9)).unwrap();
        assert!(tax.revision().current() > after_create);
    }
}
