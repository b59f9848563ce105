//! Integrity report for a hierarchy.
//!
//! The hierarchy refuses operations that would break its invariants, but the
//! foreign runtime can still be handed a broken tree (a file written by
//! another tool, direct foreign calls). [`Hierarchy::check_integrity`] walks
//! the tree as stored and reports every violation it finds without changing
//! anything.

use std::collections::HashSet;
use std::fmt;

use super::Hierarchy;
use crate::bridge::ForeignRef;
use crate::error::PathMirrorError;
use crate::geometry::{BBox, Pixel};
use crate::objects::{ObjectKind, PathObject, PathObjectLike};
use crate::taxonomy::ClassPath;

/// Something wrong with one node of a stored tree.
///
/// Structural defects break the tree invariant (one parent chain per
/// object, leaves stay leaves). The rest are advisory: the tree is usable
/// but an object is unlikely to be what its author meant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Defect {
    /// `object` was reached a second time, through `via`. The tree is
    /// shared or cyclic there.
    Revisited { object: ForeignRef, via: ForeignRef },
    /// `object` is listed under `listed_under` but links to `parent`.
    ParentMismatch {
        object: ForeignRef,
        listed_under: ForeignRef,
        parent: Option<ForeignRef>,
    },
    /// A detection or tile with children.
    LeafWithChildren {
        object: ForeignRef,
        kind: ObjectKind,
        children: usize,
    },
    /// An object removed through this hierarchy is back in the tree.
    RemovedStillAttached { object: ForeignRef },
    /// A node that is not a path object at all.
    NotAPathObject { object: ForeignRef },

    /// The object's classification was removed from the taxonomy.
    RemovedClass { object: ForeignRef, class: ClassPath },
    /// The ROI is empty, or `reason` says why it could not be read.
    NoUsableRoi {
        object: ForeignRef,
        reason: Option<String>,
    },
    /// The object's bounds extend past those of `parent`.
    OutsideParent { object: ForeignRef, parent: ForeignRef },
}

impl Defect {
    /// The node the defect was found on.
    pub fn object(&self) -> ForeignRef {
        match self {
            Defect::Revisited { object, .. }
            | Defect::ParentMismatch { object, .. }
            | Defect::LeafWithChildren { object, .. }
            | Defect::RemovedStillAttached { object }
            | Defect::NotAPathObject { object }
            | Defect::RemovedClass { object, .. }
            | Defect::NoUsableRoi { object, .. }
            | Defect::OutsideParent { object, .. } => *object,
        }
    }

    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Defect::Revisited { .. }
                | Defect::ParentMismatch { .. }
                | Defect::LeafWithChildren { .. }
                | Defect::RemovedStillAttached { .. }
                | Defect::NotAPathObject { .. }
        )
    }
}

impl fmt::Display for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.object())?;
        match self {
            Defect::Revisited { via, .. } => write!(f, "reached again through {}", via),
            Defect::ParentMismatch {
                listed_under,
                parent,
                ..
            } => match parent {
                Some(parent) => write!(f, "listed under {} but linked to {}", listed_under, parent),
                None => write!(f, "listed under {} but has no parent", listed_under),
            },
            Defect::LeafWithChildren { kind, children, .. } => {
                write!(f, "{} has {} child(ren)", kind, children)
            }
            Defect::RemovedStillAttached { .. } => write!(f, "removed but still in the tree"),
            Defect::NotAPathObject { .. } => write!(f, "not a path object"),
            Defect::RemovedClass { class, .. } => {
                write!(f, "classified as removed class '{}'", class)
            }
            Defect::NoUsableRoi { reason: None, .. } => write!(f, "ROI is empty"),
            Defect::NoUsableRoi {
                reason: Some(reason),
                ..
            } => write!(f, "ROI cannot be read: {}", reason),
            Defect::OutsideParent { parent, .. } => {
                write!(f, "extends outside the bounds of {}", parent)
            }
        }
    }
}

/// Every defect found by [`Hierarchy::check_integrity`], in tree order.
#[derive(Clone, Debug, Default)]
pub struct IntegrityReport {
    defects: Vec<Defect>,
}

impl IntegrityReport {
    pub fn defects(&self) -> &[Defect] {
        &self.defects
    }

    /// True if no structural defect was found. Advisory ones may remain.
    pub fn is_sound(&self) -> bool {
        !self.defects.iter().any(Defect::is_structural)
    }

    pub fn is_clean(&self) -> bool {
        self.defects.is_empty()
    }

    /// Defects found on `object`.
    pub fn on(&self, object: ForeignRef) -> impl Iterator<Item = &Defect> {
        self.defects.iter().filter(move |d| d.object() == object)
    }
}

impl fmt::Display for IntegrityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.defects.is_empty() {
            return write!(f, "tree is intact");
        }
        let structural = self.defects.iter().filter(|d| d.is_structural()).count();
        write!(
            f,
            "{} structural and {} advisory defect(s)",
            structural,
            self.defects.len() - structural
        )?;
        for defect in &self.defects {
            write!(f, "\n  {}", defect)?;
        }
        Ok(())
    }
}

/// Walks the tree from the root, depth first.
pub(super) fn check(hierarchy: &Hierarchy) -> Result<IntegrityReport, PathMirrorError> {
    let mut defects = Vec::new();
    let session = hierarchy.session();
    let taxonomy = hierarchy.taxonomy();
    let root = hierarchy.root()?;

    let mut seen = HashSet::from([root]);
    // (node, parent, parent bounds)
    let mut stack: Vec<(ForeignRef, ForeignRef, Option<BBox<Pixel>>)> = hierarchy
        .children_of(root)?
        .into_iter()
        .rev()
        .map(|c| (c, root, None))
        .collect();

    while let Some((object, listed_under, parent_bounds)) = stack.pop() {
        if !seen.insert(object) {
            defects.push(Defect::Revisited {
                object,
                via: listed_under,
            });
            continue;
        }

        let parent = hierarchy.parent_of(object)?;
        if parent != Some(listed_under) {
            defects.push(Defect::ParentMismatch {
                object,
                listed_under,
                parent,
            });
        }
        if session.is_retired(object) {
            defects.push(Defect::RemovedStillAttached { object });
        }

        let children = hierarchy.children_of(object)?;
        let Ok(path_object) = PathObject::from_foreign(taxonomy, object) else {
            defects.push(Defect::NotAPathObject { object });
            stack.extend(children.into_iter().rev().map(|c| (c, object, None)));
            continue;
        };

        let kind = path_object.kind();
        if kind.is_leaf() && !children.is_empty() {
            defects.push(Defect::LeafWithChildren {
                object,
                kind,
                children: children.len(),
            });
        }

        let class = path_object
            .core()
            .get("getPathClass")?
            .as_opt_ref("PathObject.getPathClass")?;
        if let Some(class) = class.and_then(|c| taxonomy.tombstoned(c)) {
            defects.push(Defect::RemovedClass { object, class });
        }

        let bounds = match path_object.roi() {
            Ok(roi) if !roi.is_empty() => roi.geometry().bounds(),
            Ok(_) => {
                defects.push(Defect::NoUsableRoi {
                    object,
                    reason: None,
                });
                None
            }
            Err(PathMirrorError::GeometryConversion(reason)) => {
                defects.push(Defect::NoUsableRoi {
                    object,
                    reason: Some(reason),
                });
                None
            }
            Err(other) => return Err(other),
        };

        if let (Some(own), Some(outer)) = (bounds, parent_bounds) {
            if !outer.contains(&own) {
                defects.push(Defect::OutsideParent {
                    object,
                    parent: listed_under,
                });
            }
        }

        stack.extend(children.into_iter().rev().map(|c| (c, object, bounds)));
    }

    Ok(IntegrityReport { defects })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{classes, Session, Value};
    use crate::geometry::{ImagePlane, Polygon, Roi};
    use crate::hierarchy::Parent;
    use crate::objects::Annotation;
    use crate::taxonomy::Taxonomy;

    fn hierarchy() -> Hierarchy {
        Hierarchy::new(&Taxonomy::new(&Session::in_memory().unwrap())).unwrap()
    }

    fn rect(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Roi {
        Roi::new(
            Polygon::from_bounds(xmin, ymin, xmax, ymax).into(),
            ImagePlane::default(),
        )
    }

    #[test]
    fn test_clean_tree() {
        let h = hierarchy();
        let outer = h.add_annotation(&rect(0.0, 0.0, 100.0, 100.0), None, Parent::Root).unwrap();
        h.add_detection(&rect(10.0, 10.0, 20.0, 20.0), None, &outer).unwrap();
        let report = h.check_integrity().unwrap();
        assert!(report.is_clean(), "{}", report);
    }

    #[test]
    fn test_advisory_warnings() {
        let h = hierarchy();
        let outer = h.add_annotation(&rect(0.0, 0.0, 10.0, 10.0), None, Parent::Root).unwrap();
        h.add_detection(&rect(5.0, 5.0, 50.0, 50.0), None, &outer).unwrap();
        h.add_annotation(&Roi::empty(), None, Parent::Root).unwrap();
        let tumor = h.taxonomy().parse("Tumor").unwrap();
        outer.set_path_class(Some(&tumor)).unwrap();
        h.taxonomy().remove(&tumor);

        let report = h.check_integrity().unwrap();
        assert!(report.is_sound(), "{}", report);
        assert_eq!(report.defects().len(), 3);
        assert!(report.defects().iter().all(|d| !d.is_structural()));
        assert_eq!(
            report.on(outer.core().handle()).collect::<Vec<_>>(),
            [&Defect::RemovedClass {
                object: outer.core().handle(),
                class: "Tumor".parse().unwrap(),
            }]
        );
        assert!(report
            .defects()
            .iter()
            .any(|d| matches!(d, Defect::NoUsableRoi { reason: None, .. })));
        assert!(report
            .defects()
            .iter()
            .any(|d| matches!(d, Defect::OutsideParent { parent, .. } if *parent == outer.core().handle())));
        assert!(report.to_string().starts_with("0 structural and 3 advisory defect(s)"));
    }

    #[test]
    fn test_leaf_with_children_is_reported() {
        let h = hierarchy();
        let detection = h.add_detection(&rect(0.0, 0.0, 10.0, 10.0), None, Parent::Root).unwrap();
        let stray = Annotation::new(h.taxonomy(), &rect(1.0, 1.0, 2.0, 2.0)).unwrap();
        // bypass the hierarchy's checks
        h.session()
            .call(
                detection.core().handle(),
                "addChildObject",
                &[Value::Ref(stray.core().handle())],
            )
            .unwrap();

        let report = h.check_integrity().unwrap();
        assert!(!report.is_sound());
        let handle = detection.core().handle();
        let defect = report
            .on(handle)
            .find(|d| matches!(d, Defect::LeafWithChildren { .. }))
            .unwrap();
        assert_eq!(
            *defect,
            Defect::LeafWithChildren {
                object: handle,
                kind: ObjectKind::Detection,
                children: 1,
            }
        );
        assert_eq!(defect.to_string(), format!("{}: detection has 1 child(ren)", handle));
    }

    #[test]
    fn test_foreign_node_of_unknown_class() {
        let h = hierarchy();
        let root = h.root().unwrap();
        let nested = h.session().construct(classes::HIERARCHY, &[]).unwrap();
        h.session()
            .call(root, "addChildObject", &[Value::Ref(nested)])
            .unwrap();
        let report = h.check_integrity().unwrap();
        assert_eq!(report.defects(), [Defect::NotAPathObject { object: nested }]);
    }

    #[test]
    fn test_reattached_removed_object_is_structural() {
        let h = hierarchy();
        let gone = h.add_annotation(&rect(0.0, 0.0, 5.0, 5.0), None, Parent::Root).unwrap();
        let handle = gone.core().handle();
        h.remove(&gone, true).unwrap();
        // put it back behind the hierarchy's back while the proxy keeps it alive
        h.session()
            .call(h.root().unwrap(), "addChildObject", &[Value::Ref(handle)])
            .unwrap();

        let report = h.check_integrity().unwrap();
        assert!(!report.is_sound());
        assert_eq!(report.defects(), [Defect::RemovedStillAttached { object: handle }]);
        assert!(report.to_string().starts_with("1 structural and 0 advisory defect(s)"));
    }
}
