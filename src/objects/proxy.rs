use std::hash::{Hash, Hasher};

use crate::bridge::{ForeignRef, Session, Value};
use crate::error::PathMirrorError;
use crate::geometry::{to_foreign, Roi};
use crate::taxonomy::Taxonomy;

/// The state every path object proxy carries: the taxonomy it resolves
/// classes against (which also holds the session) and its foreign handle.
///
/// Each core counts as one hold on its handle in the session, so removed
/// objects are released once the last proxy goes away.
pub struct ObjectCore {
    taxonomy: Taxonomy,
    handle: ForeignRef,
}

impl ObjectCore {
    pub(crate) fn new(taxonomy: &Taxonomy, handle: ForeignRef) -> Self {
        taxonomy.session().hold(handle);
        Self {
            taxonomy: taxonomy.clone(),
            handle,
        }
    }

    /// Constructs a detached foreign object of `class` with `roi`.
    pub(crate) fn create(
        taxonomy: &Taxonomy,
        class: &str,
        roi: &Roi,
    ) -> Result<Self, PathMirrorError> {
        let session = taxonomy.session();
        let foreign_roi = to_foreign(session, roi.geometry(), roi.plane())?;
        let handle = session.construct(class, &[foreign_roi.into(), Value::Null])?;
        Ok(Self::new(taxonomy, handle))
    }

    pub(crate) fn handle(&self) -> ForeignRef {
        self.handle
    }

    pub(crate) fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    pub(crate) fn session(&self) -> &Session {
        self.taxonomy.session()
    }

    pub(crate) fn get(&self, method: &str) -> Result<Value, PathMirrorError> {
        self.session().call(self.handle, method, &[])
    }

    /// Calls a mutating method and records the change.
    pub(crate) fn mutate(&self, method: &str, args: &[Value]) -> Result<Value, PathMirrorError> {
        let result = self.session().call(self.handle, method, args)?;
        self.taxonomy.revision().bump();
        Ok(result)
    }
}

impl Clone for ObjectCore {
    fn clone(&self) -> Self {
        Self::new(&self.taxonomy, self.handle)
    }
}

impl Drop for ObjectCore {
    fn drop(&mut self) {
        self.session().unhold(self.handle);
    }
}

impl PartialEq for ObjectCore {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle && self.session().same_as(other.session())
    }
}

impl Eq for ObjectCore {}

impl Hash for ObjectCore {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.handle.hash(state);
    }
}
