//! Shared mutation counter used for unsaved-change detection.

use std::cell::Cell;
use std::rc::Rc;

/// A monotonically increasing counter shared by everything attached to one
/// taxonomy (and therefore one project).
///
/// Every committed mutation calls [`bump`](Revision::bump); a project is
/// dirty while the current value differs from the value recorded at the
/// last save.
#[derive(Clone, Debug, Default)]
pub(crate) struct Revision(Rc<Cell<u64>>);

impl Revision {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bump(&self) {
        self.0.set(self.0.get() + 1);
    }

    pub(crate) fn current(&self) -> u64 {
        self.0.get()
    }
}
