//! The explicit context object for one foreign runtime session.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use super::{Bridge, ForeignRef, Value};
use crate::error::PathMirrorError;

/// Set while an exclusive (process-singleton) session is open.
static EXCLUSIVE_ACTIVE: AtomicBool = AtomicBool::new(false);

/// A handle on a started foreign runtime.
///
/// Sessions are cheap to clone; every clone refers to the same runtime.
/// The type is deliberately `!Send`: calls into the runtime are blocking
/// and single-threaded, and callers that want parallelism across images
/// must serialize access themselves.
///
/// After [`close`](Session::close), every operation on any proxy created
/// against this session fails with
/// [`PathMirrorError::BridgeUnavailable`].
#[derive(Clone)]
pub struct Session {
    inner: Rc<SessionInner>,
}

struct SessionInner {
    bridge: RefCell<Option<Box<dyn Bridge>>>,
    exclusive: bool,
    /// Objects excised from a hierarchy. They may never be inserted again.
    retired: RefCell<HashSet<ForeignRef>>,
    /// Number of live native proxies per object handle.
    held: RefCell<HashMap<ForeignRef, usize>>,
}

impl Session {
    /// Starts the bridge and wraps it in a session.
    ///
    /// # Errors
    /// Returns `BridgeUnavailable` if another exclusive session is already
    /// active in this process, or whatever the bridge's `start` reports.
    pub fn start<B: Bridge + 'static>(mut bridge: B) -> Result<Self, PathMirrorError> {
        let exclusive = bridge.exclusive();
        if exclusive && EXCLUSIVE_ACTIVE.swap(true, Ordering::SeqCst) {
            return Err(PathMirrorError::BridgeUnavailable(
                "another runtime session is already active in this process".into(),
            ));
        }

        if let Err(e) = bridge.start() {
            if exclusive {
                EXCLUSIVE_ACTIVE.store(false, Ordering::SeqCst);
            }
            return Err(e);
        }

        debug!(exclusive, "runtime session started");
        Ok(Self {
            inner: Rc::new(SessionInner {
                bridge: RefCell::new(Some(Box::new(bridge))),
                exclusive,
                retired: RefCell::new(HashSet::new()),
                held: RefCell::new(HashMap::new()),
            }),
        })
    }

    /// Starts a session on a fresh [`InMemoryRuntime`](super::memory::InMemoryRuntime).
    pub fn in_memory() -> Result<Self, PathMirrorError> {
        Self::start(super::memory::InMemoryRuntime::new())
    }

    /// Stops the runtime. Idempotent.
    pub fn close(&self) {
        self.inner.release();
    }

    /// Returns true until [`close`](Session::close) is called.
    pub fn is_open(&self) -> bool {
        self.inner.bridge.borrow().is_some()
    }

    /// Returns true if both handles refer to the same session.
    pub fn same_as(&self, other: &Session) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn with_bridge<T>(
        &self,
        f: impl FnOnce(&mut dyn Bridge) -> Result<T, PathMirrorError>,
    ) -> Result<T, PathMirrorError> {
        let mut guard = self.inner.bridge.borrow_mut();
        match guard.as_mut() {
            Some(bridge) => f(bridge.as_mut()),
            None => Err(PathMirrorError::BridgeUnavailable("session closed".into())),
        }
    }

    pub(crate) fn construct(
        &self,
        class: &str,
        args: &[Value],
    ) -> Result<ForeignRef, PathMirrorError> {
        self.with_bridge(|b| b.construct(class, args))
    }

    pub(crate) fn call(
        &self,
        object: ForeignRef,
        method: &str,
        args: &[Value],
    ) -> Result<Value, PathMirrorError> {
        self.with_bridge(|b| b.call(object, method, args))
    }

    pub(crate) fn is_instance(
        &self,
        object: ForeignRef,
        class: &str,
    ) -> Result<bool, PathMirrorError> {
        self.with_bridge(|b| b.is_instance(object, class))
    }

    /// Marks objects as removed. Those no proxy holds are released at once;
    /// the rest are released when their last proxy is dropped.
    pub(crate) fn retire(&self, objects: impl IntoIterator<Item = ForeignRef>) {
        let objects: Vec<ForeignRef> = objects.into_iter().collect();
        self.inner.retired.borrow_mut().extend(objects.iter().copied());
        let unheld: Vec<ForeignRef> = {
            let held = self.inner.held.borrow();
            objects
                .into_iter()
                .filter(|o| !held.contains_key(o))
                .collect()
        };
        self.release_objects(&unheld);
    }

    /// Records a new native proxy for `object`.
    pub(crate) fn hold(&self, object: ForeignRef) {
        *self.inner.held.borrow_mut().entry(object).or_insert(0) += 1;
    }

    /// Records that a proxy for `object` was dropped.
    pub(crate) fn unhold(&self, object: ForeignRef) {
        let Ok(mut held) = self.inner.held.try_borrow_mut() else {
            return;
        };
        match held.get_mut(&object) {
            Some(count) if *count > 1 => {
                *count -= 1;
                return;
            }
            Some(_) => {
                held.remove(&object);
            }
            None => return,
        }
        drop(held);
        if self.is_retired(object) {
            self.release_objects(&[object]);
        }
    }

    fn release_objects(&self, objects: &[ForeignRef]) {
        if objects.is_empty() {
            return;
        }
        let Ok(mut guard) = self.inner.bridge.try_borrow_mut() else {
            return;
        };
        if let Some(bridge) = guard.as_mut() {
            bridge.release(objects);
            debug!(count = objects.len(), "removed objects released");
        }
    }

    pub(crate) fn is_retired(&self, object: ForeignRef) -> bool {
        self.inner.retired.borrow().contains(&object)
    }
}

impl SessionInner {
    fn release(&self) {
        if let Some(mut bridge) = self.bridge.borrow_mut().take() {
            bridge.stop();
            if self.exclusive {
                EXCLUSIVE_ACTIVE.store(false, Ordering::SeqCst);
            }
            debug!("runtime session closed");
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("open", &self.is_open())
            .field("exclusive", &self.inner.exclusive)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::classes;
    use crate::bridge::memory::InMemoryRuntime;

    #[test]
    fn test_closed_session_rejects_calls() {
        let session = Session::in_memory().unwrap();
        let obj = session.construct(classes::HIERARCHY, &[]).unwrap();
        session.close();

        assert!(!session.is_open());
        let err = session.call(obj, "getRootObject", &[]).unwrap_err();
        assert!(matches!(err, PathMirrorError::BridgeUnavailable(_)));

        // closing twice is fine
        session.close();
    }

    #[test]
    fn test_clones_share_state() {
        let a = Session::in_memory().unwrap();
        let b = a.clone();
        assert!(a.same_as(&b));
        b.close();
        assert!(!a.is_open());

        let c = Session::in_memory().unwrap();
        assert!(!a.same_as(&c));
    }

    #[test]
    fn test_retired_objects_are_released_once_unheld() {
        let session = Session::in_memory().unwrap();
        let kept = session.construct(classes::HIERARCHY, &[]).unwrap();
        let loose = session.construct(classes::HIERARCHY, &[]).unwrap();
        session.hold(kept);
        session.hold(kept);

        session.retire([kept, loose]);
        assert!(session.call(loose, "getRootObject", &[]).is_err());
        assert!(session.call(kept, "getRootObject", &[]).is_ok());

        session.unhold(kept);
        assert!(session.call(kept, "getRootObject", &[]).is_ok());
        session.unhold(kept);
        assert!(session.call(kept, "getRootObject", &[]).is_err());
        assert!(session.is_retired(kept));
    }

    #[test]
    fn test_exclusive_sessions_are_singletons() {
        let first = Session::start(InMemoryRuntime::new().exclusive(true)).unwrap();
        let err = Session::start(InMemoryRuntime::new().exclusive(true)).unwrap_err();
        assert!(matches!(err, PathMirrorError::BridgeUnavailable(_)));

        // non-exclusive runtimes are unaffected
        assert!(Session::in_memory().is_ok());

        first.close();
        let again = Session::start(InMemoryRuntime::new().exclusive(true)).unwrap();
        again.close();
    }
}
