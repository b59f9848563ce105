//! The runtime bridge seam.
//!
//! The foreign runtime (a JVM hosting QuPath) is reached only through the
//! four primitives of the [`Bridge`] trait plus session start/stop. Every
//! native proxy in this crate holds a [`Session`] and a [`ForeignRef`];
//! state is always read from, and committed to, the foreign object.
//!
//! [`memory::InMemoryRuntime`] is a complete in-process implementation of
//! the foreign object model, used by the test suite and by hosts that want
//! the object model without a JVM.

pub mod classes;
pub mod memory;
mod session;
mod value;

pub use session::Session;
pub use value::{ForeignRef, Value};

use crate::error::PathMirrorError;

/// Raw access to a foreign managed runtime.
///
/// Implementations own the runtime lifecycle; the core only calls
/// [`start`](Bridge::start) when a [`Session`] is opened and
/// [`stop`](Bridge::stop) when it is closed or dropped.
pub trait Bridge {
    /// Starts (or attaches to) the foreign runtime.
    fn start(&mut self) -> Result<(), PathMirrorError>;

    /// Releases the runtime. Must be idempotent.
    fn stop(&mut self);

    /// Whether this runtime is a process-wide singleton.
    ///
    /// A JVM can only be started once per process, so real adapters return
    /// true and [`Session::start`] refuses a second concurrent session.
    fn exclusive(&self) -> bool {
        true
    }

    /// Instantiates `class` with positional constructor arguments.
    fn construct(&mut self, class: &str, args: &[Value]) -> Result<ForeignRef, PathMirrorError>;

    /// Invokes `method` on `object`.
    fn call(
        &mut self,
        object: ForeignRef,
        method: &str,
        args: &[Value],
    ) -> Result<Value, PathMirrorError>;

    /// Returns true if `object` is an instance of `class` or a subclass.
    fn is_instance(&self, object: ForeignRef, class: &str) -> Result<bool, PathMirrorError>;

    /// Drops removed objects the host no longer holds any handle to.
    ///
    /// Every object passed here was removed from its hierarchy and will
    /// never be named again. Runtimes with their own collector can ignore
    /// the call; the default does nothing.
    fn release(&mut self, objects: &[ForeignRef]) {
        let _ = objects;
    }
}
