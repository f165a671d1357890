//! Scoped-lock wrapper for resources shared between the producer thread
//! and foreground callers
//!
//! Every piece of state touched by more than one execution context in this
//! crate (event row, histogram internals, manager lists, the registry map)
//! is wrapped in [`Locked`] rather than holding a bare `Mutex`. The wrapper
//! gives the crate one place to define the locking discipline:
//!
//! - [`Locked::lock`] blocks until exclusive access is granted and returns a
//!   guard; access is released when the guard goes out of scope, on every
//!   exit path.
//! - [`Locked::get_mut`] is the statically-checked escape for contexts that
//!   can prove no contention is possible: it requires `&mut Locked<R>`, so
//!   the borrow checker guarantees no other handle to the resource exists.
//!   Each use site must be able to state why exclusive access already holds
//!   (e.g. the value has not yet been shared).
//!
//! A poisoned mutex is recovered rather than propagated: a panic inside a
//! fill pass must not permanently wedge foreground snapshot or regate calls.

use std::sync::{Mutex, MutexGuard};

/// Mutex-guarded resource with scoped access
#[derive(Debug, Default)]
pub struct Locked<R> {
    inner: Mutex<R>,
}

impl<R> Locked<R> {
    /// Wrap a resource
    pub fn new(resource: R) -> Self {
        Self {
            inner: Mutex::new(resource),
        }
    }

    /// Block until exclusive access is granted
    pub fn lock(&self) -> MutexGuard<'_, R> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Access the resource without locking
    ///
    /// Requires exclusive ownership of the wrapper itself, which the borrow
    /// checker enforces; no lock is taken.
    pub fn get_mut(&mut self) -> &mut R {
        match self.inner.get_mut() {
            Ok(resource) => resource,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Consume the wrapper and return the resource
    pub fn into_inner(self) -> R {
        match self.inner.into_inner() {
            Ok(resource) => resource,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
