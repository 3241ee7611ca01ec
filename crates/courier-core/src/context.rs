//! Shared context handed to every handler invocation.

use std::{fmt, ops::Deref, sync::Arc};

/// Handle to the single context value of a server.
///
/// Created once when the route table is built and shared by every
/// handler call for the lifetime of the server. Cloning the handle is
/// cheap and never clones the value itself, so writes made through the
/// value's own interior mutability are visible to later invocations.
///
/// No synchronization is added here. A context that needs to change at
/// runtime brings its own `Mutex`, `RwLock` or atomics, and concurrent
/// handlers race on it exactly as their author allows.
pub struct Context<C> {
    inner: Arc<C>,
}

impl<C> Context<C> {
    /// Wrap a context value.
    #[must_use]
    pub fn new(value: C) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }

    /// Wrap an already shared context value.
    #[must_use]
    pub const fn from_arc(inner: Arc<C>) -> Self {
        Self { inner }
    }

    /// Get the underlying shared pointer.
    #[must_use]
    pub fn shared(&self) -> Arc<C> {
        Arc::clone(&self.inner)
    }

    /// Whether two handles point at the same context value.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<C> Clone for Context<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> Deref for Context<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.inner
    }
}

impl<C> From<Arc<C>> for Context<C> {
    fn from(inner: Arc<C>) -> Self {
        Self::from_arc(inner)
    }
}

impl<C: fmt::Debug> fmt::Debug for Context<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Context").field(&*self.inner).finish()
    }
}
