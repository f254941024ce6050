//! Liveness-checked back-references.
//!
//! Objects observed by others live in an `Arc` owned by exactly one place.
//! Observers keep a `BackRef` which carries no ownership and refuses to
//! dereference a referent that was already destroyed.

use std::{
    fmt,
    sync::{Arc, Weak},
};

pub(crate) struct BackRef<T: ?Sized> {
    weak: Option<Weak<T>>,
}

impl<T: ?Sized> BackRef<T> {
    pub(crate) fn empty() -> Self {
        BackRef { weak: None }
    }

    pub(crate) fn new(weak: Weak<T>) -> Self {
        BackRef { weak: Some(weak) }
    }

    /// Check if the reference was set. Says nothing about referent liveness.
    pub(crate) fn is_bound(&self) -> bool {
        self.weak.is_some()
    }

    /// Get the referent if it is still alive.
    pub(crate) fn upgrade(&self) -> Option<Arc<T>> {
        self.weak.as_ref().and_then(Weak::upgrade)
    }

    /// Get the referent.
    ///
    /// # Panics
    ///
    /// Panics if the reference is empty or the referent was destroyed.
    pub(crate) fn get(&self, what: &str) -> Arc<T> {
        match &self.weak {
            None => panic!("Access to {} through empty reference", what),
            Some(weak) => match weak.upgrade() {
                Some(strong) => strong,
                None => panic!("Access to {} after it was destroyed", what),
            },
        }
    }

    /// Check if the reference points to the object held by `strong`.
    pub(crate) fn points_to(&self, strong: &Arc<T>) -> bool {
        match &self.weak {
            // Compare data addresses only, vtables may differ between codegen units.
            Some(weak) => weak.as_ptr() as *const u8 == Arc::as_ptr(strong) as *const u8,
            None => false,
        }
    }

    /// Leave this reference empty, returning previous state.
    pub(crate) fn take(&mut self) -> Self {
        BackRef {
            weak: self.weak.take(),
        }
    }
}

impl<T: ?Sized> Clone for BackRef<T> {
    fn clone(&self) -> Self {
        BackRef {
            weak: self.weak.clone(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for BackRef<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.weak {
            None => fmt.write_str("BackRef(empty)"),
            Some(weak) if weak.strong_count() == 0 => fmt.write_str("BackRef(dead)"),
            Some(_) => fmt.write_str("BackRef(alive)"),
        }
    }
}
