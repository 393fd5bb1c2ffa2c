//! Thread-safe access to a sync context.
//!
//! One execution context owns a `SyncContext`; other threads reach it
//! through a `SharedContext`, which takes a short-lived lock per call.
//!
//! # Example
//!
//! ```rust
//! use sharetree_core::{ContextConfig, SharedContext, SyncContext};
//!
//! let shared = SharedContext::new(SyncContext::new(ContextConfig::new()));
//! let reader = shared.clone();
//! let count = std::thread::spawn(move || reader.read(|ctx| ctx.tree().len()))
//!     .join()
//!     .unwrap();
//! assert_eq!(count, 1);
//! ```

use crate::context::SyncContext;
use parking_lot::{Mutex, MutexGuard};
use sharetree_codec::TypedValue;
use sharetree_protocol::ElementId;
use std::sync::Arc;

/// A cloneable, lock-protected handle to a [`SyncContext`].
#[derive(Clone)]
pub struct SharedContext {
    inner: Arc<Mutex<SyncContext>>,
}

impl SharedContext {
    /// Wraps a context.
    pub fn new(context: SyncContext) -> Self {
        Self {
            inner: Arc::new(Mutex::new(context)),
        }
    }

    /// Runs `f` with shared access.
    pub fn read<R>(&self, f: impl FnOnce(&SyncContext) -> R) -> R {
        f(&self.inner.lock())
    }

    /// Runs `f` with exclusive access.
    pub fn write<R>(&self, f: impl FnOnce(&mut SyncContext) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Locks the context. Keep the guard short-lived.
    pub fn lock(&self) -> MutexGuard<'_, SyncContext> {
        self.inner.lock()
    }

    /// Copies an element's scalar value.
    pub fn value_of(&self, id: ElementId) -> Option<TypedValue> {
        self.read(|ctx| ctx.lookup(id).and_then(|e| e.value().cloned()))
    }
}

impl std::fmt::Debug for SharedContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedContext").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContextConfig;
    use sharetree_protocol::ElementKind;

    #[test]
    fn writes_are_visible_to_clones() {
        let shared = SharedContext::new(SyncContext::new(ContextConfig::new()));
        let writer = shared.clone();
        let id = writer
            .write(|ctx| {
                let root = ctx.root_id();
                ctx.create_child(root, ElementKind::Bool, "on", None, Some(true.into()))
            })
            .unwrap();
        assert_eq!(shared.value_of(id), Some(TypedValue::Bool(true)));
    }

    #[test]
    fn concurrent_readers() {
        let shared = SharedContext::new(SyncContext::new(ContextConfig::new()));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let reader = shared.clone();
                std::thread::spawn(move || reader.read(|ctx| ctx.tree().len()))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 1);
        }
    }
}
