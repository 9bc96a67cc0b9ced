use rtumod_core::registers::{RegisterStore, RegisterType};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A register store shared between a running responder and the application.
///
/// Clones point at the same tables, so one clone can be moved into an
/// [`RtuSlaveServer`](crate::RtuSlaveServer) while another is used to update
/// inputs or observe writes.
#[derive(Debug, Default)]
pub struct SharedRegisters<S> {
    inner: Arc<RwLock<S>>,
}

impl<S> Clone for SharedRegisters<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: RegisterStore> SharedRegisters<S> {
    pub fn new(store: S) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, S> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, S> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: RegisterStore> RegisterStore for SharedRegisters<S> {
    fn capacity(&self, kind: RegisterType) -> usize {
        self.read().capacity(kind)
    }

    fn load(&self, kind: RegisterType, index: usize) -> Option<u16> {
        self.read().load(kind, index)
    }

    fn store(&mut self, kind: RegisterType, index: usize, value: u16) -> bool {
        self.write().store(kind, index, value)
    }
}
