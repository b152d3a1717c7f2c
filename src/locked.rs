use crate::{Addr, ArenaProvider, Heap};

/// A [`Heap`] behind a [`lock_api::Mutex`], usable through a shared reference.
///
/// The heap itself never synchronizes; this wrapper serializes callers.
#[derive(Debug)]
pub struct LockedHeap<R: lock_api::RawMutex, P: ArenaProvider>(pub lock_api::Mutex<R, Heap<P>>);

impl<R: lock_api::RawMutex, P: ArenaProvider> LockedHeap<R, P> {
    /// Lock the mutex and access the inner `Heap`.
    pub fn heap(&self) -> lock_api::MutexGuard<'_, R, Heap<P>> {
        self.0.lock()
    }

    pub fn into_inner(self) -> Heap<P> {
        self.0.into_inner()
    }

    pub fn initialize(&self) -> Result<(), crate::ArenaExhausted> {
        self.0.lock().initialize()
    }

    pub fn allocate(&self, size: usize) -> Option<Addr> {
        self.0.lock().allocate(size)
    }

    pub fn deallocate(&self, ptr: Option<Addr>) {
        self.0.lock().deallocate(ptr)
    }

    pub fn reallocate(&self, ptr: Option<Addr>, size: usize) -> Option<Addr> {
        self.0.lock().reallocate(ptr, size)
    }

    pub fn zero_allocate(&self, count: usize, size: usize) -> Option<Addr> {
        self.0.lock().zero_allocate(count, size)
    }
}

impl<P: ArenaProvider> Heap<P> {
    /// Wrap in `LockedHeap`, a mutex-locked wrapper struct using [`lock_api`].
    ///
    /// # Examples
    /// ```
    /// # use tagheap::*;
    /// use spin::Mutex;
    /// let heap = Heap::new(Brk::new()).lock::<Mutex<()>>();
    /// heap.initialize().unwrap();
    ///
    /// let ptr = heap.allocate(32);
    /// assert!(ptr.is_some());
    /// heap.deallocate(ptr);
    /// ```
    pub const fn lock<R: lock_api::RawMutex>(self) -> LockedHeap<R, P> {
        LockedHeap(lock_api::Mutex::new(self))
    }
}
