use spin::{Mutex, MutexGuard};

use crate::{chunk::Handle, config::HeapConfig, error::DeallocError, heap::Heap};

/// A [`Heap`] behind a spin lock, usable from a `static`.
///
/// Every operation holds the lock for the whole call. Handles stay plain
/// offsets, so they can be passed between threads freely.
///
/// # Examples
///
/// ```
/// use fixed_heap::{HeapConfig, LockedHeap};
///
/// static HEAP: LockedHeap<4096> = LockedHeap::new(HeapConfig::new());
///
/// let handle = HEAP.allocate(32).unwrap();
/// HEAP.deallocate(Some(handle)).unwrap();
/// ```
pub struct LockedHeap<const CAP: usize> {
    heap: Mutex<Heap<CAP>>,
}

impl<const CAP: usize> LockedHeap<CAP> {
    #[must_use]
    pub const fn new(config: HeapConfig) -> Self {
        Self {
            heap: Mutex::new(Heap::new(config)),
        }
    }

    /// Locks the heap for a sequence of operations or for diagnostics.
    pub fn lock(&self) -> MutexGuard<'_, Heap<CAP>> {
        self.heap.lock()
    }

    pub fn allocate(&self, requested_size: usize) -> Option<Handle> {
        self.heap.lock().allocate(requested_size)
    }

    pub fn deallocate(&self, handle: Option<Handle>) -> Result<(), DeallocError> {
        self.heap.lock().deallocate(handle)
    }
}
