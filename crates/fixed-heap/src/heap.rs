//! First-fit allocation and address-ordered coalescing.
//!
//! The free list is threaded through the chunk headers as byte offsets and is
//! kept sorted by offset:
//!
//! ```text
//! head ─┐
//!       ▼
//! ┌────┬──────┬────┬──────┬────┬────────┬────┬──────┐
//! │hdr │ free │hdr │ used │hdr │  used  │hdr │ free │
//! └────┴──────┴────┴──────┴────┴────────┴────┴──────┘
//!   │                                     ▲
//!   └───────────── link ──────────────────┘
//! ```
//!
//! Because the list is address ordered, the free neighbors of a chunk being
//! released are exactly its list predecessor and successor, and adjacency is
//! the integer test `left + HEADER_SIZE + left.size == right`.

use log::{trace, warn};
use snafu::{OptionExt as _, ensure};

use crate::{
    chunk::{ALIGN, ALIGN_SLACK, ChunkHeader, HEADER_SIZE, Handle, LINK_ALLOCATED},
    config::HeapConfig,
    error::{
        AlreadyFreeSnafu, ChunkCountExceededSnafu, DeallocError, InvalidHandleSnafu,
        NullHandleSnafu, UnknownHandleSnafu, UntrackedFreeSnafu, fatal,
    },
    store::BackingStore,
};

/// A heap managing a fixed backing store of `CAP` bytes.
///
/// The store is part of the value; nothing is ever requested from the system
/// allocator. `CAP` must be a multiple of [`ALIGN`] and large enough for one
/// header plus [`ALIGN`] bytes.
///
/// # Examples
///
/// ```
/// use fixed_heap::{Heap, HeapConfig};
///
/// let mut heap = Heap::<1024>::new(HeapConfig::default());
///
/// let handle = heap.allocate(100).unwrap();
/// heap.data_mut(handle).unwrap()[..5].copy_from_slice(b"hello");
/// assert_eq!(&heap.data(handle).unwrap()[..5], b"hello");
///
/// heap.deallocate(Some(handle)).unwrap();
/// assert_eq!(heap.free_chunks().count(), 1);
/// ```
pub struct Heap<const CAP: usize> {
    pub(crate) store: BackingStore<CAP>,
    pub(crate) free_head: Option<usize>,
    config: HeapConfig,
}

impl<const CAP: usize> Heap<CAP> {
    /// Upper bound on the number of chunks the store can hold.
    pub const MAX_CHUNKS: usize = CAP / HEADER_SIZE;

    /// Creates an initialized heap.
    ///
    /// The whole store starts out as a single free chunk of
    /// `CAP - HEADER_SIZE` usable bytes.
    #[must_use]
    pub const fn new(config: HeapConfig) -> Self {
        const {
            assert!(CAP.is_multiple_of(ALIGN), "capacity must be a multiple of ALIGN");
            assert!(CAP >= HEADER_SIZE + ALIGN, "capacity cannot hold a single chunk");
            assert!(CAP < LINK_ALLOCATED, "capacity collides with link sentinels");
        }
        Self {
            store: BackingStore::primordial(),
            free_head: Some(0),
            config,
        }
    }

    /// Size of the backing store in bytes, headers included.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        CAP
    }

    /// Configuration the heap was created with.
    #[must_use]
    pub const fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Allocates a chunk with at least `requested_size` usable bytes.
    ///
    /// The size is rounded up to a multiple of [`ALIGN`] and served first fit
    /// from the free list. The chosen chunk is split when the remainder would
    /// reach the configured tolerance; otherwise it is handed out whole.
    ///
    /// Returns `None` for a zero-sized request (silently) and when no free
    /// chunk is large enough (reported through the log).
    pub fn allocate(&mut self, requested_size: usize) -> Option<Handle> {
        if requested_size == 0 {
            return None;
        }

        let Some(aligned_size) = requested_size.checked_next_multiple_of(ALIGN) else {
            warn!("allocation of {requested_size} bytes failed: size overflows");
            return None;
        };

        let mut prev = None;
        let mut cursor = self.free_head;
        let mut steps = 0;
        while let Some(offset) = cursor {
            Self::count_step(&mut steps);
            let header = self.store.header(offset);
            if header.size >= aligned_size {
                let replacement = self.carve(offset, header, aligned_size);
                self.link_after(prev, replacement);
                return Some(Handle::from_header_offset(offset));
            }
            prev = Some(offset);
            cursor = header.next_free();
        }

        warn!(
            "allocation of {requested_size} bytes failed: no free chunk holds {aligned_size} bytes"
        );
        None
    }

    /// Marks the free chunk at `offset` allocated, splitting it if worthwhile.
    ///
    /// Returns the free chunk that takes its place in the free list.
    fn carve(
        &mut self,
        offset: usize,
        mut header: ChunkHeader,
        aligned_size: usize,
    ) -> Option<usize> {
        let next = header.next_free();
        let needed = aligned_size + HEADER_SIZE + ALIGN_SLACK;

        if header.size < needed + self.config.min_remainder() {
            trace!(
                "chunk {offset:#x}: {} bytes used whole for {aligned_size} bytes",
                header.size
            );
            header.mark_allocated();
            self.store.set_header(offset, header);
            return next;
        }

        let used_size = aligned_size + ALIGN_SLACK;
        let remainder_offset = offset + HEADER_SIZE + used_size;
        let remainder = ChunkHeader::free(header.size - used_size - HEADER_SIZE, next);
        trace!(
            "chunk {offset:#x}: split {} bytes into {used_size} + {} at {remainder_offset:#x}",
            header.size, remainder.size
        );
        self.store.set_header(remainder_offset, remainder);

        header.size = used_size;
        header.mark_allocated();
        self.store.set_header(offset, header);

        Some(remainder_offset)
    }

    /// Returns the chunk behind `handle` to the free list.
    ///
    /// The chunk is inserted at its address-ordered position and merged with
    /// a free chunk directly before it, directly after it, or both.
    ///
    /// `None`, handles outside the store, handles that do not start a chunk
    /// and handles of chunks that are already free are rejected, reported
    /// through the log, and leave the heap untouched.
    pub fn deallocate(&mut self, handle: Option<Handle>) -> Result<(), DeallocError> {
        let checked = handle
            .context(NullHandleSnafu)
            .and_then(|handle| self.live_chunk(handle));
        let offset = match checked {
            Ok(offset) => offset,
            Err(err) => {
                warn!("deallocate rejected: {err}");
                return Err(err);
            }
        };

        self.release(offset);
        Ok(())
    }

    /// Header offset of the allocated chunk behind `handle`.
    pub(crate) fn live_chunk(&self, handle: Handle) -> Result<usize, DeallocError> {
        let Some(offset) = handle.header_offset() else {
            return InvalidHandleSnafu { handle }.fail();
        };
        ensure!(
            handle.offset() < CAP && handle.offset().is_multiple_of(ALIGN),
            InvalidHandleSnafu { handle }
        );

        let mut cursor = 0;
        let mut steps = 0;
        while cursor < offset {
            Self::count_step(&mut steps);
            cursor += self.store.header(cursor).footprint();
        }
        ensure!(cursor == offset, UnknownHandleSnafu { handle });
        ensure!(
            self.store.header(offset).state().is_allocated(),
            AlreadyFreeSnafu { handle }
        );
        Ok(offset)
    }

    fn release(&mut self, offset: usize) {
        let freed = self.store.header(offset);

        let mut prev = None;
        let mut next = self.free_head;
        let mut steps = 0;
        while let Some(current) = next {
            Self::count_step(&mut steps);
            if current > offset {
                break;
            }
            if current == offset {
                fatal(UntrackedFreeSnafu { offset }.build());
            }
            prev = Some(current);
            next = self.store.header(current).next_free();
        }

        let mut merged = ChunkHeader::free(freed.size, next);
        if let Some(right) = next {
            let right_header = self.store.header(right);
            if offset + merged.footprint() == right {
                trace!("chunk {offset:#x}: absorbs right neighbor {right:#x}");
                merged.size += right_header.footprint();
                merged.set_next_free(right_header.next_free());
            }
        }

        if let Some(left) = prev {
            let mut left_header = self.store.header(left);
            if left + left_header.footprint() == offset {
                trace!("chunk {offset:#x}: absorbed by left neighbor {left:#x}");
                left_header.size += merged.footprint();
                left_header.set_next_free(merged.next_free());
                self.store.set_header(left, left_header);
                return;
            }
        }

        self.store.set_header(offset, merged);
        self.link_after(prev, Some(offset));
    }

    /// Points the free list entry `prev` (or the head) at `target`.
    fn link_after(&mut self, prev: Option<usize>, target: Option<usize>) {
        match prev {
            Some(prev) => {
                let mut header = self.store.header(prev);
                header.set_next_free(target);
                self.store.set_header(prev, header);
            }
            None => self.free_head = target,
        }
    }

    #[track_caller]
    pub(crate) fn count_step(steps: &mut usize) {
        *steps += 1;
        if *steps > Self::MAX_CHUNKS {
            fatal(
                ChunkCountExceededSnafu {
                    limit: Self::MAX_CHUNKS,
                }
                .build(),
            );
        }
    }

    /// Usable bytes of a live allocation.
    ///
    /// The slice covers the whole chunk, which can be longer than the
    /// requested size. Returns `None` if `handle` is not allocated.
    #[must_use]
    pub fn data(&self, handle: Handle) -> Option<&[u8]> {
        let offset = self.live_chunk(handle).ok()?;
        let size = self.store.header(offset).size;
        Some(self.store.region(offset, size))
    }

    /// Mutable counterpart of [`data`](Self::data).
    #[must_use]
    pub fn data_mut(&mut self, handle: Handle) -> Option<&mut [u8]> {
        let offset = self.live_chunk(handle).ok()?;
        let size = self.store.header(offset).size;
        Some(self.store.region_mut(offset, size))
    }
}

impl<const CAP: usize> Default for Heap<CAP> {
    fn default() -> Self {
        Self::new(HeapConfig::default())
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    extern crate alloc;

    use alloc::vec::Vec;

    use super::*;
    use crate::{ChunkInfo, ChunkState};

    struct TestHeap<const CAP: usize> {
        heap: Heap<CAP>,
    }

    impl<const CAP: usize> TestHeap<CAP> {
        fn allocate(&mut self, size: usize) -> Option<Handle> {
            let handle = self.heap.allocate(size)?;
            self.heap.data_mut(handle).unwrap().fill(0x33);
            self.heap.check().unwrap();
            Some(handle)
        }

        fn deallocate(&mut self, handle: Handle) {
            let data = self.heap.data_mut(handle).unwrap();
            assert!(data.iter().all(|&b| b == 0x33));
            data.fill(0x55);
            self.heap.deallocate(Some(handle)).unwrap();
            self.heap.check().unwrap();
        }

        fn free_list(&self) -> Vec<(usize, usize)> {
            self.heap
                .free_chunks()
                .map(|chunk| (chunk.offset, chunk.size))
                .collect()
        }
    }

    fn with_test_heap<const CAP: usize, F>(tolerance: usize, test_fn: F)
    where
        F: FnOnce(&mut TestHeap<CAP>),
    {
        let heap = Heap::<CAP>::new(HeapConfig::new().with_tolerance(tolerance));
        let mut test_heap = TestHeap { heap };
        test_fn(&mut test_heap);
        test_heap.heap.check().unwrap();
    }

    #[test]
    fn test_initial_state() {
        with_test_heap::<1024, _>(64, |heap| {
            assert_eq!(heap.free_list(), [(0, 1024 - HEADER_SIZE)]);
        });
    }

    #[test]
    fn test_zero_size_allocation() {
        with_test_heap::<1024, _>(64, |heap| {
            let before = heap.free_list();
            assert_eq!(heap.allocate(0), None);
            assert_eq!(heap.free_list(), before);
        });
    }

    #[test]
    fn test_size_is_rounded_to_alignment() {
        with_test_heap::<1024, _>(64, |heap| {
            let handle = heap.allocate(13).unwrap();
            assert_eq!(heap.heap.data(handle).unwrap().len(), 16);
            assert_eq!(handle.offset(), HEADER_SIZE);
            assert_eq!(
                heap.free_list(),
                [(HEADER_SIZE + 16, 1024 - 2 * HEADER_SIZE - 16)]
            );
        });
    }

    #[test]
    fn test_multiple_allocations_are_disjoint() {
        with_test_heap::<1024, _>(64, |heap| {
            let h1 = heap.allocate(64).unwrap();
            let h2 = heap.allocate(64).unwrap();
            let h3 = heap.allocate(64).unwrap();
            assert!(h1 < h2 && h2 < h3);
            assert_eq!(h2.offset() - h1.offset(), HEADER_SIZE + 64);
            assert_eq!(h3.offset() - h2.offset(), HEADER_SIZE + 64);

            heap.deallocate(h1);
            heap.deallocate(h2);
            heap.deallocate(h3);
            assert_eq!(heap.free_list(), [(0, 1024 - HEADER_SIZE)]);
        });
    }

    #[test]
    fn test_small_remainder_is_not_split() {
        // 128 - 16 = 112 usable; a 64-byte request would leave 32 bytes.
        with_test_heap::<128, _>(64, |heap| {
            let handle = heap.allocate(64).unwrap();
            assert_eq!(heap.heap.data(handle).unwrap().len(), 112);
            assert!(heap.free_list().is_empty());
            assert_eq!(heap.allocate(8), None);
        });
    }

    #[test]
    fn test_tolerance_controls_split() {
        with_test_heap::<128, _>(8, |heap| {
            let handle = heap.allocate(64).unwrap();
            assert_eq!(heap.heap.data(handle).unwrap().len(), 64);
            assert_eq!(heap.free_list(), [(HEADER_SIZE + 64, 32)]);
        });
    }

    #[test]
    fn test_first_fit_picks_lowest_hole() {
        with_test_heap::<1024, _>(8, |heap| {
            let h1 = heap.allocate(32).unwrap();
            let _h2 = heap.allocate(8).unwrap();
            let h3 = heap.allocate(64).unwrap();
            let _h4 = heap.allocate(8).unwrap();
            heap.deallocate(h1);
            heap.deallocate(h3);

            // Both holes fit; the lower one wins.
            let h5 = heap.allocate(24).unwrap();
            assert_eq!(h5, h1);
            // Only the second hole fits.
            let h6 = heap.allocate(48).unwrap();
            assert_eq!(h6, h3);
        });
    }

    #[test]
    fn test_coalesce_with_left_neighbor() {
        with_test_heap::<1024, _>(64, |heap| {
            let h1 = heap.allocate(64).unwrap();
            let h2 = heap.allocate(64).unwrap();
            let _h3 = heap.allocate(64).unwrap();
            heap.deallocate(h1);
            heap.deallocate(h2);
            assert_eq!(heap.free_list()[0], (0, 64 + HEADER_SIZE + 64));
            assert_eq!(heap.free_list().len(), 2);
        });
    }

    #[test]
    fn test_coalesce_with_right_neighbor() {
        with_test_heap::<1024, _>(64, |heap| {
            let h1 = heap.allocate(64).unwrap();
            let h2 = heap.allocate(64).unwrap();
            let _h3 = heap.allocate(64).unwrap();
            heap.deallocate(h2);
            heap.deallocate(h1);
            assert_eq!(heap.free_list()[0], (0, 64 + HEADER_SIZE + 64));
            assert_eq!(heap.free_list().len(), 2);
        });
    }

    #[test]
    fn test_coalesce_with_both_neighbors() {
        with_test_heap::<1024, _>(64, |heap| {
            let h1 = heap.allocate(64).unwrap();
            let h2 = heap.allocate(64).unwrap();
            let h3 = heap.allocate(64).unwrap();
            let _h4 = heap.allocate(64).unwrap();
            heap.deallocate(h1);
            heap.deallocate(h3);
            assert_eq!(heap.free_list().len(), 3);

            heap.deallocate(h2);
            let list = heap.free_list();
            assert_eq!(list.len(), 2);
            assert_eq!(list[0], (0, 3 * 64 + 2 * HEADER_SIZE));
        });
    }

    #[test]
    fn test_insert_without_neighbors_keeps_address_order() {
        with_test_heap::<1024, _>(64, |heap| {
            let handles: Vec<_> = (0..6).map(|_| heap.allocate(32).unwrap()).collect();
            heap.deallocate(handles[3]);
            heap.deallocate(handles[1]);
            heap.deallocate(handles[5]);

            let offsets: Vec<_> = heap.free_list().iter().map(|&(offset, _)| offset).collect();
            let mut sorted = offsets.clone();
            sorted.sort_unstable();
            assert_eq!(offsets, sorted);
            // handles[5] merged with the tail chunk.
            assert_eq!(offsets.len(), 3);
        });
    }

    #[test]
    fn test_out_of_memory() {
        with_test_heap::<256, _>(64, |heap| {
            assert_eq!(heap.allocate(256), None);
            assert_eq!(heap.allocate(usize::MAX), None);
            assert_eq!(heap.free_list(), [(0, 256 - HEADER_SIZE)]);
        });
    }

    #[test]
    fn test_allocate_entire_heap() {
        with_test_heap::<1024, _>(64, |heap| {
            let handle = heap.allocate(1024 - HEADER_SIZE).unwrap();
            assert!(heap.free_list().is_empty());
            assert_eq!(heap.allocate(1), None);

            heap.deallocate(handle);
            assert_eq!(heap.allocate(1024 - HEADER_SIZE), Some(handle));
        });
    }

    #[test]
    fn test_reallocation_after_full_deallocation() {
        with_test_heap::<1024, _>(0, |heap| {
            let mut handles = Vec::new();
            while let Some(handle) = heap.allocate(40) {
                handles.push(handle);
            }
            assert!(handles.len() > 1);

            for handle in handles {
                heap.deallocate(handle);
            }
            assert_eq!(heap.free_list(), [(0, 1024 - HEADER_SIZE)]);
        });
    }

    #[test]
    fn test_deallocate_null() {
        with_test_heap::<256, _>(64, |heap| {
            let err = heap.heap.deallocate(None).unwrap_err();
            assert!(matches!(err, DeallocError::NullHandle { .. }));
            assert_eq!(heap.free_list(), [(0, 256 - HEADER_SIZE)]);
        });
    }

    #[test]
    fn test_double_free_is_rejected() {
        with_test_heap::<1024, _>(64, |heap| {
            let h1 = heap.allocate(64).unwrap();
            let _h2 = heap.allocate(64).unwrap();
            heap.deallocate(h1);
            let before = heap.free_list();

            let err = heap.heap.deallocate(Some(h1)).unwrap_err();
            assert!(matches!(err, DeallocError::AlreadyFree { .. }));
            assert_eq!(heap.free_list(), before);
        });
    }

    #[test]
    fn test_foreign_handles_are_rejected() {
        with_test_heap::<1024, _>(64, |heap| {
            let handle = heap.allocate(64).unwrap();

            let inside = Handle::from_offset(handle.offset() + 8);
            assert!(matches!(
                heap.heap.deallocate(Some(inside)),
                Err(DeallocError::UnknownHandle { .. })
            ));
            let misaligned = Handle::from_offset(handle.offset() + 1);
            assert!(matches!(
                heap.heap.deallocate(Some(misaligned)),
                Err(DeallocError::InvalidHandle { .. })
            ));
            for offset in [0, 1024, usize::MAX] {
                assert!(matches!(
                    heap.heap.deallocate(Some(Handle::from_offset(offset))),
                    Err(DeallocError::InvalidHandle { .. })
                ));
            }
            assert_eq!(heap.heap.data(inside), None);

            heap.deallocate(handle);
        });
    }

    #[test]
    fn test_rejection_records_location() {
        let mut heap = Heap::<256>::default();
        let handle = heap.allocate(8).unwrap();
        heap.deallocate(Some(handle)).unwrap();

        let err = heap.deallocate(Some(handle)).unwrap_err();
        assert!(err.location().to_string().contains("heap.rs"));
        let err = heap.deallocate(None).unwrap_err();
        assert!(err.location().to_string().contains("heap.rs"));
    }

    #[test]
    fn test_capacity_and_config() {
        let heap = Heap::<512>::new(HeapConfig::new().with_tolerance(24));
        assert_eq!(heap.capacity(), 512);
        assert_eq!(heap.config().tolerance(), 24);
    }

    #[test]
    #[should_panic = "heap consistency violation"]
    fn test_cyclic_free_list_is_fatal() {
        let mut heap = Heap::<256>::default();
        let mut header = heap.store.header(0);
        header.set_next_free(Some(0));
        heap.store.set_header(0, header);

        let _ = heap.allocate(4000);
    }

    #[test]
    #[should_panic = "heap consistency violation"]
    fn test_releasing_listed_chunk_is_fatal() {
        let mut heap = Heap::<256>::default();
        let _handle = heap.allocate(8).unwrap();
        let remainder = heap.free_head.unwrap();

        heap.release(remainder);
    }

    #[test]
    fn test_absorbed_header_is_not_a_chunk() {
        with_test_heap::<1024, _>(64, |heap| {
            let h1 = heap.allocate(64).unwrap();
            let h2 = heap.allocate(64).unwrap();
            let _h3 = heap.allocate(64).unwrap();
            heap.deallocate(h1);
            heap.deallocate(h2);

            // h2's header still sits in the store but no longer starts a chunk.
            assert!(matches!(
                heap.heap.deallocate(Some(h2)),
                Err(DeallocError::UnknownHandle { .. })
            ));
        });
    }

    #[test]
    fn test_data_is_preserved_across_other_operations() {
        with_test_heap::<1024, _>(64, |heap| {
            let h1 = heap.allocate(24).unwrap();
            let h2 = heap.allocate(24).unwrap();
            heap.heap.data_mut(h2).unwrap().copy_from_slice(&[7; 24]);
            heap.deallocate(h1);
            let h3 = heap.allocate(200).unwrap();
            assert_eq!(heap.heap.data(h2).unwrap(), &[7; 24]);
            heap.heap.data_mut(h2).unwrap().fill(0x33);
            heap.deallocate(h3);
            heap.deallocate(h2);
        });
    }

    #[test]
    fn test_chunks_partition_store() {
        with_test_heap::<512, _>(8, |heap| {
            let h1 = heap.allocate(16).unwrap();
            let _h2 = heap.allocate(48).unwrap();
            heap.deallocate(h1);

            let chunks: Vec<ChunkInfo> = heap.heap.chunks().collect();
            assert_eq!(chunks.len(), 3);
            assert_eq!(chunks[0].state, ChunkState::Free);
            assert_eq!(chunks[1].state, ChunkState::Allocated);
            assert_eq!(chunks[2].state, ChunkState::Free);
            assert_eq!(chunks.iter().map(ChunkInfo::footprint).sum::<usize>(), 512);
        });
    }
}
