//! Read-only views of a heap.
//!
//! Nothing in this module mutates chunk headers or the free list.

use core::{fmt, iter::FusedIterator};

use crate::{
    chunk::{ALIGN, ChunkInfo, ChunkState},
    error::{
        AdjacentFreeSnafu, ChunkCountExceededSnafu, CorruptionError, DanglingLinkSnafu,
        MisalignedSizeSnafu, NotTaggedFreeSnafu, OutOfBoundsSnafu, PartitionMismatchSnafu,
        UntrackedFreeSnafu,
    },
    heap::Heap,
};

/// Iterator over the free list, in list (ascending address) order.
pub struct FreeChunks<'a, const CAP: usize> {
    heap: &'a Heap<CAP>,
    cursor: Option<usize>,
    steps: usize,
}

impl<const CAP: usize> Iterator for FreeChunks<'_, CAP> {
    type Item = ChunkInfo;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.cursor?;
        Heap::<CAP>::count_step(&mut self.steps);
        let header = self.heap.store.header(offset);
        self.cursor = header.next_free();
        Some(ChunkInfo {
            offset,
            size: header.size,
            state: header.state(),
        })
    }
}

impl<const CAP: usize> FusedIterator for FreeChunks<'_, CAP> {}

/// Iterator over every chunk, free or allocated, in physical order.
pub struct Chunks<'a, const CAP: usize> {
    heap: &'a Heap<CAP>,
    cursor: usize,
}

impl<const CAP: usize> Iterator for Chunks<'_, CAP> {
    type Item = ChunkInfo;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= CAP {
            return None;
        }
        let offset = self.cursor;
        let header = self.heap.store.header(offset);
        self.cursor = offset.saturating_add(header.footprint());
        Some(ChunkInfo {
            offset,
            size: header.size,
            state: header.state(),
        })
    }
}

impl<const CAP: usize> FusedIterator for Chunks<'_, CAP> {}

/// Byte and chunk counts of a heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    pub capacity: usize,
    /// Usable bytes of free chunks.
    pub free_bytes: usize,
    /// Usable bytes of allocated chunks.
    pub used_bytes: usize,
    /// Bytes taken by chunk headers.
    pub header_bytes: usize,
    pub free_chunks: usize,
    pub used_chunks: usize,
    /// Usable bytes of the largest free chunk, the largest request that can
    /// currently succeed.
    pub largest_free: usize,
}

impl fmt::Display for HeapStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "capacity: {} bytes, free: {} bytes in {} chunks (largest {}), used: {} bytes in {} \
             chunks, headers: {} bytes",
            self.capacity,
            self.free_bytes,
            self.free_chunks,
            self.largest_free,
            self.used_bytes,
            self.used_chunks,
            self.header_bytes,
        )
    }
}

impl<const CAP: usize> Heap<CAP> {
    /// Free chunks in free list order.
    #[must_use]
    pub fn free_chunks(&self) -> FreeChunks<'_, CAP> {
        FreeChunks {
            heap: self,
            cursor: self.free_head,
            steps: 0,
        }
    }

    /// All chunks in address order.
    #[must_use]
    pub fn chunks(&self) -> Chunks<'_, CAP> {
        Chunks {
            heap: self,
            cursor: 0,
        }
    }

    #[must_use]
    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            capacity: CAP,
            ..HeapStats::default()
        };
        for chunk in self.chunks() {
            stats.header_bytes += chunk.footprint() - chunk.size;
            match chunk.state {
                ChunkState::Free => {
                    stats.free_bytes += chunk.size;
                    stats.free_chunks += 1;
                    stats.largest_free = stats.largest_free.max(chunk.size);
                }
                ChunkState::Allocated => {
                    stats.used_bytes += chunk.size;
                    stats.used_chunks += 1;
                }
            }
        }
        stats
    }

    /// Verifies the structural invariants of the heap.
    ///
    /// - chunks exactly partition the store and have aligned sizes
    /// - the free list visits every free chunk, only free chunks, in
    ///   ascending address order
    /// - no two free chunks are physically adjacent
    pub fn check(&self) -> Result<(), CorruptionError> {
        let mut expected_free = self.free_head;
        let mut prev_free: Option<usize> = None;
        let mut cursor = 0;
        let mut count = 0;

        while cursor < CAP {
            count += 1;
            snafu::ensure!(
                count <= Self::MAX_CHUNKS,
                ChunkCountExceededSnafu {
                    limit: Self::MAX_CHUNKS
                }
            );
            let header = self.store.try_header(cursor).ok_or_else(|| {
                OutOfBoundsSnafu {
                    offset: cursor,
                    capacity: CAP,
                }
                .build()
            })?;
            snafu::ensure!(
                header.size.is_multiple_of(ALIGN),
                MisalignedSizeSnafu {
                    offset: cursor,
                    size: header.size
                }
            );

            match header.state() {
                ChunkState::Free => {
                    snafu::ensure!(
                        expected_free == Some(cursor),
                        UntrackedFreeSnafu { offset: cursor }
                    );
                    if let Some(left) = prev_free {
                        return AdjacentFreeSnafu {
                            left,
                            right: cursor,
                        }
                        .fail();
                    }
                    expected_free = header.next_free();
                    prev_free = Some(cursor);
                }
                ChunkState::Allocated => {
                    snafu::ensure!(
                        expected_free != Some(cursor),
                        NotTaggedFreeSnafu { offset: cursor }
                    );
                    prev_free = None;
                }
            }

            cursor = cursor.saturating_add(header.footprint());
        }

        snafu::ensure!(
            cursor == CAP,
            PartitionMismatchSnafu {
                end: cursor,
                capacity: CAP
            }
        );
        if let Some(offset) = expected_free {
            return DanglingLinkSnafu { offset }.fail();
        }
        Ok(())
    }

    /// Human readable listing of the free list and the allocated chunks.
    #[must_use]
    pub fn dump(&self) -> Dump<'_, CAP> {
        Dump { heap: self }
    }
}

/// Display adapter returned by [`Heap::dump`].
pub struct Dump<'a, const CAP: usize> {
    heap: &'a Heap<CAP>,
}

impl<const CAP: usize> fmt::Display for Dump<'_, CAP> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = (usize::BITS - CAP.leading_zeros()).div_ceil(4) as usize;

        writeln!(f, "Free chunks: ({})", self.heap.free_chunks().count())?;
        for chunk in self.heap.free_chunks() {
            writeln!(
                f,
                "  header: {:#0w$x}, size: {} bytes",
                chunk.offset,
                chunk.size,
                w = width + 2
            )?;
        }

        let allocated = || {
            self.heap
                .chunks()
                .filter(|chunk| chunk.state.is_allocated())
        };
        writeln!(f, "Allocated chunks: ({})", allocated().count())?;
        for chunk in allocated() {
            writeln!(
                f,
                "  start: {:#0w$x}, size: {} bytes",
                chunk.handle().offset(),
                chunk.size,
                w = width + 2
            )?;
        }
        Ok(())
    }
}
