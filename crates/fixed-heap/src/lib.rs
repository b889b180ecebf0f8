//! A fixed-capacity heap with a first-fit, address-ordered free list.
//!
//! The heap owns one statically sized backing store and never asks the
//! system for more memory. Every chunk in the store is prefixed by a small
//! header, and the free chunks are linked through their headers in address
//! order so that freeing a chunk merges it with its free neighbors.
//!
//! ```text
//!   Backing Store (CAP bytes):
//!
//!   ┌─────┬────────┬─────┬────────┬─────┬──────────────────────────┐
//!   │ hdr │ used A │ hdr │ free   │ hdr │ used B                   │ ...
//!   └─────┴────────┴─────┴────────┴─────┴──────────────────────────┘
//!   0     ▲              ▲
//!         │              └── linked into the free list
//!         └── Handle returned by allocate
//! ```
//!
//! # Crate Structure
//!
//! - [`Heap`]: allocation, deallocation and coalescing
//! - [`HeapConfig`]: the tolerance threshold for splitting chunks
//! - [`Handle`], [`ChunkInfo`], [`ChunkState`]: chunk level types
//! - [`FreeChunks`], [`Chunks`], [`HeapStats`], [`Dump`]: read-only
//!   diagnostics
//! - [`LockedHeap`]: a spin-locked heap for shared use
//!
//! # Usage Example
//!
//! ```rust
//! use fixed_heap::{HEADER_SIZE, Heap, HeapConfig};
//!
//! let mut heap = Heap::<4096>::new(HeapConfig::default());
//!
//! let a = heap.allocate(100).unwrap();
//! let b = heap.allocate(200).unwrap();
//! assert_eq!(b.offset() - a.offset(), HEADER_SIZE + 104);
//!
//! // Zero-sized requests yield no handle.
//! assert_eq!(heap.allocate(0), None);
//!
//! heap.deallocate(Some(a)).unwrap();
//! heap.deallocate(Some(b)).unwrap();
//!
//! // Both chunks merged back into the single primordial chunk.
//! assert_eq!(heap.free_chunks().count(), 1);
//!
//! // Freeing twice is reported instead of corrupting the free list.
//! assert!(heap.deallocate(Some(a)).is_err());
//! ```
//!
//! # Performance Characteristics
//!
//! - **Allocation**: O(n) in the number of free chunks
//! - **Deallocation**: O(n) in the number of chunks, for handle validation
//!   and the address-ordered insertion
//! - **Memory Overhead**: [`HEADER_SIZE`] bytes per chunk, plus up to the
//!   tolerance threshold of slack when a chunk is handed out whole
//!
//! # Error Handling
//!
//! Capacity exhaustion returns `None` and emits a `warn` record through the
//! [`log`] facade. Invalid deallocations return a [`DeallocError`]. A broken
//! internal invariant is never recoverable: the heap panics rather than keep
//! handing out memory from corrupted bookkeeping.
//!
//! # Thread Safety
//!
//! [`Heap`] is `Send` but mutation needs `&mut self`. Wrap it in a
//! [`LockedHeap`] for shared access.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

mod chunk;
mod config;
mod diagnostics;
mod error;
mod heap;
mod locked;
mod store;

pub use self::{
    chunk::{ALIGN, ChunkInfo, ChunkState, HEADER_SIZE, Handle},
    config::{DEFAULT_TOLERANCE, HeapConfig},
    diagnostics::{Chunks, Dump, FreeChunks, HeapStats},
    error::{CorruptionError, DeallocError},
    heap::Heap,
    locked::LockedHeap,
};
