//! Chunk header stored in front of every chunk.
//!
//! Every chunk, free or allocated, starts with a [`ChunkHeader`] followed by
//! `size` usable bytes:
//!
//! ```text
//! Chunk Layout:
//! ┌──────────────────────────────────┬───────────────────────┐
//! │ ChunkHeader (HEADER_SIZE bytes)  │ Usable Region         │
//! │ ┌─────────────┬─────────────────┐│ (`size` bytes)        │
//! │ │ size: usize │ link: usize     ││                       │
//! │ └─────────────┴─────────────────┘│                       │
//! └──────────────────────────────────┴───────────────────────┘
//!                                    ▲
//!                                    └── Handle returned to the caller
//! ```
//!
//! The `link` word doubles as the state tag. For a free chunk it holds the
//! offset of the next free chunk (or [`LINK_END`]); for an allocated chunk it
//! holds [`LINK_ALLOCATED`].

use core::fmt;

use dataview::Pod;
use derive_more::IsVariant;

/// Alignment unit of every chunk size and every handle.
pub const ALIGN: usize = 8;

/// Footprint of a [`ChunkHeader`] inside the backing store.
pub const HEADER_SIZE: usize = size_of::<ChunkHeader>();

/// Padding needed after a usable region so that the next header stays
/// aligned.
pub const ALIGN_SLACK: usize = HEADER_SIZE.next_multiple_of(ALIGN) - HEADER_SIZE;

/// Link value of the last free chunk in the free list.
pub const LINK_END: usize = usize::MAX;

/// Link value marking an allocated chunk.
pub const LINK_ALLOCATED: usize = usize::MAX - 1;

const _: () = assert!(HEADER_SIZE.is_multiple_of(ALIGN));

/// Metadata record at the start of every chunk.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod)]
pub(crate) struct ChunkHeader {
    /// Usable bytes following the header, a multiple of [`ALIGN`].
    pub(crate) size: usize,
    /// Encoded [`Link`].
    pub(crate) link: usize,
}

impl ChunkHeader {
    pub(crate) const fn free(size: usize, next: Option<usize>) -> Self {
        Self {
            size,
            link: match next {
                Some(offset) => offset,
                None => LINK_END,
            },
        }
    }

    pub(crate) const fn link(&self) -> Link {
        match self.link {
            LINK_END => Link::End,
            LINK_ALLOCATED => Link::Allocated,
            offset => Link::Next(offset),
        }
    }

    pub(crate) const fn state(&self) -> ChunkState {
        match self.link() {
            Link::Allocated => ChunkState::Allocated,
            Link::End | Link::Next(_) => ChunkState::Free,
        }
    }

    /// Next free chunk, or `None` for the list tail and for allocated chunks.
    pub(crate) const fn next_free(&self) -> Option<usize> {
        match self.link() {
            Link::Next(offset) => Some(offset),
            Link::End | Link::Allocated => None,
        }
    }

    pub(crate) const fn set_next_free(&mut self, next: Option<usize>) {
        self.link = match next {
            Some(offset) => offset,
            None => LINK_END,
        };
    }

    pub(crate) const fn mark_allocated(&mut self) {
        self.link = LINK_ALLOCATED;
    }

    /// Bytes occupied by the header plus its usable region.
    pub(crate) const fn footprint(&self) -> usize {
        HEADER_SIZE + self.size
    }
}

/// Decoded form of [`ChunkHeader::link`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Link {
    End,
    Next(usize),
    Allocated,
}

/// State of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IsVariant)]
pub enum ChunkState {
    Free,
    Allocated,
}

impl fmt::Display for ChunkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => f.pad("free"),
            Self::Allocated => f.pad("allocated"),
        }
    }
}

/// Reference to the usable region of an allocated chunk.
///
/// The value is the byte offset of the region inside the backing store. It is
/// always at least [`HEADER_SIZE`], so `Option<Handle>` is the nullable
/// handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
#[display("{_0:#x}")]
pub struct Handle(usize);

impl Handle {
    pub(crate) const fn from_header_offset(header_offset: usize) -> Self {
        Self(header_offset + HEADER_SIZE)
    }

    /// Rebuilds a handle from a raw offset obtained through
    /// [`Handle::offset`].
    ///
    /// The value is not checked here; [`Heap::deallocate`] validates it.
    ///
    /// [`Heap::deallocate`]: crate::Heap::deallocate
    #[must_use]
    pub const fn from_offset(offset: usize) -> Self {
        Self(offset)
    }

    /// Byte offset of the usable region inside the backing store.
    #[must_use]
    pub const fn offset(self) -> usize {
        self.0
    }

    /// Byte offset of the header that precedes the usable region.
    #[must_use]
    pub const fn header_offset(self) -> Option<usize> {
        self.0.checked_sub(HEADER_SIZE)
    }
}

/// A chunk as seen by the diagnostics views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkInfo {
    /// Header offset inside the backing store.
    pub offset: usize,
    /// Usable bytes, excluding the header.
    pub size: usize,
    pub state: ChunkState,
}

impl ChunkInfo {
    /// Bytes occupied by the header plus its usable region.
    #[must_use]
    pub const fn footprint(&self) -> usize {
        HEADER_SIZE + self.size
    }

    /// Offset one past the last usable byte.
    #[must_use]
    pub const fn end(&self) -> usize {
        self.offset + self.footprint()
    }

    /// Handle of the usable region.
    #[must_use]
    pub const fn handle(&self) -> Handle {
        Handle::from_header_offset(self.offset)
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_encoding() {
        let mut header = ChunkHeader::free(64, None);
        assert_eq!(header.link(), Link::End);
        assert!(header.state().is_free());

        header.set_next_free(Some(128));
        assert_eq!(header.link(), Link::Next(128));
        assert_eq!(header.next_free(), Some(128));

        header.mark_allocated();
        assert_eq!(header.link(), Link::Allocated);
        assert!(header.state().is_allocated());
        assert_eq!(header.next_free(), None);
    }

    #[test]
    fn test_handle_header_bijection() {
        let handle = Handle::from_header_offset(48);
        assert_eq!(handle.offset(), 48 + HEADER_SIZE);
        assert_eq!(handle.header_offset(), Some(48));
        assert_eq!(Handle::from_offset(HEADER_SIZE - 1).header_offset(), None);
    }

    #[test]
    fn test_footprint() {
        let info = ChunkInfo {
            offset: 32,
            size: 24,
            state: ChunkState::Free,
        };
        assert_eq!(info.footprint(), HEADER_SIZE + 24);
        assert_eq!(info.end(), 32 + HEADER_SIZE + 24);
        assert_eq!(ChunkHeader::free(24, None).footprint(), info.footprint());
    }
}
