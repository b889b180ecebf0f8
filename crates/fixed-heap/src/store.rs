//! Fixed-capacity backing store.

use dataview::DataView;

use crate::{
    chunk::{ChunkHeader, HEADER_SIZE, LINK_END},
    error::{CorruptionError, OutOfBoundsSnafu, fatal},
};

const WORD: usize = size_of::<usize>();
const _: () = assert!(HEADER_SIZE == 2 * WORD);

/// Zero-initialized, 8-byte aligned storage of `CAP` bytes.
///
/// All chunk accesses go through byte offsets; an offset whose header would
/// not fit in the store is a consistency violation and aborts.
#[repr(C, align(8))]
pub(crate) struct BackingStore<const CAP: usize> {
    bytes: [u8; CAP],
}

impl<const CAP: usize> BackingStore<CAP> {
    /// Store holding the primordial free chunk: one header at offset 0
    /// describing `CAP - HEADER_SIZE` usable bytes.
    pub(crate) const fn primordial() -> Self {
        let mut bytes = [0; CAP];
        let size = (CAP - HEADER_SIZE).to_ne_bytes();
        let link = LINK_END.to_ne_bytes();
        let mut i = 0;
        while i < WORD {
            bytes[i] = size[i];
            bytes[WORD + i] = link[i];
            i += 1;
        }
        Self { bytes }
    }

    pub(crate) fn try_header(&self, offset: usize) -> Option<ChunkHeader> {
        DataView::from(&self.bytes[..])
            .try_get::<ChunkHeader>(offset)
            .copied()
    }

    #[track_caller]
    pub(crate) fn header(&self, offset: usize) -> ChunkHeader {
        self.try_header(offset)
            .unwrap_or_else(|| fatal(Self::out_of_bounds(offset)))
    }

    #[track_caller]
    pub(crate) fn set_header(&mut self, offset: usize, header: ChunkHeader) {
        match DataView::from_mut(&mut self.bytes[..]).try_get_mut::<ChunkHeader>(offset) {
            Some(slot) => *slot = header,
            None => fatal(Self::out_of_bounds(offset)),
        }
    }

    /// Usable bytes of the chunk whose header is at `offset`.
    #[track_caller]
    pub(crate) fn region(&self, offset: usize, size: usize) -> &[u8] {
        let start = offset + HEADER_SIZE;
        self.bytes
            .get(start..start + size)
            .unwrap_or_else(|| fatal(Self::out_of_bounds(offset)))
    }

    #[track_caller]
    pub(crate) fn region_mut(&mut self, offset: usize, size: usize) -> &mut [u8] {
        let start = offset + HEADER_SIZE;
        self.bytes
            .get_mut(start..start + size)
            .unwrap_or_else(|| fatal(Self::out_of_bounds(offset)))
    }

    #[track_caller]
    fn out_of_bounds(offset: usize) -> CorruptionError {
        OutOfBoundsSnafu {
            offset,
            capacity: CAP,
        }
        .build()
    }
}
