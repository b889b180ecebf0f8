use snafu::Snafu;
use snafu_utils::{Location, Report};

use crate::chunk::Handle;

/// Reasons [`Heap::deallocate`](crate::Heap::deallocate) refuses a handle.
///
/// A rejected call leaves the heap untouched.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DeallocError {
    #[snafu(display("null handle passed to deallocate"))]
    NullHandle {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("handle {handle} is outside the heap or misaligned"))]
    InvalidHandle {
        handle: Handle,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("handle {handle} does not start a chunk of this heap"))]
    UnknownHandle {
        handle: Handle,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("handle {handle} is already free"))]
    AlreadyFree {
        handle: Handle,
        #[snafu(implicit)]
        location: Location,
    },
}

impl DeallocError {
    /// Where the rejection was raised.
    #[must_use]
    pub fn location(&self) -> Location {
        match self {
            Self::NullHandle { location }
            | Self::InvalidHandle { location, .. }
            | Self::UnknownHandle { location, .. }
            | Self::AlreadyFree { location, .. } => *location,
        }
    }
}

/// Broken heap bookkeeping, as found by [`Heap::check`](crate::Heap::check).
///
/// Inside allocate and deallocate the same conditions are fatal.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CorruptionError {
    #[snafu(display("chunk header at {offset:#x} lies outside the {capacity}-byte store"))]
    OutOfBounds {
        offset: usize,
        capacity: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("chunk at {offset:#x} has unaligned size {size}"))]
    MisalignedSize {
        offset: usize,
        size: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("walk exceeded the maximum of {limit} chunks"))]
    ChunkCountExceeded {
        limit: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("chunks end at {end:#x} instead of the capacity {capacity:#x}"))]
    PartitionMismatch {
        end: usize,
        capacity: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("free list points at allocated chunk {offset:#x}"))]
    NotTaggedFree {
        offset: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("free chunk {offset:#x} is missing from the free list or out of order"))]
    UntrackedFree {
        offset: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("free list entry {offset:#x} does not start a chunk"))]
    DanglingLink {
        offset: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("free chunks {left:#x} and {right:#x} are adjacent but not coalesced"))]
    AdjacentFree {
        left: usize,
        right: usize,
        #[snafu(implicit)]
        location: Location,
    },
}

impl CorruptionError {
    /// Where the violation was detected.
    #[must_use]
    pub fn location(&self) -> Location {
        match self {
            Self::OutOfBounds { location, .. }
            | Self::MisalignedSize { location, .. }
            | Self::ChunkCountExceeded { location, .. }
            | Self::PartitionMismatch { location, .. }
            | Self::NotTaggedFree { location, .. }
            | Self::UntrackedFree { location, .. }
            | Self::DanglingLink { location, .. }
            | Self::AdjacentFree { location, .. } => *location,
        }
    }
}

/// Aborts on a consistency violation; continuing would corrupt memory.
#[track_caller]
pub(crate) fn fatal(err: CorruptionError) -> ! {
    let location = err.location();
    log::error!("heap consistency violation: {err}");
    panic!("heap consistency violation\n\n{}", Report::new(err).at(location));
}
