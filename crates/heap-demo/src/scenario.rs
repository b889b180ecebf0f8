//! Canned call sequences run against a heap.

use arrayvec::ArrayVec;
use fixed_heap::{DeallocError, HEADER_SIZE, Handle, Heap};
use log::{debug, info};
use snafu::{OptionExt as _, ResultExt as _, whatever};
use snafu_utils::GenericError;

/// Allocates sizes `0..count`, freeing each even-indexed allocation right
/// after it is made.
pub fn sequence<const CAP: usize>(heap: &mut Heap<CAP>, count: usize) -> Result<(), GenericError> {
    for size in 0..count {
        let handle = heap.allocate(size);
        debug!("allocate({size}) -> {handle:?}");
        if size % 2 != 0 {
            continue;
        }
        match heap.deallocate(handle) {
            Ok(()) => {}
            // allocate(0) hands out no chunk
            Err(err @ DeallocError::NullHandle { .. }) => {
                debug!("allocation #{size}: {err} at {}", err.location());
            }
            Err(err) => {
                return Err(err).whatever_context(format!("failed to free allocation #{size}"));
            }
        }
    }
    heap.check().whatever_context("heap check failed after sequence")?;
    info!("sequence of {count} allocations done");
    Ok(())
}

/// Allocates nearly all of the heap, frees it, and allocates it again.
pub fn reuse<const CAP: usize>(heap: &mut Heap<CAP>) -> Result<(), GenericError> {
    let size = CAP
        .checked_sub(100 + HEADER_SIZE)
        .whatever_context("heap too small for the reuse scenario")?;

    let first = heap
        .allocate(size)
        .whatever_context("first large allocation failed")?;
    let chunks = heap.chunks().count();
    heap.deallocate(Some(first))
        .whatever_context("failed to free large allocation")?;
    let second = heap
        .allocate(size)
        .whatever_context("second large allocation failed")?;

    if first != second {
        whatever!("large allocation moved from {first} to {second}");
    }
    if heap.chunks().count() != chunks {
        whatever!("chunk count changed from {chunks} to {}", heap.chunks().count());
    }
    println!("{size}-byte allocation reused in place at {first}");
    Ok(())
}

/// Deterministic mix of allocations and frees with a consistency check after
/// every call.
pub fn churn<const CAP: usize>(
    heap: &mut Heap<CAP>,
    rounds: usize,
    seed: u64,
) -> Result<(), GenericError> {
    let mut rng = XorShift::new(seed);
    let mut live = ArrayVec::<Handle, 256>::new();
    let mut failed = 0;

    for round in 0..rounds {
        let free = !live.is_empty() && (live.is_full() || rng.below(3) == 0);
        if free {
            let handle = live.swap_remove(rng.below(live.len()));
            heap.deallocate(Some(handle))
                .whatever_context(format!("round {round}: failed to free {handle}"))?;
        } else {
            let size = rng.below(512) + 1;
            match heap.allocate(size) {
                Some(handle) => live.push(handle),
                None => failed += 1,
            }
        }
        heap.check()
            .whatever_context(format!("round {round}: heap check failed"))?;
    }

    println!(
        "{rounds} rounds: {} live allocations, {failed} failed allocations",
        live.len()
    );
    Ok(())
}

struct XorShift(u64);

impl XorShift {
    fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    fn below(&mut self, bound: usize) -> usize {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        #[expect(clippy::cast_possible_truncation)]
        let value = x as usize;
        value % bound
    }
}
