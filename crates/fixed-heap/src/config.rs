use crate::chunk::ALIGN;

/// Default tolerance threshold in bytes.
pub const DEFAULT_TOLERANCE: usize = 64;

/// Tunables of a [`Heap`](crate::Heap).
///
/// The tolerance threshold decides between splitting a free chunk and handing
/// it out whole: a chunk is split only if the remainder left behind would
/// have at least `tolerance` usable bytes. Smaller remainders stay attached
/// to the allocation as internal slack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
    tolerance: usize,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl HeapConfig {
    /// Configuration with [`DEFAULT_TOLERANCE`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    #[must_use]
    pub const fn with_tolerance(self, tolerance: usize) -> Self {
        Self { tolerance }
    }

    #[must_use]
    pub const fn tolerance(&self) -> usize {
        self.tolerance
    }

    /// Smallest remainder a split is allowed to leave behind.
    ///
    /// Never below [`ALIGN`], so a split cannot produce an empty chunk.
    pub(crate) const fn min_remainder(&self) -> usize {
        if self.tolerance < ALIGN {
            ALIGN
        } else {
            self.tolerance
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tolerance() {
        assert_eq!(HeapConfig::default().tolerance(), DEFAULT_TOLERANCE);
        assert_eq!(HeapConfig::default().min_remainder(), DEFAULT_TOLERANCE);
    }

    #[test]
    fn test_min_remainder_never_below_alignment() {
        let config = HeapConfig::new().with_tolerance(0);
        assert_eq!(config.tolerance(), 0);
        assert_eq!(config.min_remainder(), ALIGN);

        let config = HeapConfig::new().with_tolerance(100);
        assert_eq!(config.min_remainder(), 100);
    }
}
