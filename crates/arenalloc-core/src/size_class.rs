//! Size classification and alignment.
//!
//! Turns a caller's requested payload size into a *planned* total block
//! size (header included, word-aligned) and routes it to one of the two
//! placement strategies: the arena pool for small requests, direct OS
//! mapping for large ones.

use arenalloc_raw::{word_align, FOOTER_SIZE, HEADER_SIZE};

/// Arena size: 8 MiB, fixed for the lifetime of the process.
pub const ARENA_SIZE: usize = 8 * 1024 * 1024;

/// A request is large if its planned total size is at least this many
/// bytes — one sixteenth of [`ARENA_SIZE`] (512 KiB). Left as a `const`
/// rather than a build-time parameter; spec.md §9 notes this threshold is
/// an unjustified tuning constant and either choice is conforming.
pub const LARGE_THRESHOLD: usize = ARENA_SIZE / 16;

/// Minimum payload a split-off remainder block must carry to be worth
/// keeping as its own free block, rather than left attached to the block
/// being carved from.
pub const MIN_SPLIT_PAYLOAD: usize = 32;

/// The smallest total size any block may ever have: a header, a footer,
/// and the minimum payload a standalone block is allowed to carry.
pub const MIN_BLOCK_SIZE: usize = HEADER_SIZE + FOOTER_SIZE + MIN_SPLIT_PAYLOAD;

/// The planned total size (header + word-aligned payload + footer) for a
/// request, and which placement strategy it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    /// Total bytes to allocate, header and footer included.
    pub total: usize,
    /// `true` routes to the arena pool, `false` to the global/OS path.
    pub small: bool,
}

/// Classifies a raw payload size into a [`Plan`].
///
/// Returns `None` for a zero-byte request — per spec.md §4.1 this must be
/// rejected immediately with no state change, before any list is touched.
#[must_use]
pub fn classify(payload_size: usize) -> Option<Plan> {
    if payload_size == 0 {
        return None;
    }

    let total = (HEADER_SIZE + word_align(payload_size) + FOOTER_SIZE).max(MIN_BLOCK_SIZE);
    Some(Plan {
        total,
        small: total < LARGE_THRESHOLD,
    })
}

/// The usable payload capacity a caller may rely on for a block whose total
/// size (header, payload, and footer) is `block_total`.
///
/// This is always at least as large as the size originally requested — the
/// footer occupies bookkeeping space beyond what [`classify`] already
/// reserved for the request, never eating into it.
#[must_use]
pub const fn usable_capacity(block_total: usize) -> usize {
    block_total - HEADER_SIZE - FOOTER_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_rejected() {
        assert_eq!(classify(0), None);
    }

    #[test]
    fn small_request_is_word_aligned_and_routed_to_arena() {
        let plan = classify(1).unwrap();
        assert!(plan.small);
        assert_eq!(plan.total, MIN_BLOCK_SIZE.max(HEADER_SIZE + arenalloc_raw::WORD_SIZE + FOOTER_SIZE));
    }

    #[test]
    fn usable_capacity_never_undershoots_the_request() {
        for payload in [1usize, 7, 31, 32, 33, 512, 4096] {
            let plan = classify(payload).unwrap();
            assert!(usable_capacity(plan.total) >= payload);
        }
    }

    #[test]
    fn threshold_boundary_is_exclusive_of_small() {
        // A payload whose planned total lands exactly on the threshold is
        // "large" per spec.md §4.1 ("strictly less than" is small).
        let payload_at_threshold = LARGE_THRESHOLD - HEADER_SIZE - FOOTER_SIZE;
        let plan = classify(payload_at_threshold).unwrap();
        assert_eq!(plan.total, LARGE_THRESHOLD);
        assert!(!plan.small);

        let plan_just_under = classify(payload_at_threshold - arenalloc_raw::WORD_SIZE).unwrap();
        assert!(plan_just_under.small);
    }

    #[test]
    fn large_request_is_routed_to_global_path() {
        let plan = classify(4 * 1024 * 1024).unwrap();
        assert!(!plan.small);
    }
}
