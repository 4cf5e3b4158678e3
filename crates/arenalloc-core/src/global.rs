//! Global free list: large requests mapped directly from the OS.
//!
//! A global block starts life as its own standalone anonymous mapping, but
//! splitting can carve one mapping into several independently-tracked
//! blocks, so physical adjacency within this list is possible and worth
//! recombining on release — exactly the splitting/coalescing rules the
//! arena pool applies, minus the cross-arena bookkeeping (a global mapping
//! never needs to be located by address the way an arena does). Released
//! blocks stay mapped and join a flat free list; a later request that fits
//! inside one is served from it first-fit, before this allocator asks the
//! OS for anything new. Mappings are never individually unmapped — a split
//! remainder and the block it was carved from share one mapping for the
//! rest of the process's life.

use std::ptr::NonNull;

use arenalloc_raw::{
    block_end, init_header, is_live, next_of, payload_of, set_live, set_next, set_size, size_of_block, BlockHeader,
};

use crate::size_class::MIN_BLOCK_SIZE;

/// The free list of released (but still-mapped) large blocks.
#[derive(Default)]
pub struct GlobalList {
    head: Option<NonNull<BlockHeader>>,
}

impl GlobalList {
    /// An empty global free list.
    #[must_use]
    pub const fn new() -> Self {
        Self { head: None }
    }

    /// Finds and unlinks the first free block of at least `total` bytes, if
    /// one exists, splitting off a worthwhile remainder exactly as the
    /// arena pool does (spec.md §4.3: "apply the same split rule as §4.2").
    /// Does not mark the returned block live — call [`claim`] on it.
    #[must_use]
    pub fn find_fit(&mut self, total: usize) -> Option<NonNull<BlockHeader>> {
        let mut prev: Option<NonNull<BlockHeader>> = None;
        let mut cursor = self.head;
        // SAFETY: every node reachable from `self.head` is a live
        // BlockHeader belonging to a mapping this list owns.
        unsafe {
            while let Some(block) = cursor {
                if size_of_block(block) >= total {
                    let next = next_of(block);
                    match prev {
                        Some(p) => set_next(p, next),
                        None => self.head = next,
                    }
                    self.split_if_possible(block, total);
                    return Some(block);
                }
                prev = Some(block);
                cursor = next_of(block);
            }
        }
        None
    }

    /// Shrinks `block` to `total` bytes and pushes the leftover remainder
    /// back onto this list, provided it is large enough to stand as a
    /// block of its own — mirrors [`crate::arena`]'s split rule.
    ///
    /// # Safety
    ///
    /// `block` must have just been unlinked from this list and be at least
    /// `total` bytes long.
    unsafe fn split_if_possible(&mut self, block: NonNull<BlockHeader>, total: usize) {
        // SAFETY: forwarded from this method's contract.
        unsafe {
            let remainder = size_of_block(block) - total;
            if remainder < MIN_BLOCK_SIZE {
                return;
            }
            set_size(block, total);
            let split_at = NonNull::new_unchecked(block_end(block));
            let tail = init_header(split_at, remainder, 0, false);
            set_next(tail, self.head);
            self.head = Some(tail);
        }
    }

    /// Maps a fresh standalone region of exactly `total` bytes and
    /// initializes a live block header at its start.
    #[must_use]
    pub fn allocate_fresh(total: usize) -> Option<NonNull<BlockHeader>> {
        let mapping = arenalloc_mmap::map_anonymous(total)?;
        // SAFETY: `mapping` is a fresh, exclusively-owned region of exactly
        // `total` bytes.
        Some(unsafe { init_header(mapping, total, 0, true) })
    }

    /// Marks `block` free, coalesces it with any physically-adjacent free
    /// entry already on this list (forward and backward, per spec.md §4.4
    /// "attempt to coalesce with any global free-list entry that is
    /// physically adjacent"), and pushes the result onto the head of this
    /// list. The underlying mapping(s) are never unmapped — only reused by
    /// a later [`find_fit`](Self::find_fit).
    pub fn release(&mut self, block: NonNull<BlockHeader>) {
        // SAFETY: `block` is a live global block, per this function's
        // contract.
        unsafe {
            set_live(block, false);

            let mut merged = block;
            let mut merged_size = size_of_block(merged);
            let merged_start = merged.cast::<u8>().as_ptr() as usize;

            // Forward: a free entry beginning exactly where this one ends.
            if let Some((_, fwd_size)) = self.take_adjacent(|addr, _| addr == merged_start + merged_size) {
                merged_size += fwd_size;
                set_size(merged, merged_size);
            }

            // Backward: a free entry ending exactly where this one begins.
            if let Some((back, back_size)) = self.take_adjacent(|addr, size| addr + size == merged_start) {
                merged = back;
                merged_size += back_size;
                set_size(merged, merged_size);
            }

            set_next(merged, self.head);
            self.head = Some(merged);
        }
    }

    /// Returns the liveness flag of the free-list node whose address equals
    /// `target`'s, if one is currently on this list.
    ///
    /// `target` is only ever compared by address here, never dereferenced —
    /// safe to call even when `target` no longer points at mapped memory.
    /// Every node actually walked is a live, mapped entry this list owns.
    #[must_use]
    pub fn find_live_flag(&self, target: NonNull<BlockHeader>) -> Option<bool> {
        let mut cursor = self.head;
        // SAFETY: every node reachable from `self.head` is a live, mapped
        // BlockHeader belonging to a mapping this list owns.
        unsafe {
            while let Some(node) = cursor {
                if node == target {
                    return Some(is_live(node));
                }
                cursor = next_of(node);
            }
        }
        None
    }

    /// Removes and returns the first free-list entry whose address and size
    /// satisfy `pred(address, size)`, along with its size.
    ///
    /// # Safety
    ///
    /// Every node reachable from `self.head` must be a live [`BlockHeader`]
    /// belonging to a mapping this list owns.
    unsafe fn take_adjacent(&mut self, mut pred: impl FnMut(usize, usize) -> bool) -> Option<(NonNull<BlockHeader>, usize)> {
        let mut prev: Option<NonNull<BlockHeader>> = None;
        let mut cursor = self.head;
        // SAFETY: forwarded from this method's contract.
        unsafe {
            while let Some(node) = cursor {
                let addr = node.cast::<u8>().as_ptr() as usize;
                let size = size_of_block(node);
                if pred(addr, size) {
                    let next = next_of(node);
                    match prev {
                        Some(p) => set_next(p, next),
                        None => self.head = next,
                    }
                    return Some((node, size));
                }
                prev = Some(node);
                cursor = next;
            }
        }
        None
    }
}

/// Marks a block claimed from [`GlobalList::find_fit`] live and returns its
/// payload address.
#[must_use]
pub fn claim(block: NonNull<BlockHeader>) -> NonNull<u8> {
    // SAFETY: `block` was just unlinked from the free list, still valid.
    unsafe { set_live(block, true) };
    payload_of(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_allocation_is_live_immediately() {
        let block = GlobalList::allocate_fresh(4096).expect("mapping should succeed");
        assert!(unsafe { is_live(block) });
        assert_eq!(unsafe { size_of_block(block) }, 4096);
        // SAFETY: block owns a standalone 4096-byte mapping.
        unsafe { arenalloc_mmap::unmap(block.cast::<u8>(), 4096) };
    }

    #[test]
    fn released_block_is_reused_by_a_later_fit() {
        let mut list = GlobalList::new();
        let block = GlobalList::allocate_fresh(8192).unwrap();
        let first_payload = payload_of(block);

        list.release(block);
        assert!(!unsafe { is_live(block) });

        let reused = list.find_fit(8192).expect("the released block should satisfy this request");
        assert_eq!(reused, block);
        let second_payload = claim(reused);
        assert_eq!(first_payload, second_payload);

        // SAFETY: block owns a standalone 8192-byte mapping.
        unsafe { arenalloc_mmap::unmap(block.cast::<u8>(), 8192) };
    }

    #[test]
    fn find_fit_skips_blocks_that_are_too_small() {
        let mut list = GlobalList::new();
        let small = GlobalList::allocate_fresh(4096).unwrap();
        list.release(small);

        assert!(list.find_fit(8192).is_none());

        // SAFETY: small owns a standalone 4096-byte mapping.
        unsafe { arenalloc_mmap::unmap(small.cast::<u8>(), 4096) };
    }

    #[test]
    fn find_fit_splits_an_oversized_block_and_frees_the_remainder() {
        let mut list = GlobalList::new();
        let mapping = GlobalList::allocate_fresh(1 << 20).unwrap();
        list.release(mapping);

        let fit = list.find_fit(4096).expect("a 1 MiB free entry satisfies a 4 KiB request");
        assert_eq!(unsafe { size_of_block(fit) }, 4096);

        // The leftover was pushed back as its own free entry, inspected
        // directly rather than through `find_fit` (which would split it
        // again for a smaller request than its full size).
        let remainder = list.head.expect("the split remainder should be on the list");
        assert_eq!(unsafe { size_of_block(remainder) }, (1 << 20) - 4096);

        // SAFETY: both halves live within the one 1 MiB mapping.
        unsafe { arenalloc_mmap::unmap(mapping.cast::<u8>(), 1 << 20) };
    }

    #[test]
    fn release_recombines_a_split_block_with_its_physically_adjacent_remainder() {
        let mut list = GlobalList::new();
        let mapping = GlobalList::allocate_fresh(1 << 20).unwrap();
        let front = claim(mapping);
        let front_header = unsafe { arenalloc_raw::header_of(front) };
        // The mapping was never split yet, so claim just marks it live at
        // full size; shrink it by hand to the size a real find_fit split
        // would have produced, then carve off the same remainder find_fit
        // would, to set up two physically-adjacent free neighbours.
        unsafe { set_size(front_header, 8192) };
        let tail_addr = unsafe { NonNull::new_unchecked(block_end(front_header)) };
        let tail = unsafe { init_header(tail_addr, (1 << 20) - 8192, 0, false) };
        list.release(tail);

        list.release(front_header);

        // Inspect the list directly rather than through `find_fit`, which
        // would itself re-split a block this large.
        let whole = list.head.expect("release should have produced exactly one free entry");
        assert_eq!(unsafe { size_of_block(whole) }, 1 << 20, "release should coalesce physically-adjacent global blocks");
        assert_eq!(unsafe { next_of(whole) }, None, "the two halves should have merged into a single entry");

        // SAFETY: the recombined entry spans the entire original mapping.
        unsafe { arenalloc_mmap::unmap(whole.cast::<u8>(), 1 << 20) };
    }
}
