//! Arena pool: fixed-size mapped regions serving small requests.
//!
//! Each arena is one anonymous mapping of [`size_class::ARENA_SIZE`] bytes,
//! an [`ArenaHeader`] at its front followed by a data region that is always
//! fully partitioned into blocks — live or free, nothing unaccounted for.
//! Arenas are chained into a singly-linked sequence owned by the Manager;
//! this module operates on one arena (or the sequence as a whole for
//! first-fit search) without knowing anything about the global free list.

use std::ptr::NonNull;

use arenalloc_raw::{
    arena_data_start, block_end, free_list_of, header_of, init_arena_header, init_header, is_live,
    next_arena_of, next_of, payload_of, set_free_list, set_live, set_next, set_next_arena, set_size,
    size_before, size_of_block, ArenaHeader, BlockHeader, ARENA_HEADER_SIZE,
};

use crate::size_class::{self, ARENA_SIZE, MIN_BLOCK_SIZE};

/// Bytes available to blocks in one arena: the mapping minus its header.
pub const DATA_SIZE: usize = ARENA_SIZE - ARENA_HEADER_SIZE;

/// Maps a fresh arena, prepending it ahead of `next` in the sequence.
///
/// The new arena starts life as one free block spanning its entire data
/// region — the initial state every arena returns to once everything in it
/// has been released, which is what makes whole-arena reclamation just a
/// size comparison.
#[must_use]
pub fn fresh(next: Option<NonNull<ArenaHeader>>) -> Option<NonNull<ArenaHeader>> {
    let mapping = arenalloc_mmap::map_anonymous(ARENA_SIZE)?;
    // SAFETY: `mapping` is a fresh, exclusively-owned region of ARENA_SIZE
    // bytes, large enough for an ArenaHeader followed by DATA_SIZE bytes.
    unsafe {
        let header = init_arena_header(mapping, next, None);
        let data = arena_data_start(header);
        let first_block = init_header(data, DATA_SIZE, 0, false);
        set_free_list(header, Some(first_block));
        Some(header)
    }
}

/// Unmaps an arena previously returned by [`fresh`].
///
/// # Safety
///
/// `arena` must not be reachable from the Manager's arena sequence, and no
/// pointer into its data region may be used again after this call.
pub unsafe fn unmap(arena: NonNull<ArenaHeader>) {
    // SAFETY: forwarded from the caller's contract; ARENA_SIZE is exactly
    // the length `fresh` mapped.
    unsafe { arenalloc_mmap::unmap(arena.cast::<u8>(), ARENA_SIZE) };
}

/// Start of an arena's data region.
#[must_use]
pub fn data_start(arena: NonNull<ArenaHeader>) -> NonNull<u8> {
    arena_data_start(arena)
}

/// One past the end of an arena's data region.
#[must_use]
pub fn data_end(arena: NonNull<ArenaHeader>) -> *mut u8 {
    data_start(arena).as_ptr().wrapping_add(DATA_SIZE)
}

/// Whether `header` lies within `arena`'s data region.
#[must_use]
pub fn contains(arena: NonNull<ArenaHeader>, header: NonNull<BlockHeader>) -> bool {
    let addr = header.as_ptr() as usize;
    let start = data_start(arena).as_ptr() as usize;
    let end = data_end(arena) as usize;
    addr >= start && addr < end
}

/// Searches the arena sequence starting at `head` for a free block of at
/// least `total` bytes, first-fit. On success, the block has already been
/// unlinked from its arena's free list and split (if a worthwhile remainder
/// exists) — the caller only needs to mark it live and hand out its
/// payload.
#[must_use]
pub fn find_fit(head: Option<NonNull<ArenaHeader>>, total: usize) -> Option<(NonNull<ArenaHeader>, NonNull<BlockHeader>)> {
    let mut cursor = head;
    while let Some(arena) = cursor {
        if let Some(block) = find_fit_in_arena(arena, total) {
            return Some((arena, block));
        }
        // SAFETY: every arena reachable from the Manager's sequence is a
        // live ArenaHeader produced by `fresh`.
        cursor = unsafe { next_arena_of(arena) };
    }
    None
}

/// Searches a single arena's free list, first-fit.
fn find_fit_in_arena(arena: NonNull<ArenaHeader>, total: usize) -> Option<NonNull<BlockHeader>> {
    // SAFETY: `arena` is a live ArenaHeader; every node reachable from its
    // free list is a live BlockHeader within its data region.
    unsafe {
        let mut cursor = free_list_of(arena);
        while let Some(block) = cursor {
            if size_of_block(block) >= total {
                free_list_remove(arena, block);
                split_if_possible(arena, block, total);
                return Some(block);
            }
            cursor = next_of(block);
        }
    }
    None
}

/// Returns the payload address for a freshly-placed arena block, marking it
/// live. Call this once [`find_fit`] has returned a block.
#[must_use]
pub fn claim(block: NonNull<BlockHeader>) -> NonNull<u8> {
    // SAFETY: `block` was just returned by `find_fit`, still a valid header.
    unsafe { set_live(block, true) };
    payload_of(block)
}

/// Shrinks `block` to `total` bytes and pushes the leftover remainder back
/// onto `arena`'s free list, provided the remainder is large enough to
/// stand as a block of its own. Otherwise `block` keeps its full size and
/// the caller receives a few bytes more than requested.
fn split_if_possible(arena: NonNull<ArenaHeader>, block: NonNull<BlockHeader>, total: usize) {
    // SAFETY: `block` is a live header with at least `total` bytes, per
    // this function's callers.
    unsafe {
        let remainder = size_of_block(block) - total;
        if remainder < MIN_BLOCK_SIZE {
            return;
        }
        set_size(block, total);
        let split_at = NonNull::new_unchecked(block_end(block));
        let tail = init_header(split_at, remainder, 0, false);
        free_list_push(arena, tail);
    }
}

/// Releases a live arena block: marks it free, coalesces with whatever
/// physically-adjacent blocks are also free, and reports whether the
/// arena's entire data region has collapsed into a single free block (in
/// which case the caller should unmap the arena).
#[must_use]
pub fn release(arena: NonNull<ArenaHeader>, header: NonNull<BlockHeader>) -> bool {
    // SAFETY: `header` is a live block within `arena`'s data region, per
    // this function's contract.
    unsafe {
        set_live(header, false);

        let mut merged = header;

        // Forward: the block immediately after us, if free, is absorbed.
        let successor_addr = block_end(merged);
        if (successor_addr as usize) < data_end(arena) as usize {
            let successor = NonNull::new_unchecked(successor_addr).cast::<BlockHeader>();
            if !is_live(successor) {
                free_list_remove(arena, successor);
                set_size(merged, size_of_block(merged) + size_of_block(successor));
            }
        }

        // Backward: find the block immediately before us via its boundary
        // tag. If it is free, it absorbs us instead of us joining the free
        // list as a new node.
        let block_addr = merged.cast::<u8>();
        if block_addr.as_ptr() as usize > data_start(arena).as_ptr() as usize {
            let predecessor_size = size_before(block_addr);
            let predecessor_addr = NonNull::new_unchecked(block_addr.as_ptr().sub(predecessor_size));
            let predecessor = predecessor_addr.cast::<BlockHeader>();
            if !is_live(predecessor) {
                set_size(predecessor, predecessor_size + size_of_block(merged));
                merged = predecessor;
            } else {
                free_list_push(arena, merged);
            }
        } else {
            free_list_push(arena, merged);
        }

        size_of_block(merged) == DATA_SIZE
    }
}

/// Removes `target` from `arena`'s free list. `target` must currently be a
/// member of that list.
///
/// # Safety
///
/// `target` must be reachable from `arena`'s free list.
unsafe fn free_list_remove(arena: NonNull<ArenaHeader>, target: NonNull<BlockHeader>) {
    // SAFETY: forwarded from the caller's contract.
    unsafe {
        let head = free_list_of(arena);
        if head == Some(target) {
            set_free_list(arena, next_of(target));
            return;
        }
        let mut prev = head.expect("target must be reachable from the free list");
        loop {
            let next = next_of(prev);
            if next == Some(target) {
                set_next(prev, next_of(target));
                return;
            }
            prev = next.expect("target must be reachable from the free list");
        }
    }
}

/// Pushes `block` onto the head of `arena`'s free list.
///
/// # Safety
///
/// `block` must not already be a member of any free list.
unsafe fn free_list_push(arena: NonNull<ArenaHeader>, block: NonNull<BlockHeader>) {
    // SAFETY: forwarded from the caller's contract.
    unsafe {
        let head = free_list_of(arena);
        set_next(block, head);
        set_free_list(arena, Some(block));
    }
}

/// Returns whether `target` currently appears on `arena`'s free list, by
/// pointer identity.
///
/// `target` is only ever compared by address here, never dereferenced —
/// this is safe to call even when `target` no longer points at mapped
/// memory (e.g. its arena was already reclaimed), as long as `arena`
/// itself is still a live, mapped [`ArenaHeader`].
#[must_use]
pub fn free_list_contains(arena: NonNull<ArenaHeader>, target: NonNull<BlockHeader>) -> bool {
    // SAFETY: every node reachable from `arena`'s free list is a live,
    // mapped BlockHeader; `target` is compared by pointer value only.
    unsafe {
        let mut cursor = free_list_of(arena);
        while let Some(block) = cursor {
            if block == target {
                return true;
            }
            cursor = next_of(block);
        }
    }
    false
}

/// Recovers the owning arena's header for a live block, by linear scan of
/// the sequence. Used on release to decide whether a block belongs to the
/// arena pool at all (see [`crate::manager`]'s dispatch).
///
/// `header` is only ever compared by address against each arena's data
/// bounds here, never dereferenced — safe to call even when `header` no
/// longer points at mapped memory.
#[must_use]
pub fn find_containing(head: Option<NonNull<ArenaHeader>>, header: NonNull<BlockHeader>) -> Option<NonNull<ArenaHeader>> {
    let mut cursor = head;
    while let Some(arena) = cursor {
        if contains(arena, header) {
            return Some(arena);
        }
        // SAFETY: every arena reachable from the sequence is live.
        cursor = unsafe { next_arena_of(arena) };
    }
    None
}

/// Unlinks `target` from the arena sequence rooted at `head`, returning the
/// new head. `target` must be reachable from `head`.
#[must_use]
pub fn unlink(head: Option<NonNull<ArenaHeader>>, target: NonNull<ArenaHeader>) -> Option<NonNull<ArenaHeader>> {
    // SAFETY: every arena reachable from `head` is a live ArenaHeader.
    unsafe {
        if head == Some(target) {
            return next_arena_of(target);
        }
        let mut prev = head.expect("target must be reachable from the arena sequence");
        loop {
            let next = next_arena_of(prev);
            if next == Some(target) {
                set_next_arena(prev, next_arena_of(target));
                return head;
            }
            prev = next.expect("target must be reachable from the arena sequence");
        }
    }
}

/// Recovers a live block's header from a payload pointer previously handed
/// out by this arena pool (or the global path — the dispatch happens one
/// level up, in [`crate::manager`]).
#[must_use]
pub fn header_from_payload(payload: NonNull<u8>) -> NonNull<BlockHeader> {
    // SAFETY: `payload` is assumed, by this function's contract, to be an
    // address this allocator previously returned.
    unsafe { header_of(payload) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_arena_is_one_free_block_spanning_data_region() {
        let arena = fresh(None).expect("mapping should succeed");
        let block = arenalloc_raw::free_list_of(arena).expect("fresh arena has one free block");
        assert_eq!(unsafe { size_of_block(block) }, DATA_SIZE);
        assert!(!unsafe { is_live(block) });
        // SAFETY: arena is not reachable from any sequence.
        unsafe { unmap(arena) };
    }

    #[test]
    fn find_fit_splits_and_marks_live() {
        let arena = fresh(None).unwrap();
        let (found_arena, block) = find_fit(Some(arena), 256).expect("arena has room");
        assert_eq!(found_arena, arena);
        assert_eq!(unsafe { size_of_block(block) }, 256);
        let payload = claim(block);
        assert!(unsafe { is_live(block) });
        assert_eq!(header_from_payload(payload), block);

        let remainder = arenalloc_raw::free_list_of(arena).expect("split remainder is on the free list");
        assert_eq!(unsafe { size_of_block(remainder) }, DATA_SIZE - 256);
        unsafe { unmap(arena) };
    }

    #[test]
    fn adjacent_releases_coalesce_and_reclaim_whole_arena() {
        let arena = fresh(None).unwrap();
        let (_, b1) = find_fit(Some(arena), 256).unwrap();
        claim(b1);
        let (_, b2) = find_fit(Some(arena), 256).unwrap();
        claim(b2);

        assert!(!release(arena, b1));
        assert!(release(arena, b2));

        let head = arenalloc_raw::free_list_of(arena).expect("arena collapsed to one free block");
        assert_eq!(unsafe { size_of_block(head) }, DATA_SIZE);
        unsafe { unmap(arena) };
    }

    #[test]
    fn non_adjacent_releases_do_not_falsely_coalesce() {
        let arena = fresh(None).unwrap();
        let (_, b1) = find_fit(Some(arena), 256).unwrap();
        claim(b1);
        let (_, b2) = find_fit(Some(arena), 256).unwrap();
        claim(b2);
        let (_, b3) = find_fit(Some(arena), 256).unwrap();
        claim(b3);

        // Release the outer two, keep the middle one live: nothing should
        // merge across a still-live block.
        assert!(!release(arena, b1));
        assert!(!release(arena, b3));

        assert!(unsafe { is_live(b2) });
        unsafe { unmap(arena) };
    }

    #[test]
    fn find_containing_locates_the_owning_arena() {
        let a1 = fresh(None).unwrap();
        let a2 = fresh(Some(a1)).unwrap();
        let (_, block) = find_fit(Some(a2), 128).unwrap();
        claim(block);
        assert_eq!(find_containing(Some(a2), block), Some(a2));

        unsafe {
            unmap(a1);
            unmap(a2);
        }
    }
}
