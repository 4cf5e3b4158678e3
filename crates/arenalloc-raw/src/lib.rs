//! Block-header layout and payload ⇄ header pointer arithmetic.
//!
//! This is the allocator's one piece of genuinely raw-memory territory: a
//! block header is a handful of bytes that live immediately before a
//! payload the caller holds a pointer to, and every other crate in this
//! workspace needs to cross back and forth between "the address I handed
//! the caller" and "the bookkeeping struct that address implies." That
//! crossing is encapsulated here, behind a small, audited surface, so the
//! arena and global-list logic in `arenalloc-core` can be written as
//! ordinary safe Rust operating on `BlockHeader` values.
//!
//! None of the functions here validate that a pointer they are handed was
//! ever produced by [`init_header`] — that burden is on the caller, exactly
//! as it is for any raw-pointer API in the standard library.

#![allow(unsafe_code)]

use std::mem::size_of;
use std::ptr::NonNull;

/// Every block's bookkeeping header, immediately preceding its payload.
///
/// `repr(C)` and entirely `usize`-sized fields so the header itself is
/// always word-aligned and a whole number of words long, matching the
/// allocator's "no alignment beyond machine word width" design.
#[repr(C)]
pub struct BlockHeader {
    /// Total size of the block in bytes, header included.
    size: usize,
    /// Successor link for free lists. `0` means "no successor."
    next: usize,
    /// Non-zero while the block is live (handed to a caller).
    live: usize,
}

/// Size of [`BlockHeader`], in bytes. Always a multiple of the machine
/// word width.
pub const HEADER_SIZE: usize = size_of::<BlockHeader>();

/// The machine's native word width, in bytes.
pub const WORD_SIZE: usize = size_of::<usize>();

/// Size of the boundary tag every block carries at its tail: a copy of its
/// own total size, written immediately before `block_end`.
///
/// This is the one deliberate layout departure from the reference this
/// allocator is modeled on. The reference finds a block's layout
/// predecessor by walking a free list looking for a node whose *free-list*
/// successor happens to equal this block — correct only when free-list
/// order coincidentally matches memory order, which a split/coalesce
/// history is not obliged to preserve. A trailing size tag makes "what
/// block physically precedes me" an O(1) question instead of a
/// correctness gamble, at the cost of one extra word per block.
pub const FOOTER_SIZE: usize = WORD_SIZE;

/// Rounds `n` up to the next multiple of [`WORD_SIZE`].
#[must_use]
pub const fn word_align(n: usize) -> usize {
    (n + WORD_SIZE - 1) & !(WORD_SIZE - 1)
}

/// Initializes a fresh header at `at`, returning a handle to it.
///
/// `at` must be the start of a region at least `size` bytes long that this
/// caller owns exclusively (a fresh OS mapping, or the start of a block
/// being split or reused). Overwrites whatever bytes were previously at
/// that address.
///
/// # Safety
///
/// `at` must be valid for reads and writes of `size` bytes and suitably
/// aligned for [`BlockHeader`] (any OS page or any address previously
/// produced by this module satisfies this).
#[must_use]
pub unsafe fn init_header(at: NonNull<u8>, size: usize, next: usize, live: bool) -> NonNull<BlockHeader> {
    let header = at.cast::<BlockHeader>();
    // SAFETY: forwarded from the caller's contract.
    unsafe {
        header.as_ptr().write(BlockHeader {
            size,
            next,
            live: live as usize,
        });
        write_footer(header, size);
    }
    header
}

/// Writes the boundary tag for a block of `size` bytes starting at `header`.
///
/// # Safety
///
/// `header` must be valid for writes of `size` bytes (the block's full
/// extent); `size` must be at least `HEADER_SIZE + FOOTER_SIZE`.
unsafe fn write_footer(header: NonNull<BlockHeader>, size: usize) {
    // SAFETY: forwarded from the caller's contract; `size - FOOTER_SIZE` is
    // within the block since `size >= HEADER_SIZE + FOOTER_SIZE`.
    unsafe {
        let footer = header.cast::<u8>().as_ptr().add(size - FOOTER_SIZE).cast::<usize>();
        footer.write(size);
    }
}

/// Reads the boundary tag of the block physically ending at `addr` — i.e.
/// the total size of whatever block occupies the bytes immediately before
/// `addr`.
///
/// Every block, live or free, maintains this tag, so the result is always
/// meaningful as long as `addr` is not the first byte of its arena's data
/// region (there is nothing before it to read).
///
/// # Safety
///
/// The `FOOTER_SIZE` bytes immediately before `addr` must belong to a block
/// previously initialized by [`init_header`] (possibly since resized by
/// [`set_size`]).
#[must_use]
pub unsafe fn size_before(addr: NonNull<u8>) -> usize {
    // SAFETY: forwarded from the caller's contract.
    unsafe { addr.as_ptr().sub(FOOTER_SIZE).cast::<usize>().read() }
}

/// Returns the payload address for a block whose header starts at `header`.
///
/// This is the address this allocator hands to its caller.
#[must_use]
pub fn payload_of(header: NonNull<BlockHeader>) -> NonNull<u8> {
    // SAFETY: HEADER_SIZE bytes past a valid header is still within the
    // block (every block is at least HEADER_SIZE + WORD_SIZE bytes long).
    unsafe { NonNull::new_unchecked(header.cast::<u8>().as_ptr().add(HEADER_SIZE)) }
}

/// Recovers the block header for a payload address previously produced by
/// [`payload_of`] (equivalently: previously handed to a caller as an
/// allocation).
///
/// # Safety
///
/// `payload` must equal `payload_of(h)` for some block header `h` that is
/// still valid (not unmapped).
#[must_use]
pub unsafe fn header_of(payload: NonNull<u8>) -> NonNull<BlockHeader> {
    // SAFETY: forwarded from the caller's contract; subtracting HEADER_SIZE
    // undoes the offset `payload_of` applied.
    unsafe { NonNull::new_unchecked(payload.as_ptr().sub(HEADER_SIZE).cast::<BlockHeader>()) }
}

/// Reads the total size (header included) of the block at `header`.
///
/// # Safety
///
/// `header` must point at a live [`BlockHeader`] (produced by
/// [`init_header`] and not since unmapped).
#[must_use]
pub unsafe fn size_of_block(header: NonNull<BlockHeader>) -> usize {
    // SAFETY: forwarded from the caller's contract.
    unsafe { header.as_ref().size }
}

/// Overwrites the total size of the block at `header`.
///
/// # Safety
///
/// Same contract as [`size_of_block`].
pub unsafe fn set_size(header: NonNull<BlockHeader>, size: usize) {
    // SAFETY: forwarded from the caller's contract.
    unsafe {
        (*header.as_ptr()).size = size;
        write_footer(header, size);
    }
}

/// Reads the free-list successor link of the block at `header`.
///
/// Returns `None` when the block has no successor (the link is `0`).
/// The returned address is an opaque block-header address, not validated
/// in any way by this function.
///
/// # Safety
///
/// Same contract as [`size_of_block`].
#[must_use]
pub unsafe fn next_of(header: NonNull<BlockHeader>) -> Option<NonNull<BlockHeader>> {
    // SAFETY: forwarded from the caller's contract.
    let next = unsafe { header.as_ref().next };
    NonNull::new(next as *mut BlockHeader)
}

/// Overwrites the free-list successor link of the block at `header`.
///
/// # Safety
///
/// Same contract as [`size_of_block`].
pub unsafe fn set_next(header: NonNull<BlockHeader>, next: Option<NonNull<BlockHeader>>) {
    let raw = next.map_or(0, |p| p.as_ptr() as usize);
    // SAFETY: forwarded from the caller's contract.
    unsafe {
        (*header.as_ptr()).next = raw;
    }
}

/// Returns whether the block at `header` is currently live.
///
/// # Safety
///
/// Same contract as [`size_of_block`].
#[must_use]
pub unsafe fn is_live(header: NonNull<BlockHeader>) -> bool {
    // SAFETY: forwarded from the caller's contract.
    unsafe { header.as_ref().live != 0 }
}

/// Overwrites the liveness flag of the block at `header`.
///
/// # Safety
///
/// Same contract as [`size_of_block`].
pub unsafe fn set_live(header: NonNull<BlockHeader>, live: bool) {
    // SAFETY: forwarded from the caller's contract.
    unsafe {
        (*header.as_ptr()).live = live as usize;
    }
}

/// Returns the address immediately following the block at `header` — i.e.
/// where the next block's header would begin if the layout is contiguous.
///
/// # Safety
///
/// Same contract as [`size_of_block`]. The returned pointer is not
/// dereferenced by this function and may point one-past-the-end of the
/// containing region; the caller must bounds-check before treating it as
/// another header.
#[must_use]
pub unsafe fn block_end(header: NonNull<BlockHeader>) -> *mut u8 {
    // SAFETY: forwarded from the caller's contract.
    let size = unsafe { size_of_block(header) };
    header.cast::<u8>().as_ptr().wrapping_add(size)
}

// ---------------------------------------------------------------------------
// Arena headers
// ---------------------------------------------------------------------------

/// The header prefixing every arena mapping, distinct from [`BlockHeader`]:
/// an arena is a whole mapped region subdivided into blocks, not a block
/// itself.
#[repr(C)]
pub struct ArenaHeader {
    /// Successor link in the Manager's arena sequence. `0` means "last".
    next_arena: usize,
    /// Head of this arena's free list. `0` means empty.
    free_list: usize,
}

/// Size of [`ArenaHeader`], in bytes. Always a multiple of [`WORD_SIZE`].
pub const ARENA_HEADER_SIZE: usize = size_of::<ArenaHeader>();

/// Initializes a fresh arena header at `at`.
///
/// # Safety
///
/// `at` must be valid for reads and writes of at least `ARENA_HEADER_SIZE`
/// bytes and suitably aligned for [`ArenaHeader`].
#[must_use]
pub unsafe fn init_arena_header(
    at: NonNull<u8>,
    next_arena: Option<NonNull<ArenaHeader>>,
    free_list: Option<NonNull<BlockHeader>>,
) -> NonNull<ArenaHeader> {
    let header = at.cast::<ArenaHeader>();
    // SAFETY: forwarded from the caller's contract.
    unsafe {
        header.as_ptr().write(ArenaHeader {
            next_arena: next_arena.map_or(0, |p| p.as_ptr() as usize),
            free_list: free_list.map_or(0, |p| p.as_ptr() as usize),
        });
    }
    header
}

/// Returns the start of the arena's data region — where the arena's blocks
/// begin — immediately following its header.
#[must_use]
pub fn arena_data_start(header: NonNull<ArenaHeader>) -> NonNull<u8> {
    // SAFETY: ARENA_HEADER_SIZE bytes past a valid arena header is still
    // within the mapping (every arena is far larger than its header).
    unsafe { NonNull::new_unchecked(header.cast::<u8>().as_ptr().add(ARENA_HEADER_SIZE)) }
}

/// Reads the arena sequence successor link.
///
/// # Safety
///
/// `header` must point at a live [`ArenaHeader`].
#[must_use]
pub unsafe fn next_arena_of(header: NonNull<ArenaHeader>) -> Option<NonNull<ArenaHeader>> {
    // SAFETY: forwarded from the caller's contract.
    let next = unsafe { header.as_ref().next_arena };
    NonNull::new(next as *mut ArenaHeader)
}

/// Overwrites the arena sequence successor link.
///
/// # Safety
///
/// Same contract as [`next_arena_of`].
pub unsafe fn set_next_arena(header: NonNull<ArenaHeader>, next: Option<NonNull<ArenaHeader>>) {
    let raw = next.map_or(0, |p| p.as_ptr() as usize);
    // SAFETY: forwarded from the caller's contract.
    unsafe {
        (*header.as_ptr()).next_arena = raw;
    }
}

/// Reads the head of this arena's free list.
///
/// # Safety
///
/// Same contract as [`next_arena_of`].
#[must_use]
pub unsafe fn free_list_of(header: NonNull<ArenaHeader>) -> Option<NonNull<BlockHeader>> {
    // SAFETY: forwarded from the caller's contract.
    let head = unsafe { header.as_ref().free_list };
    NonNull::new(head as *mut BlockHeader)
}

/// Overwrites the head of this arena's free list.
///
/// # Safety
///
/// Same contract as [`next_arena_of`].
pub unsafe fn set_free_list(header: NonNull<ArenaHeader>, head: Option<NonNull<BlockHeader>>) {
    let raw = head.map_or(0, |p| p.as_ptr() as usize);
    // SAFETY: forwarded from the caller's contract.
    unsafe {
        (*header.as_ptr()).free_list = raw;
    }
}
