//! The allocator's central state: the arena sequence, the global free
//! list, and the live-payload-byte accounting that backs
//! [`Manager::total_allocated`].
//!
//! `Manager` itself carries no process-global machinery and no locking — it
//! is an ordinary struct with `&mut self` methods. Making one instance of
//! it reachable from everywhere a caller might call `allocate`/`release`
//! is the facade crate's job, not this one's.

use std::ptr::NonNull;

use arenalloc_raw::{header_of, size_of_block, ArenaHeader};

use crate::arena;
use crate::global::{self, GlobalList};
use crate::size_class::{self, ARENA_SIZE};

/// Owns every arena this process has mapped and the global free list,
/// dispatching allocation, release, and query operations between them.
pub struct Manager {
    arenas: Option<NonNull<ArenaHeader>>,
    global: GlobalList,
    live_bytes: usize,
}

// Manager owns raw pointers into its own mappings exclusively and performs
// no I/O beyond mmap/munmap; nothing here depends on thread-local state.
// Per spec, this allocator makes no concurrency guarantees of its own —
// any `Send`/`Sync` wrapper is the facade's responsibility, not a claim
// made here.
unsafe impl Send for Manager {}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl Manager {
    /// A Manager with no arenas mapped yet and an empty global free list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            arenas: None,
            global: GlobalList::new(),
            live_bytes: 0,
        }
    }

    /// Serves a request for `requested` payload bytes, or `None` if
    /// `requested` is zero or the OS refuses every mapping attempt.
    #[must_use]
    pub fn allocate(&mut self, requested: usize) -> Option<NonNull<u8>> {
        let plan = size_class::classify(requested)?;

        let payload = if plan.small {
            self.allocate_small(plan.total)
        } else {
            self.allocate_large(plan.total)
        }?;

        // The claimed block's actual size can exceed `plan.total` (a fit
        // consumed whole, without splitting, keeps its original size), so
        // the live-byte count is read back from the block itself rather
        // than accumulated from the plan — otherwise this counter and
        // `release`'s symmetric subtraction would drift apart.
        // SAFETY: `payload` was just produced by the claim above; its
        // header is valid and mapped.
        let actual_total = unsafe { size_of_block(header_of(payload)) };
        self.live_bytes += size_class::usable_capacity(actual_total);
        Some(payload)
    }

    fn allocate_small(&mut self, total: usize) -> Option<NonNull<u8>> {
        if let Some((_, block)) = arena::find_fit(self.arenas, total) {
            return Some(arena::claim(block));
        }

        let fresh = arena::fresh(self.arenas)?;
        self.arenas = Some(fresh);
        let (_, block) = arena::find_fit(self.arenas, total)
            .expect("a freshly mapped arena can satisfy the request that required it");
        Some(arena::claim(block))
    }

    fn allocate_large(&mut self, total: usize) -> Option<NonNull<u8>> {
        if let Some(block) = self.global.find_fit(total) {
            return Some(global::claim(block));
        }
        let block = GlobalList::allocate_fresh(total)?;
        Some(arenalloc_raw::payload_of(block))
    }

    /// Releases a payload address previously returned by [`Manager::allocate`]
    /// or [`Manager::reallocate`]. A null pointer is a no-op.
    pub fn release(&mut self, payload: Option<NonNull<u8>>) {
        let Some(payload) = payload else { return };

        // SAFETY: `payload` is assumed to be a previously-returned address,
        // per this function's contract.
        let header = unsafe { header_of(payload) };
        let size = unsafe { size_of_block(header) };
        self.live_bytes = self.live_bytes.saturating_sub(size_class::usable_capacity(size));

        // The block's recorded size is at most one arena's worth of bytes
        // if and only if it genuinely lives in some arena's data region;
        // a global block can also happen to be this small, so size alone
        // does not decide the dispatch — containment does. This is a
        // deliberate departure from a size-only test: a global allocation
        // whose size is under one arena would otherwise be misrouted into
        // the arena path, fail to find a containing arena, and leak.
        let owning_arena = if size <= ARENA_SIZE {
            arena::find_containing(self.arenas, header)
        } else {
            None
        };

        match owning_arena {
            Some(owner) => {
                let fully_free = arena::release(owner, header);
                if fully_free {
                    self.arenas = arena::unlink(self.arenas, owner);
                    // SAFETY: `owner` was just unlinked and is unreachable
                    // from the arena sequence.
                    unsafe { arena::unmap(owner) };
                }
            }
            None => self.global.release(header),
        }
    }

    /// Resizes a payload previously returned by this Manager to `new_size`
    /// bytes, preserving the lesser of its old and new usable sizes.
    ///
    /// A null `payload` behaves like [`Manager::allocate`]. A `new_size` of
    /// zero releases `payload` and returns `None`.
    #[must_use]
    pub fn reallocate(&mut self, payload: Option<NonNull<u8>>, new_size: usize) -> Option<NonNull<u8>> {
        let Some(old_payload) = payload else {
            return self.allocate(new_size);
        };

        if new_size == 0 {
            self.release(Some(old_payload));
            return None;
        }

        // SAFETY: `old_payload` is assumed to be a previously-returned
        // address, per this function's contract.
        let old_header = unsafe { header_of(old_payload) };
        let old_usable = size_class::usable_capacity(unsafe { size_of_block(old_header) });

        // The existing block already satisfies the request: no shrink in
        // place, no header rewrite, the caller keeps the same address.
        if old_usable >= new_size {
            return Some(old_payload);
        }

        let new_payload = self.allocate(new_size)?;

        // SAFETY: both ranges are exclusively-owned, non-overlapping
        // (they are distinct blocks), and at least `old_usable` bytes long.
        unsafe {
            std::ptr::copy_nonoverlapping(old_payload.as_ptr(), new_payload.as_ptr(), old_usable);
        }

        self.release(Some(old_payload));
        Some(new_payload)
    }

    /// Usable payload capacity of a previously-returned address — always at
    /// least as large as the size that was originally requested for it.
    #[must_use]
    pub fn size_of(&self, payload: NonNull<u8>) -> usize {
        // SAFETY: `payload` is assumed to be a previously-returned address.
        let header = unsafe { header_of(payload) };
        size_class::usable_capacity(unsafe { size_of_block(header) })
    }

    /// Whether a previously-returned address is still live (has not been
    /// released).
    ///
    /// Implements spec.md §4.6's structural walk rather than reading the
    /// recovered header's liveness flag directly: `payload` may name a
    /// block whose arena was fully reclaimed (unmapped) by an intervening
    /// [`Manager::release`], in which case dereferencing its header would
    /// be use-after-unmap. The walk below only ever compares `header`'s
    /// *address* against still-mapped structures — the global free list,
    /// then each still-mapped arena's bounds and free list — and never
    /// reads through it.
    #[must_use]
    pub fn is_live(&self, payload: NonNull<u8>) -> bool {
        // SAFETY: `header_of` is pointer arithmetic only; it does not
        // dereference `payload` or the header address it computes.
        let header = unsafe { header_of(payload) };

        if let Some(flag) = self.global.find_live_flag(header) {
            return flag;
        }

        match arena::find_containing(self.arenas, header) {
            Some(owner) => !arena::free_list_contains(owner, header),
            None => false,
        }
    }

    /// Sum of payload bytes (header and footer excluded) of every
    /// currently-live allocation — equal to the sum of [`Manager::size_of`]
    /// over every currently-live address.
    #[must_use]
    pub fn total_allocated(&self) -> usize {
        self.live_bytes
    }
}
