//! Public allocation interface.
//!
//! This crate is the fully-safe facade over [`arenalloc_core`]: it owns the
//! one process-wide [`Manager`](arenalloc_core::Manager) instance and
//! exposes its operations as plain functions over `*mut u8`, with a null
//! pointer (or zero size) standing in for every failure and edge case —
//! allocator-style sentinel returns, no `Result`, no panics on caller
//! misuse. `#![forbid(unsafe_code)]` holds for this whole crate: every
//! pointer this module hands out or takes back passes through
//! [`std::ptr::NonNull::new`], never a raw dereference.

#![forbid(unsafe_code)]

use std::ptr::NonNull;
use std::sync::{Mutex, OnceLock};

use arenalloc_core::Manager;

fn manager() -> &'static Mutex<Manager> {
    static MANAGER: OnceLock<Mutex<Manager>> = OnceLock::new();
    MANAGER.get_or_init(|| Mutex::new(Manager::new()))
}

/// Allocates `size` bytes and returns a pointer to the start of the usable
/// region, or a null pointer if `size` is zero or the request cannot be
/// satisfied.
#[must_use]
pub fn allocate(size: usize) -> *mut u8 {
    manager()
        .lock()
        .expect("allocator lock should never be poisoned")
        .allocate(size)
        .map_or(std::ptr::null_mut(), NonNull::as_ptr)
}

/// Releases a pointer previously returned by [`allocate`] or
/// [`reallocate`]. A null pointer is a no-op.
pub fn release(ptr: *mut u8) {
    manager()
        .lock()
        .expect("allocator lock should never be poisoned")
        .release(NonNull::new(ptr));
}

/// Resizes a previously-returned pointer to `new_size` bytes, preserving
/// its contents up to the lesser of the old and new sizes.
///
/// A null `ptr` behaves like [`allocate`]. A `new_size` of zero releases
/// `ptr` and returns a null pointer.
#[must_use]
pub fn reallocate(ptr: *mut u8, new_size: usize) -> *mut u8 {
    manager()
        .lock()
        .expect("allocator lock should never be poisoned")
        .reallocate(NonNull::new(ptr), new_size)
        .map_or(std::ptr::null_mut(), NonNull::as_ptr)
}

/// Usable payload capacity of a previously-returned pointer. Returns `0`
/// for a null pointer.
#[must_use]
pub fn size(ptr: *mut u8) -> usize {
    let Some(ptr) = NonNull::new(ptr) else {
        return 0;
    };
    manager().lock().expect("allocator lock should never be poisoned").size_of(ptr)
}

/// Whether a previously-returned pointer is still live (has not been
/// released). A null pointer is never live.
#[must_use]
pub fn is_live(ptr: *mut u8) -> bool {
    let Some(ptr) = NonNull::new(ptr) else {
        return false;
    };
    manager().lock().expect("allocator lock should never be poisoned").is_live(ptr)
}

/// Sum of the sizes of every currently-live allocation made through this
/// interface.
#[must_use]
pub fn total_allocated() -> usize {
    manager().lock().expect("allocator lock should never be poisoned").total_allocated()
}
