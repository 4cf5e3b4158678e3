//! Anonymous-mapping primitives.
//!
//! This crate is the sole point of contact with the operating system's
//! virtual memory interface. It exposes exactly the two syscalls the
//! allocator needs — anonymous private `mmap` and `munmap` — and nothing
//! else: no file descriptors, no `mprotect`, no `madvise`. Every other
//! crate in this workspace is free of direct OS calls.

use std::ptr::NonNull;

/// Protection and mapping flags used for every region this allocator maps.
///
/// Always `PROT_READ | PROT_WRITE`, `MAP_PRIVATE | MAP_ANONYMOUS`. The
/// allocator has no use for shared mappings, executable pages, or
/// file-backed mappings, so these are not parameterized.
const PROT: i32 = libc::PROT_READ | libc::PROT_WRITE;
const FLAGS: i32 = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;

/// Maps a fresh, zero-initialized anonymous region of exactly `len` bytes.
///
/// Returns `None` if the kernel refuses the mapping (resource exhaustion).
/// `len` must be non-zero; the caller is responsible for page-rounding if
/// that matters to it (this allocator's arena size is already a multiple
/// of the page size, so no rounding is performed here).
#[must_use]
pub fn map_anonymous(len: usize) -> Option<NonNull<u8>> {
    debug_assert!(len > 0, "mapping zero bytes is never useful to this allocator");

    // SAFETY: we pass a null hint address, a non-zero length, fixed
    // protection/flags, and -1/0 for the (unused) fd/offset pair — the
    // standard anonymous-mapping incantation.
    let addr = unsafe { libc::mmap(std::ptr::null_mut(), len, PROT, FLAGS, -1, 0) };

    if addr == libc::MAP_FAILED {
        return None;
    }

    // SAFETY: mmap succeeded, so addr is a non-null pointer to `len`
    // freshly-mapped, zero-filled bytes.
    Some(unsafe { NonNull::new_unchecked(addr.cast::<u8>()) })
}

/// Unmaps a region previously returned by [`map_anonymous`].
///
/// # Safety
///
/// `ptr` must be the exact base address returned by a prior call to
/// [`map_anonymous`], `len` must be the exact length passed to that call,
/// and the region must not be accessed (by this thread or any other) after
/// this call returns.
pub unsafe fn unmap(ptr: NonNull<u8>, len: usize) {
    // SAFETY: forwarded from the caller's contract above.
    let rc = unsafe { libc::munmap(ptr.as_ptr().cast(), len) };
    debug_assert_eq!(rc, 0, "munmap of a region we mapped ourselves should never fail");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_anonymous_succeeds_and_is_writable() {
        let len = 4096;
        let region = map_anonymous(len).expect("mapping should succeed");
        // SAFETY: region is valid for `len` bytes, freshly mapped.
        unsafe {
            std::ptr::write_bytes(region.as_ptr(), 0xAB, len);
            assert_eq!(*region.as_ptr(), 0xAB);
            unmap(region, len);
        }
    }

    #[test]
    fn map_anonymous_is_zeroed() {
        let len = 8192;
        let region = map_anonymous(len).expect("mapping should succeed");
        // SAFETY: region is valid for `len` bytes.
        unsafe {
            let slice = std::slice::from_raw_parts(region.as_ptr(), len);
            assert!(slice.iter().all(|&b| b == 0));
            unmap(region, len);
        }
    }

    #[test]
    fn distinct_mappings_do_not_overlap() {
        let a = map_anonymous(4096).unwrap();
        let b = map_anonymous(4096).unwrap();
        assert_ne!(a.as_ptr(), b.as_ptr());
        // SAFETY: each region is valid for 4096 bytes and mapped by us.
        unsafe {
            unmap(a, 4096);
            unmap(b, 4096);
        }
    }
}
