//! Large (direct-OS-mapped) allocation reuse and `reallocate` semantics,
//! exercised against fresh `Manager` instances.
//!
//! Writing through the raw pointers `Manager` hands back (to prove content
//! survives a resize) needs `unsafe`; the facade crate's `deny(unsafe_code)`
//! lint is about its own production surface, not what a test harness needs
//! to poke at the memory that surface returns.
#![allow(unsafe_code)]

use arenalloc_core::Manager;

#[test]
fn releasing_a_large_block_makes_its_address_available_to_an_identical_later_request() {
    let mut manager = Manager::new();
    let big = 4 * 1024 * 1024; // well past the arena/global threshold

    let first = manager.allocate(big).expect("large allocation should succeed");
    manager.release(Some(first));

    let second = manager
        .allocate(big)
        .expect("the released block should satisfy an identical request");
    assert_eq!(first, second, "a released global block must be reused, not re-mapped");
}

#[test]
fn reallocate_growth_preserves_content_and_releases_the_old_block() {
    let mut manager = Manager::new();
    let original = manager.allocate(64).unwrap();
    // SAFETY: `original` is valid for 64 bytes.
    unsafe { std::ptr::write_bytes(original.as_ptr(), 0x7A, 64) };

    let grown = manager.reallocate(Some(original), 4096).expect("growth should succeed");
    assert!(manager.size_of(grown) >= 4096);

    // SAFETY: the first 64 bytes of `grown` were copied from `original`.
    unsafe {
        for i in 0..64 {
            assert_eq!(*grown.as_ptr().add(i), 0x7A, "byte {i} should have been preserved across growth");
        }
    }

    assert_ne!(grown, original, "growth always allocates fresh space in this allocator");
    assert!(!manager.is_live(original), "the original block should have been released");
}

#[test]
fn reallocate_shrink_returns_the_same_address_unchanged() {
    let mut manager = Manager::new();
    let original = manager.allocate(256).unwrap();
    // SAFETY: `original` is valid for 256 bytes.
    unsafe { std::ptr::write_bytes(original.as_ptr(), 0x11, 256) };

    let shrunk = manager.reallocate(Some(original), 16).expect("shrink should succeed");
    assert_eq!(shrunk, original, "a block that already satisfies the new size is returned unchanged");
    assert!(manager.size_of(shrunk) >= 256, "no shrink-in-place: the header is never rewritten");
    assert!(manager.is_live(shrunk));
    // SAFETY: the first 256 bytes of `shrunk` are the untouched original payload.
    unsafe {
        for i in 0..256 {
            assert_eq!(*shrunk.as_ptr().add(i), 0x11);
        }
    }
}

#[test]
fn reallocate_to_zero_is_equivalent_to_release() {
    let mut manager = Manager::new();
    let p = manager.allocate(128).unwrap();
    assert!(manager.reallocate(Some(p), 0).is_none());
    assert_eq!(manager.total_allocated(), 0);
}

#[test]
fn reallocate_of_a_null_pointer_behaves_like_a_fresh_allocation() {
    let mut manager = Manager::new();
    let p = manager.reallocate(None, 42).expect("should allocate fresh");
    assert!(manager.is_live(p));
    assert!(manager.size_of(p) >= 42);
}
