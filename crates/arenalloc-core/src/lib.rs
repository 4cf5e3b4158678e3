//! Safe allocation policy built on top of `arenalloc-raw`'s header
//! arithmetic and `arenalloc-mmap`'s OS mappings: size classification, the
//! arena pool, the global free list, and the [`Manager`] that ties them
//! together.
//!
//! Every public function here is safe to call — the `unsafe` blocks inside
//! are narrow, each justified by a `SAFETY` comment tying it back to an
//! invariant this module itself maintains (a payload address came from one
//! of our own headers, a block reachable from a free list is still valid,
//! and so on).

pub mod arena;
pub mod global;
pub mod manager;
pub mod size_class;

pub use manager::Manager;
pub use size_class::{ARENA_SIZE, LARGE_THRESHOLD};
