//! A direct port of the original allocator's comparator harness: run the
//! same allocate/release cycle through `arenalloc` and through the system
//! allocator (`malloc`/`free` via `libc`) at a fixed spread of sizes, and
//! write wall-clock totals for each to `results.csv`.
//!
//! This is a standalone binary rather than a criterion benchmark because
//! it reproduces that harness's exact output contract (one CSV row per
//! size, two timing columns) for anyone who wants to diff results against
//! the original.

use std::fs::File;
use std::io::Write as _;
use std::time::Instant;

const TEST_SIZES: [usize; 10] = [16, 32, 64, 128, 256, 512, 1024, 2048, 4096, 8192];
const NUM_ITERATIONS: usize = 10_000;

fn benchmark(alloc_release: impl Fn(usize)) -> [f64; TEST_SIZES.len()] {
    let mut results = [0.0; TEST_SIZES.len()];
    for (i, &size) in TEST_SIZES.iter().enumerate() {
        let start = Instant::now();
        for _ in 0..NUM_ITERATIONS {
            alloc_release(size);
        }
        results[i] = start.elapsed().as_secs_f64();
    }
    results
}

fn arenalloc_cycle(size: usize) {
    let ptr = arenalloc::allocate(size);
    arenalloc::release(ptr);
}

fn libc_cycle(size: usize) {
    // SAFETY: `ptr` is either null (checked before use) or a fresh
    // allocation of exactly `size` bytes from `malloc`, freed once via
    // `free` and never touched afterward.
    unsafe {
        let ptr = libc::malloc(size);
        if !ptr.is_null() {
            libc::free(ptr);
        }
    }
}

fn main() -> std::io::Result<()> {
    let arenalloc_times = benchmark(arenalloc_cycle);
    let libc_times = benchmark(libc_cycle);

    let mut file = File::create("results.csv")?;
    writeln!(file, "Size,arenalloc,malloc")?;
    for i in 0..TEST_SIZES.len() {
        writeln!(file, "{},{:.6},{:.6}", TEST_SIZES[i], arenalloc_times[i], libc_times[i])?;
    }

    Ok(())
}
