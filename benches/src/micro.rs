/// Microbenchmarks for the partitioned slab heap and the break allocator.
///
/// Plain `Instant`-timed loops printing a machine-parseable summary line,
/// so runs can be diffed across commits without a harness.

use partslab::{create_heap, BreakAllocator, MmapArena, SlabHeap};
use std::hint::black_box;
use std::time::Instant;

/// Label for the summary line, from the environment or default.
fn run_label() -> String {
    std::env::var("BENCH_LABEL").unwrap_or_else(|_| "local".to_string())
}

/// Measure alloc/free latency on one thread's home partition.
fn bench_alloc_free(heap: &SlabHeap, iterations: usize) -> f64 {
    let mut handle = heap.handle();
    let touch = heap.size_class().min(64);
    for _ in 0..1000 {
        if let Ok(p) = handle.alloc() {
            unsafe {
                std::ptr::write_bytes(p.as_ptr(), 0xAB, touch);
                heap.free(black_box(p));
            }
        }
    }
    let start = Instant::now();
    for _ in 0..iterations {
        if let Ok(p) = handle.alloc() {
            unsafe {
                std::ptr::write_bytes(p.as_ptr(), 0xAB, touch);
                heap.free(black_box(p));
            }
        }
    }
    start.elapsed().as_nanos() as f64 / iterations as f64
}

/// Measure the cost of filling a heap from virgin slots, then refilling it
/// from the explicit free list.
fn bench_fill(size_class: usize, count: usize) -> (f64, f64) {
    let heap = match create_heap(size_class, count, 1) {
        Ok(heap) => heap,
        Err(e) => {
            eprintln!("heap creation failed: {e}");
            return (0.0, 0.0);
        }
    };
    let mut handle = heap.handle();
    let mut ptrs = Vec::with_capacity(count);

    let start = Instant::now();
    while let Ok(p) = handle.alloc() {
        ptrs.push(black_box(p));
    }
    let virgin = start.elapsed().as_nanos() as f64 / count as f64;

    for p in ptrs.drain(..) {
        unsafe { heap.free(p) };
    }
    let start = Instant::now();
    while let Ok(p) = handle.alloc() {
        ptrs.push(black_box(p));
    }
    let recycled = start.elapsed().as_nanos() as f64 / count as f64;
    (virgin, recycled)
}

/// Measure multi-threaded allocation throughput; each thread frees its own
/// objects under one shared lock to honour the single-freer rule.
fn bench_threaded_throughput(
    heap: &'static SlabHeap,
    num_threads: usize,
    ops_per_thread: usize,
) -> f64 {
    let freer = std::sync::Arc::new(std::sync::Mutex::new(()));
    let start = Instant::now();
    let handles: Vec<_> = (0..num_threads)
        .map(|_| {
            let freer = std::sync::Arc::clone(&freer);
            std::thread::spawn(move || {
                let mut handle = heap.handle();
                let mut batch = Vec::with_capacity(64);
                for i in 0..ops_per_thread {
                    if let Ok(p) = handle.alloc() {
                        batch.push(p);
                    }
                    if batch.len() == 64 || i + 1 == ops_per_thread {
                        let _guard = freer.lock();
                        for p in batch.drain(..) {
                            unsafe { heap.free(black_box(p)) };
                        }
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    let elapsed = start.elapsed();
    (num_threads * ops_per_thread) as f64 / elapsed.as_secs_f64()
}

/// Measure sbrk-style bump latency.
fn bench_break(iterations: usize) -> f64 {
    let mut brk = match BreakAllocator::with_capacity(&MmapArena, 64 << 20) {
        Ok(brk) => brk,
        Err(e) => {
            eprintln!("break creation failed: {e}");
            return 0.0;
        }
    };
    let start = Instant::now();
    for _ in 0..iterations {
        let _ = black_box(brk.adjust_break(black_box(64)));
        let _ = black_box(brk.adjust_break(black_box(-64)));
    }
    start.elapsed().as_nanos() as f64 / (2 * iterations) as f64
}

fn main() {
    let iterations = 1_000_000;
    let label = run_label();

    println!("=== partslab microbenchmarks ({}) ===\n", label);

    let mut latencies: Vec<(usize, f64)> = Vec::new();
    let mut key_throughput_1t = 0.0f64;
    let mut key_throughput_4t = 0.0f64;

    println!("--- alloc/free latency (ns/op) ---");
    for &size in &[16, 32, 64, 128, 256, 1024, 4096] {
        let heap = match create_heap(size, 4096, 4) {
            Ok(heap) => heap,
            Err(e) => {
                eprintln!("  size={size}: {e}");
                continue;
            }
        };
        let ns = bench_alloc_free(&heap, iterations);
        println!("  size={:>6}: {:>8.1} ns", size, ns);
        latencies.push((size, ns));
    }

    println!("\n--- fill latency (ns/object) ---");
    for &size in &[16, 64, 256] {
        let (virgin, recycled) = bench_fill(size, 1 << 16);
        println!(
            "  size={:>6}: virgin {:>6.1} ns, recycled {:>6.1} ns",
            size, virgin, recycled
        );
    }

    println!("\n--- multi-threaded throughput (Mops/sec) ---");
    for &threads in &[1, 2, 4, 8] {
        let heap: &'static SlabHeap = match create_heap(64, 1 << 16, threads) {
            Ok(heap) => Box::leak(Box::new(heap)),
            Err(e) => {
                eprintln!("  threads={threads}: {e}");
                continue;
            }
        };
        let ops_sec = bench_threaded_throughput(heap, threads, iterations / threads);
        let mops = ops_sec / 1_000_000.0;
        println!("  threads={}: {:>6.2} Mops/sec", threads, mops);
        if threads == 1 {
            key_throughput_1t = mops;
        }
        if threads == 4 {
            key_throughput_4t = mops;
        }
    }

    println!("\n--- break adjust latency (ns/op) ---");
    let brk_ns = bench_break(iterations);
    println!("  +/-64: {:.1} ns", brk_ns);

    print!("\nSUMMARY|{}", label);
    for &(size, ns) in &latencies {
        print!("|latency_{}={:.1}", size, ns);
    }
    println!(
        "|throughput_1t={:.2}|throughput_4t={:.2}|brk={:.1}",
        key_throughput_1t, key_throughput_4t, brk_ns
    );

    println!("\nDone.");
}
