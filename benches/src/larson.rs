/// Larson-style benchmark: a server-like workload where objects allocated
/// on worker threads are released elsewhere.
///
/// Workers allocate from the shared heap and hand every object to a single
/// freer thread, so the partition free lists see constant cross-thread
/// traffic and the steal path gets exercised once home partitions run dry.

use partslab::{create_heap, SlabHeap};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_DURATION_SECS: u64 = 5;
const BATCH_SIZE: usize = 1000;
const SIZE_CLASS: usize = 64;
const OBJECTS_PER_THREAD: usize = 4096;

struct SendPtr(NonNull<u8>);
// Ownership of the object moves to the freer; the heap outlives both sides.
unsafe impl Send for SendPtr {}

fn main() {
    let num_threads: usize = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(4);
    let duration_secs: u64 = std::env::args()
        .nth(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_DURATION_SECS);

    println!(
        "Larson benchmark: {} threads, {} seconds",
        num_threads, duration_secs
    );

    let heap: &'static SlabHeap = match create_heap(
        SIZE_CLASS,
        OBJECTS_PER_THREAD * num_threads,
        num_threads,
    ) {
        Ok(heap) => Box::leak(Box::new(heap)),
        Err(e) => {
            eprintln!("heap creation failed: {e}");
            std::process::exit(1);
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    let total_ops = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::sync_channel::<Vec<SendPtr>>(num_threads * 4);

    let freer = std::thread::spawn(move || {
        let mut freed = 0usize;
        for batch in rx {
            for p in batch {
                unsafe { heap.free(p.0) };
                freed += 1;
            }
        }
        freed
    });

    let handles: Vec<_> = (0..num_threads)
        .map(|tid| {
            let running = Arc::clone(&running);
            let total_ops = Arc::clone(&total_ops);
            let failed = Arc::clone(&failed);
            let tx = tx.clone();
            std::thread::spawn(move || {
                larson_worker(tid, heap, &running, &total_ops, &failed, tx);
            })
        })
        .collect();
    drop(tx);

    let start = Instant::now();
    std::thread::sleep(Duration::from_secs(duration_secs));
    running.store(false, Ordering::Release);

    for h in handles {
        h.join().unwrap();
    }
    let freed = freer.join().unwrap();

    let elapsed = start.elapsed().as_secs_f64();
    let ops = total_ops.load(Ordering::Relaxed);
    let mops = ops as f64 / elapsed / 1_000_000.0;

    println!("Total operations: {}", ops);
    println!("Objects freed: {}", freed);
    println!("Exhausted allocations: {}", failed.load(Ordering::Relaxed));
    println!("Throughput: {:.2} Mops/sec", mops);
    println!("Per-thread: {:.2} Mops/sec", mops / num_threads as f64);
}

fn larson_worker(
    tid: usize,
    heap: &'static SlabHeap,
    running: &AtomicBool,
    total_ops: &AtomicUsize,
    failed: &AtomicUsize,
    tx: mpsc::SyncSender<Vec<SendPtr>>,
) {
    // Simple LCG PRNG seeded by thread ID
    let mut rng = (tid as u64).wrapping_mul(6364136223846793005).wrapping_add(1);
    let mut handle = heap.handle();
    let mut batch: Vec<SendPtr> = Vec::with_capacity(BATCH_SIZE);
    let mut ops = 0usize;

    while running.load(Ordering::Relaxed) {
        match handle.alloc() {
            Ok(p) => {
                let touch = 8 + (next_random(&mut rng) as usize) % (SIZE_CLASS - 8);
                unsafe { std::ptr::write_bytes(p.as_ptr(), 0xCD, touch) };
                batch.push(SendPtr(p));
                ops += 1;
            }
            Err(_) => {
                failed.fetch_add(1, Ordering::Relaxed);
                std::thread::yield_now();
            }
        }

        if batch.len() == BATCH_SIZE {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(BATCH_SIZE));
            if tx.send(full).is_err() {
                break;
            }
            // the freer's half of the work
            ops += BATCH_SIZE;
        }

        if ops >= 10000 {
            total_ops.fetch_add(ops, Ordering::Relaxed);
            ops = 0;
        }
    }

    total_ops.fetch_add(ops, Ordering::Relaxed);
    if !batch.is_empty() {
        let _ = tx.send(batch);
    }
}

fn next_random(rng: &mut u64) -> u64 {
    *rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    *rng >> 33
}
