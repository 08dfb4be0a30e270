#![no_main]

use libfuzzer_sys::fuzz_target;
use partslab::{AllocError, BreakAllocator, SlabHeap, SystemArena};

// Fuzz target for the size arithmetic on both allocators.
// The first 12 bytes are raw (size_class, element_count, partition_count)
// heap parameters; creation must either succeed with a consistent layout or
// fail with InvalidConfig/ArenaUnavailable. The rest are little-endian i16
// break deltas replayed against a model.

const BREAK_CAPACITY: usize = 64 * 1024;

fn read_u32(data: &[u8], at: usize) -> usize {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]) as usize
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 12 {
        return;
    }
    // Cap sizes to prevent OOM
    let size_class = read_u32(data, 0) % 8192;
    let element_count = read_u32(data, 4) % 4096;
    let partition_count = read_u32(data, 8) % 128;

    match SlabHeap::create(&SystemArena, size_class, element_count, partition_count) {
        Ok(heap) => {
            assert_eq!(heap.partition_count(), partition_count);
            assert_eq!(heap.partition_size() * partition_count, size_class * element_count);
            let range = heap.data_range();
            assert_eq!(range.end - range.start, size_class * element_count);
            let mut handle = heap.handle();
            for _ in 0..element_count {
                let p = match handle.alloc() {
                    Ok(p) => p,
                    Err(e) => panic!("alloc failed before capacity: {e}"),
                };
                assert!(range.contains(&(p.as_ptr() as usize)));
            }
            assert!(handle.alloc().is_err());
        }
        Err(AllocError::InvalidConfig { .. }) | Err(AllocError::ArenaUnavailable { .. }) => {}
        Err(e) => panic!("unexpected creation error: {e}"),
    }

    let mut brk = match BreakAllocator::with_capacity(&SystemArena, BREAK_CAPACITY) {
        Ok(brk) => brk,
        Err(_) => return,
    };
    let base = brk.base() as usize;
    let mut model: isize = 0;
    for chunk in data[12..].chunks_exact(2) {
        let delta = i16::from_le_bytes([chunk[0], chunk[1]]) as isize;
        let candidate = (model + delta).max(0);
        match brk.adjust_break(delta) {
            Ok(prev) => {
                assert!(candidate < BREAK_CAPACITY as isize);
                assert_eq!(prev as usize, base + model as usize);
                model = candidate;
            }
            Err(e) => {
                assert!(e.is_out_of_memory());
                assert!(candidate >= BREAK_CAPACITY as isize);
            }
        }
        assert_eq!(brk.offset(), model as usize);
    }
});
