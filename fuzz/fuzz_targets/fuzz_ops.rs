#![no_main]

use libfuzzer_sys::fuzz_target;
use partslab::{SlabHeap, SystemArena};
use std::ptr::NonNull;

/// Fuzz target that interprets a byte slice as a heap geometry followed by
/// a sequence of heap operations, checked against a model.
///
/// Header:
///   byte 0: size class in words (1..=32)
///   byte 1: partition count (1..=8)
///   byte 2: slots per partition (1..=64)
/// Each operation is two bytes:
///   byte 0: opcode (even = alloc through handle `byte 1 % HANDLES`, odd = free)
///   byte 1: handle index or live-object index
const HANDLES: usize = 4;
const WORD: usize = std::mem::size_of::<usize>();

fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }
    let size_class = (data[0] as usize % 32 + 1) * WORD;
    let partitions = data[1] as usize % 8 + 1;
    let per_partition = data[2] as usize % 64 + 1;
    let capacity = partitions * per_partition;

    let heap = match SlabHeap::create(&SystemArena, size_class, capacity, partitions) {
        Ok(heap) => heap,
        Err(_) => return,
    };
    let range = heap.data_range();
    let mut handles: Vec<_> = (0..HANDLES).map(|_| heap.handle()).collect();
    let mut live: Vec<(NonNull<u8>, u8)> = Vec::new();

    let mut i = 3;
    while i + 2 <= data.len() {
        let opcode = data[i];
        let arg = data[i + 1] as usize;
        i += 2;

        if opcode & 1 == 0 {
            match handles[arg % HANDLES].alloc() {
                Ok(p) => {
                    let addr = p.as_ptr() as usize;
                    assert!(live.len() < capacity, "allocated past capacity");
                    assert!(range.contains(&addr), "object outside the heap");
                    assert!(
                        live.iter().all(|(q, _)| *q != p),
                        "object handed out twice"
                    );
                    let tag = opcode;
                    unsafe { std::ptr::write_bytes(p.as_ptr(), tag, size_class) };
                    live.push((p, tag));
                }
                Err(e) => {
                    assert!(e.is_out_of_memory());
                    assert_eq!(live.len(), capacity, "spurious exhaustion");
                }
            }
        } else if !live.is_empty() {
            let (p, tag) = live.swap_remove(arg % live.len());
            let bytes = unsafe { std::slice::from_raw_parts(p.as_ptr(), size_class) };
            assert!(bytes.iter().all(|&b| b == tag), "object clobbered");
            unsafe { heap.free(p) };
        }
    }
});
