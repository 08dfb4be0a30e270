//! Memory subsystem for a freestanding interpreter runtime: zero-filled arena
//! blocks, a `brk`/`sbrk`-style break over one of them, and a lock-free
//! partitioned slab heap for fixed-size objects.

extern crate libc;

pub mod arena;
pub mod brk;
pub mod config;
pub mod error;
pub mod platform;
pub mod slab;
pub mod sync;
pub mod util;

pub use arena::{acquire_arena, ArenaBlock, ArenaSource, MmapArena, SystemArena};
pub use brk::{adjust_break, set_break, BreakAllocator};
pub use error::{AllocError, Result};
pub use slab::{alloc, create_heap, destroy_heap, free, HeapHandle, PartitionStats, SlabHeap};
