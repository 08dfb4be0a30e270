pub mod handle;
pub mod heap;
mod partition;

pub use handle::HeapHandle;
pub use heap::{alloc, create_heap, destroy_heap, free, PartitionStats, SlabHeap};
