use crate::arena::{ArenaBlock, ArenaSource, MmapArena};
use crate::config;
use crate::error::{AllocError, Result};
use crate::slab::handle::HeapHandle;
use crate::slab::partition::Partition;
use crate::util::{checked_align_up, is_aligned, page_size, PARTITION_STRIDE, WORD};
use core::ops::Range;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Heap metadata, written into the first page of the backing block.
#[repr(C, align(128))]
struct HeapHeader {
    size_class: usize,
    element_count: usize,
    partition_count: usize,
    partition_size: usize,
    data_base: usize,
    partitions: *const Partition,
    /// Round-robin cursor for home-partition assignment. Own cache line so
    /// handle creation never disturbs the read-only fields above.
    round_robin: Padded<AtomicUsize>,
}

#[repr(C, align(128))]
struct Padded<T>(T);

/// Validated heap geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Geometry {
    size_class: usize,
    element_count: usize,
    partition_count: usize,
    partition_size: usize,
    slots_per_partition: usize,
    /// Offset of the partition table from the block base.
    table_offset: usize,
    /// Offset of the first object from the block base.
    data_offset: usize,
    total_bytes: usize,
}

impl Geometry {
    fn new(size_class: usize, element_count: usize, partition_count: usize) -> Result<Self> {
        config::read_config();
        let invalid = |reason: &'static str| {
            tracing::warn!(
                size_class,
                element_count,
                partition_count,
                reason,
                "rejected slab heap configuration"
            );
            Err(AllocError::InvalidConfig { reason })
        };

        if partition_count == 0 {
            return invalid("partition count must be non-zero");
        }
        if size_class < WORD || size_class % WORD != 0 {
            return invalid("size class must be a non-zero multiple of the machine word");
        }
        let Some(data_bytes) = size_class.checked_mul(element_count) else {
            return invalid("heap size overflows");
        };
        let partition_size = data_bytes / partition_count;
        if partition_size == 0 {
            return invalid("partition size is zero");
        }
        if element_count % partition_count != 0 {
            return invalid("element count must be divisible by partition count");
        }
        let slots_per_partition = element_count / partition_count;
        if slots_per_partition >= u32::MAX as usize {
            return invalid("too many objects per partition");
        }

        let page = page_size();
        let table_bytes = partition_count
            .checked_mul(PARTITION_STRIDE)
            .and_then(|b| checked_align_up(b, page));
        let Some(table_bytes) = table_bytes else {
            return invalid("partition table overflows");
        };
        let data_offset = page + table_bytes;
        let Some(total_bytes) = data_offset.checked_add(data_bytes) else {
            return invalid("heap size overflows");
        };

        Ok(Geometry {
            size_class,
            element_count,
            partition_count,
            partition_size,
            slots_per_partition,
            table_offset: page,
            data_offset,
            total_bytes,
        })
    }
}

/// A pool of fixed-size objects split into independently managed
/// partitions.
///
/// Any number of actors may allocate concurrently, each through its own
/// [`HeapHandle`]. At most one actor may free at a time; see [`SlabHeap::free`].
pub struct SlabHeap {
    header: NonNull<HeapHeader>,
    block: ArenaBlock,
}

// All mutable state is in the partition heads and the round-robin cursor,
// both atomics. Everything else is written once during creation.
unsafe impl Send for SlabHeap {}
unsafe impl Sync for SlabHeap {}

impl SlabHeap {
    /// Bytes of backing storage a heap with these parameters needs: one
    /// metadata page, the partition table rounded up to whole pages, then the
    /// objects.
    pub fn required_bytes(
        size_class: usize,
        element_count: usize,
        partition_count: usize,
    ) -> Result<usize> {
        Geometry::new(size_class, element_count, partition_count).map(|g| g.total_bytes)
    }

    /// Create a heap on a block from `source`.
    pub fn create<S: ArenaSource>(
        source: &S,
        size_class: usize,
        element_count: usize,
        partition_count: usize,
    ) -> Result<Self> {
        let geometry = Geometry::new(size_class, element_count, partition_count)?;
        let block = source.acquire(geometry.total_bytes, 1)?;
        Self::build(block, geometry)
    }

    /// Create a heap on a block the caller already acquired. The block must
    /// be at least [`SlabHeap::required_bytes`] long.
    pub fn create_in(
        block: ArenaBlock,
        size_class: usize,
        element_count: usize,
        partition_count: usize,
    ) -> Result<Self> {
        let geometry = Geometry::new(size_class, element_count, partition_count)?;
        if block.len() < geometry.total_bytes {
            return Err(AllocError::ArenaUnavailable {
                bytes: geometry.total_bytes,
            });
        }
        Self::build(block, geometry)
    }

    /// Create a heap with the configured default partition count, lowered
    /// to the nearest count that divides `element_count`.
    pub fn with_default_partitions(size_class: usize, element_count: usize) -> Result<Self> {
        let mut partitions = config::partition_count();
        while partitions > 1 && element_count % partitions != 0 {
            partitions -= 1;
        }
        Self::create(&MmapArena, size_class, element_count, partitions)
    }

    fn build(block: ArenaBlock, g: Geometry) -> Result<Self> {
        if !is_aligned(block.base(), page_size()) {
            return Err(AllocError::InvalidConfig {
                reason: "arena block is not page-aligned",
            });
        }
        let base = block.as_ptr();
        let data_base = block.base() + g.data_offset;
        // SAFETY: the block is page-aligned, at least `total_bytes` long and
        // owned by us; header, table and data regions are disjoint.
        unsafe {
            let table = base.add(g.table_offset) as *mut Partition;
            for i in 0..g.partition_count {
                let part_base = data_base + i * g.partition_size;
                table.add(i).write(Partition::new(
                    part_base,
                    g.partition_size,
                    g.size_class,
                    i,
                    g.slots_per_partition as u32,
                ));
            }
            let header = base as *mut HeapHeader;
            header.write(HeapHeader {
                size_class: g.size_class,
                element_count: g.element_count,
                partition_count: g.partition_count,
                partition_size: g.partition_size,
                data_base,
                partitions: table,
                round_robin: Padded(AtomicUsize::new(0)),
            });
            tracing::debug!(
                size_class = g.size_class,
                element_count = g.element_count,
                partition_count = g.partition_count,
                partition_size = g.partition_size,
                bytes = g.total_bytes,
                "slab heap created"
            );
            Ok(SlabHeap {
                header: NonNull::new_unchecked(header),
                block,
            })
        }
    }

    #[inline(always)]
    fn header(&self) -> &HeapHeader {
        // SAFETY: written in `build`, lives as long as the block.
        unsafe { self.header.as_ref() }
    }

    #[inline(always)]
    pub(crate) fn partitions(&self) -> &[Partition] {
        let h = self.header();
        // SAFETY: `partition_count` headers were written in `build`.
        unsafe { core::slice::from_raw_parts(h.partitions, h.partition_count) }
    }

    /// A fresh per-actor handle. Its home partition is picked on its first
    /// allocation.
    pub fn handle(&self) -> HeapHandle<'_> {
        HeapHandle::new(self)
    }

    /// Next home partition in round-robin order.
    pub(crate) fn assign_home(&self) -> usize {
        let h = self.header();
        h.round_robin.0.fetch_add(1, Ordering::Relaxed) % h.partition_count
    }

    /// Allocate one object, starting at partition `home` and stealing from
    /// the following partitions in ring order when it is exhausted.
    pub fn alloc_from(&self, home: usize) -> Result<NonNull<u8>> {
        let partitions = self.partitions();
        let n = partitions.len();
        let home = home % n;
        if let Some(obj) = partitions[home].pop() {
            return Ok(obj);
        }
        for step in 1..n {
            let victim = &partitions[(home + step) % n];
            if let Some(obj) = victim.pop() {
                tracing::trace!(home, victim = victim.offset(), "stole from partition");
                return Ok(obj);
            }
        }
        tracing::debug!(
            size_class = self.size_class(),
            element_count = self.element_count(),
            "slab heap exhausted"
        );
        Err(AllocError::OutOfMemory {
            requested: self.size_class(),
            available: 0,
        })
    }

    /// Return `ptr` to its partition's free list.
    ///
    /// # Safety
    /// `ptr` must have come from an allocation on this heap and must not be
    /// freed twice. Only one actor may free at a time across the whole heap;
    /// concurrent freers must serialize externally.
    pub unsafe fn free(&self, ptr: NonNull<u8>) {
        let index = self.partition_of(ptr.as_ptr());
        debug_assert!(index.is_some(), "free of a pointer outside this heap");
        if let Some(index) = index {
            self.partitions()[index].push(ptr);
        }
    }

    /// Tear the heap down. The backing memory is never returned.
    pub fn destroy(self) {
        tracing::debug!(size_class = self.size_class(), "slab heap destroyed");
        self.block.release();
    }

    #[inline]
    pub fn size_class(&self) -> usize {
        self.header().size_class
    }

    #[inline]
    pub fn element_count(&self) -> usize {
        self.header().element_count
    }

    /// Number of objects the heap can hand out at once.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.element_count()
    }

    #[inline]
    pub fn partition_count(&self) -> usize {
        self.header().partition_count
    }

    /// Bytes per partition.
    #[inline]
    pub fn partition_size(&self) -> usize {
        self.header().partition_size
    }

    /// Start of the object region.
    #[inline]
    pub fn data_base(&self) -> *mut u8 {
        self.header().data_base as *mut u8
    }

    /// Address range covered by objects.
    pub fn data_range(&self) -> Range<usize> {
        let h = self.header();
        h.data_base..h.data_base + h.partition_size * h.partition_count
    }

    /// Address range of partition `index`.
    pub fn partition_range(&self, index: usize) -> Option<Range<usize>> {
        self.partitions()
            .get(index)
            .map(|p| p.base()..p.base() + p.size())
    }

    /// Index of the partition owning `ptr`, if it points into this heap.
    pub fn partition_of(&self, ptr: *const u8) -> Option<usize> {
        let addr = ptr as usize;
        let range = self.data_range();
        if !range.contains(&addr) {
            return None;
        }
        Some((addr - range.start) / self.partition_size())
    }

    /// Point-in-time view of partition `index`.
    pub fn partition_stats(&self, index: usize) -> Option<PartitionStats> {
        let part = self.partitions().get(index)?;
        let (next_free_slot, generation) = part.head();
        Some(PartitionStats {
            index: part.offset(),
            base: part.base(),
            size: part.size(),
            first_free: part.first_free(),
            next_free_slot: next_free_slot as usize,
            generation,
            exhausted: part.is_exhausted(),
        })
    }
}

impl core::fmt::Debug for SlabHeap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SlabHeap")
            .field("size_class", &self.size_class())
            .field("element_count", &self.element_count())
            .field("partition_count", &self.partition_count())
            .field("partition_size", &self.partition_size())
            .field("data_base", &self.data_base())
            .finish()
    }
}

/// Snapshot of one partition, for diagnostics. Racy by nature under
/// concurrent use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionStats {
    pub index: usize,
    pub base: usize,
    pub size: usize,
    /// Address of the first free object (`base + size` when exhausted).
    pub first_free: usize,
    /// Slot index of the first free object.
    pub next_free_slot: usize,
    /// Number of successful pops so far (wrapping).
    pub generation: u32,
    pub exhausted: bool,
}

/// `createHeap` on the default mmap arena.
pub fn create_heap(
    size_class: usize,
    element_count: usize,
    partition_count: usize,
) -> Result<SlabHeap> {
    SlabHeap::create(&MmapArena, size_class, element_count, partition_count)
}

/// `alloc` through an actor's handle.
#[inline]
pub fn alloc(handle: &mut HeapHandle<'_>) -> Result<NonNull<u8>> {
    handle.alloc()
}

/// `free` back into `heap`.
///
/// # Safety
/// See [`SlabHeap::free`].
#[inline]
pub unsafe fn free(heap: &SlabHeap, ptr: NonNull<u8>) {
    heap.free(ptr);
}

/// `destroyHeap`: releases nothing.
pub fn destroy_heap(heap: SlabHeap) {
    heap.destroy();
}

// Keep the header inside its reserved page.
const _: () = assert!(core::mem::size_of::<HeapHeader>() <= 4096);
