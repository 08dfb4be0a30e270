use core::sync::atomic::{AtomicUsize, Ordering};

/// Align `value` up to the next multiple of `align`, or `None` on overflow.
/// `align` must be a power of two.
#[inline]
pub const fn checked_align_up(value: usize, align: usize) -> Option<usize> {
    match value.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

/// Check if `value` is aligned to `align`.
#[inline(always)]
pub const fn is_aligned(value: usize, align: usize) -> bool {
    value & (align - 1) == 0
}

/// Size of the free-list link stored in the first word of every free object.
pub const WORD: usize = core::mem::size_of::<usize>();

/// Stride reserved for each partition header. Two cache lines, so the
/// adjacent-line prefetcher never pulls a neighbour's head into our line.
pub const PARTITION_STRIDE: usize = 128;

/// Upper bound on partitions per heap (and on the configured default).
pub const MAX_PARTITIONS: usize = 64;

/// Default ceiling of the process break, in bytes.
pub const DEFAULT_BREAK_CAPACITY: usize = 64 * 1024 * 1024; // 64 MiB

/// Runtime page size. Starts at 4096 so `page_size()` is usable before
/// `init_page_size()` has run.
static PAGE_SIZE_CACHED: AtomicUsize = AtomicUsize::new(4096);

/// Initialize the page size from the OS. Idempotent.
pub fn init_page_size() {
    let ps = crate::platform::sys::page_size();
    let ps = if ps.is_power_of_two() { ps } else { 4096 };
    PAGE_SIZE_CACHED.store(ps, Ordering::Release);
}

/// Get the system page size (4096 until initialized).
#[inline(always)]
pub fn page_size() -> usize {
    PAGE_SIZE_CACHED.load(Ordering::Relaxed)
}
