use std::alloc::{alloc_zeroed, Layout};

// No VirtualAlloc binding here; page-aligned zeroed blocks come from the
// process allocator instead. The memory is still zero on first touch.
const PAGE: usize = 4096;

pub unsafe fn map_anonymous(size: usize) -> *mut u8 {
    match Layout::from_size_align(size, PAGE) {
        Ok(layout) => alloc_zeroed(layout),
        Err(_) => core::ptr::null_mut(),
    }
}

pub fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

pub fn page_size() -> usize {
    PAGE
}
