//! Arena backing: the single capability the rest of the runtime consumes,
//! "give me N zero-filled bytes".
//!
//! Zero-on-first-touch is a hard precondition, not a convenience. The slab
//! heap never initializes its free-list links; a zero link word means "the
//! next slot in address order", which only holds on freshly zeroed memory.
//!
//! Blocks are never returned. [`ArenaBlock`] has no `Drop`, and
//! [`ArenaBlock::release`] does nothing.

use crate::error::{AllocError, Result};
use crate::platform;
use crate::util::{checked_align_up, page_size};
use core::ptr::NonNull;
use std::alloc::{alloc_zeroed, Layout};

/// A zero-filled byte range `[base, base + len)` that lives for the rest of
/// the process.
#[derive(Debug)]
pub struct ArenaBlock {
    base: NonNull<u8>,
    len: usize,
}

// The block is plain memory; sharing rules are up to whoever carves it.
unsafe impl Send for ArenaBlock {}
unsafe impl Sync for ArenaBlock {}

impl ArenaBlock {
    /// Wrap an existing zeroed range.
    ///
    /// # Safety
    /// `base..base+len` must be valid for reads and writes for the rest of
    /// the process, zero-filled, and not handed out anywhere else.
    pub unsafe fn from_raw_parts(base: NonNull<u8>, len: usize) -> Self {
        Self { base, len }
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    #[inline]
    pub fn base(&self) -> usize {
        self.base.as_ptr() as usize
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// One past the last byte.
    #[inline]
    pub fn end(&self) -> usize {
        self.base() + self.len
    }

    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        (self.base()..self.end()).contains(&addr)
    }

    /// Give the block back. Arena memory is never returned to the OS, so this
    /// only consumes the handle.
    pub fn release(self) {}
}

/// Source of zero-filled backing blocks.
///
/// # Safety
/// Implementors must hand out blocks that are zero-filled, page-aligned,
/// valid for the rest of the process and never handed out twice.
pub unsafe trait ArenaSource {
    /// Obtain `count * element_size` zeroed bytes. Zero-sized or overflowing
    /// requests fail.
    fn acquire(&self, count: usize, element_size: usize) -> Result<ArenaBlock>;
}

fn request_bytes(count: usize, element_size: usize) -> Result<usize> {
    crate::config::read_config();
    match count.checked_mul(element_size) {
        Some(bytes) if bytes > 0 => Ok(bytes),
        Some(bytes) => Err(AllocError::ArenaUnavailable { bytes }),
        None => Err(AllocError::ArenaUnavailable { bytes: usize::MAX }),
    }
}

/// Anonymous private mappings straight from the kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct MmapArena;

unsafe impl ArenaSource for MmapArena {
    fn acquire(&self, count: usize, element_size: usize) -> Result<ArenaBlock> {
        let bytes = request_bytes(count, element_size)?;
        let mapped = checked_align_up(bytes, page_size())
            .ok_or(AllocError::ArenaUnavailable { bytes })?;
        // SAFETY: `mapped` is non-zero and page-aligned.
        let base = unsafe { platform::map_anonymous(mapped) };
        match NonNull::new(base) {
            Some(base) => Ok(ArenaBlock { base, len: bytes }),
            None => {
                tracing::debug!(bytes, "anonymous mapping failed");
                Err(AllocError::ArenaUnavailable { bytes })
            }
        }
    }
}

/// Page-aligned zeroed blocks from the Rust global allocator, for hosted
/// builds where an OS heap does exist.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemArena;

unsafe impl ArenaSource for SystemArena {
    fn acquire(&self, count: usize, element_size: usize) -> Result<ArenaBlock> {
        let bytes = request_bytes(count, element_size)?;
        let layout = Layout::from_size_align(bytes, page_size())
            .map_err(|_| AllocError::ArenaUnavailable { bytes })?;
        // SAFETY: layout has non-zero size.
        let base = unsafe { alloc_zeroed(layout) };
        NonNull::new(base)
            .map(|base| ArenaBlock { base, len: bytes })
            .ok_or(AllocError::ArenaUnavailable { bytes })
    }
}

/// Acquire a zeroed block from the default (mmap) source.
pub fn acquire_arena(count: usize, element_size: usize) -> Result<ArenaBlock> {
    MmapArena.acquire(count, element_size)
}
