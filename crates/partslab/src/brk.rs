//! Break-style bump allocator over one arena block.
//!
//! Mirrors the classic `brk`/`sbrk` pair: the break is an offset into the
//! block that only ever moves by explicit request. `adjust_break(n)` returns
//! the break as it was *before* the move, so `adjust_break(0)` reports the
//! current break and `adjust_break(n)` reports where the new region starts.
//!
//! The state machine has no concurrency guarantees. The process-wide
//! instance behind [`set_break`] and [`adjust_break`] sits behind a lock only
//! so it can live in a `static`; callers still have to serialize logically
//! related calls themselves.

use crate::arena::{ArenaBlock, ArenaSource, MmapArena};
use crate::config;
use crate::error::{AllocError, Result};
use crate::sync::Mutex;

/// Bump-pointer state over one arena block.
///
/// Invariant: `0 <= current_offset < max_offset <= block.len()`.
#[derive(Debug)]
pub struct BreakAllocator {
    block: ArenaBlock,
    current_offset: isize,
    max_offset: isize,
}

impl BreakAllocator {
    /// Build a break over `block` with ceiling `max_offset`.
    pub fn new(block: ArenaBlock, max_offset: usize) -> Result<Self> {
        if max_offset == 0 || max_offset > block.len() || max_offset > isize::MAX as usize {
            return Err(AllocError::InvalidConfig {
                reason: "break ceiling must be non-zero and fit the arena block",
            });
        }
        Ok(Self {
            block,
            current_offset: 0,
            max_offset: max_offset as isize,
        })
    }

    /// Acquire a `capacity`-byte block from `source` and start the break at
    /// its base.
    pub fn with_capacity<S: ArenaSource>(source: &S, capacity: usize) -> Result<Self> {
        let block = source.acquire(capacity, 1)?;
        Self::new(block, capacity)
    }

    /// Start of the arena block.
    #[inline]
    pub fn base(&self) -> *mut u8 {
        self.block.as_ptr()
    }

    #[inline]
    pub fn max_offset(&self) -> usize {
        self.max_offset as usize
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.current_offset as usize
    }

    /// The current break address.
    #[inline]
    pub fn current_break(&self) -> *mut u8 {
        self.base().wrapping_add(self.offset())
    }

    /// Move the break to `address`, which must lie in
    /// `[base, base + max_offset)`.
    pub fn set_break(&mut self, address: *mut u8) -> Result<()> {
        let base = self.block.base();
        let limit = base + self.max_offset();
        let addr = address as usize;
        if addr < base || addr >= limit {
            tracing::debug!(address = addr, base, limit, "set_break outside arena");
            return Err(AllocError::BreakOutOfRange {
                address: addr,
                base,
                limit,
            });
        }
        self.current_offset = (addr - base) as isize;
        Ok(())
    }

    /// Move the break by `increment` bytes and return the previous break.
    /// Shrinking below the base clamps to the base.
    pub fn adjust_break(&mut self, increment: isize) -> Result<*mut u8> {
        let available = self.max_offset() - self.offset();
        let oom = AllocError::OutOfMemory {
            requested: increment.max(0) as usize,
            available,
        };
        let candidate = self.current_offset.checked_add(increment).ok_or(oom)?.max(0);
        if candidate >= self.max_offset {
            tracing::debug!(increment, available, "break ceiling reached");
            return Err(oom);
        }
        let previous = self.current_break();
        self.current_offset = candidate;
        Ok(previous)
    }
}

/// The process break, created on first use.
static BREAK: Mutex<Option<BreakAllocator>> = Mutex::new(None);

fn with_process_break<R>(f: impl FnOnce(&mut BreakAllocator) -> Result<R>) -> Result<R> {
    let mut guard = BREAK.lock();
    if let Some(state) = guard.as_mut() {
        return f(state);
    }
    let capacity = config::break_capacity();
    let state = guard.insert(BreakAllocator::with_capacity(&MmapArena, capacity)?);
    tracing::debug!(base = ?state.base(), capacity, "process break initialized");
    f(state)
}

/// `brk`: move the process break to `address`.
pub fn set_break(address: *mut u8) -> Result<()> {
    with_process_break(|state| state.set_break(address))
}

/// `sbrk`: move the process break by `increment` and return the previous break.
pub fn adjust_break(increment: isize) -> Result<*mut u8> {
    with_process_break(|state| state.adjust_break(increment))
}

/// Base of the process break arena (initializing it if needed).
pub fn break_base() -> Result<*mut u8> {
    with_process_break(|state| Ok(state.base()))
}
