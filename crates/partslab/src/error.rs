//! Allocator error types.
//!
//! Every failure here is recoverable and reported to the immediate caller.
//! Misuse (double free, foreign pointers, concurrent freers) is undefined and
//! has no variant.

use thiserror::Error;

/// Errors returned by the arena, break and slab operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    /// Capacity exhausted: the break ceiling would be crossed, or every
    /// partition of a heap is full.
    #[error("out of memory: requested {requested} bytes, {available} available")]
    OutOfMemory {
        /// Bytes the caller asked for.
        requested: usize,
        /// Bytes still available at the time of the request.
        available: usize,
    },

    /// `set_break` was given an address outside the arena.
    #[error("break address {address:#x} outside arena [{base:#x}, {limit:#x})")]
    BreakOutOfRange {
        /// Requested break address.
        address: usize,
        /// Arena base.
        base: usize,
        /// Exclusive upper bound (`base + max_offset`).
        limit: usize,
    },

    /// Degenerate heap parameters.
    #[error("invalid heap configuration: {reason}")]
    InvalidConfig {
        /// Which rule the parameters broke.
        reason: &'static str,
    },

    /// The arena backing could not supply a block.
    #[error("arena backing could not supply {bytes} bytes")]
    ArenaUnavailable {
        /// Size of the failed request.
        bytes: usize,
    },
}

impl AllocError {
    /// True for the capacity-exhaustion class of errors.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(
            self,
            AllocError::OutOfMemory { .. } | AllocError::BreakOutOfRange { .. }
        )
    }
}

/// Result alias used across the crate.
pub type Result<T> = core::result::Result<T, AllocError>;
