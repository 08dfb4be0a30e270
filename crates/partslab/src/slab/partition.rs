//! One partition of a slab heap: a lock-free stack of free objects.
//!
//! The head of the stack and its generation counter share one `AtomicU64`:
//! low 32 bits hold the slot index of the first free object, high 32 bits
//! hold a generation that every successful pop increments. A popper that
//! read a stale head (the object was popped, freed and pushed back in the
//! meantime) sees a different generation and its CAS fails.
//!
//! Free objects carry their link in their first word. Zero means "next slot
//! in address order", so a freshly zeroed partition is already a complete
//! free list. A slot index equal to `slots` means the partition is exhausted.

use core::ptr::NonNull;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::util::PARTITION_STRIDE;

#[inline(always)]
const fn pack(slot: u32, generation: u32) -> u64 {
    ((generation as u64) << 32) | slot as u64
}

#[inline(always)]
const fn unpack(word: u64) -> (u32, u32) {
    (word as u32, (word >> 32) as u32)
}

/// Partition header. Lives in the heap's metadata region, one per
/// `PARTITION_STRIDE` bytes, so neighbouring heads never share a line.
#[repr(C, align(128))]
pub(crate) struct Partition {
    /// Packed `(first_free slot, generation)`.
    head: AtomicU64,
    base: usize,
    size: usize,
    size_class: usize,
    offset: usize,
    slots: u32,
}

const _: () = assert!(core::mem::size_of::<Partition>() == PARTITION_STRIDE);
const _: () = assert!(core::mem::align_of::<Partition>() == PARTITION_STRIDE);

impl Partition {
    pub(crate) const fn new(
        base: usize,
        size: usize,
        size_class: usize,
        offset: usize,
        slots: u32,
    ) -> Self {
        Partition {
            head: AtomicU64::new(pack(0, 0)),
            base,
            size,
            size_class,
            offset,
            slots,
        }
    }

    #[inline]
    pub(crate) fn base(&self) -> usize {
        self.base
    }

    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    #[inline(always)]
    fn slot_addr(&self, slot: u32) -> usize {
        self.base + slot as usize * self.size_class
    }

    /// Slot index of `addr`, clamped to the exhausted marker. The clamp only
    /// matters for links read during a lost race, which the CAS discards.
    #[inline(always)]
    fn slot_of(&self, addr: usize) -> u32 {
        let slot = addr.wrapping_sub(self.base) / self.size_class;
        slot.min(self.slots as usize) as u32
    }

    /// Snapshot of `(first_free slot, generation)`.
    #[inline]
    pub(crate) fn head(&self) -> (u32, u32) {
        unpack(self.head.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn is_exhausted(&self) -> bool {
        self.head().0 >= self.slots
    }

    /// Address of the first free object (`base + size` when exhausted).
    #[inline]
    pub(crate) fn first_free(&self) -> usize {
        self.slot_addr(self.head().0)
    }

    /// Pop one object. Returns `None` once the partition is exhausted; a
    /// failed CAS retries on this partition.
    #[inline]
    pub(crate) fn pop(&self) -> Option<NonNull<u8>> {
        loop {
            let word = self.head.load(Ordering::Acquire);
            let (slot, generation) = unpack(word);
            if slot >= self.slots {
                return None;
            }
            let target = self.slot_addr(slot);
            // SAFETY: `target` is a word-aligned slot inside this partition.
            // If another actor already owns it, the word may be user data;
            // the generation check below rejects whatever we derive from it.
            let link = unsafe { (*(target as *const AtomicUsize)).load(Ordering::Relaxed) };
            let next = if link == 0 {
                slot + 1
            } else {
                self.slot_of(link)
            };
            if self
                .head
                .compare_exchange_weak(
                    word,
                    pack(next, generation.wrapping_add(1)),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return NonNull::new(target as *mut u8);
            }
            core::hint::spin_loop();
        }
    }

    /// Push `ptr` back as the new first free object.
    ///
    /// The generation is left alone: every pop already bumps it, so a popper
    /// holding a stale head still fails its CAS.
    ///
    /// # Safety
    /// `ptr` must be an object of this partition that is currently allocated
    /// and is not used again by the caller.
    #[inline]
    pub(crate) unsafe fn push(&self, ptr: NonNull<u8>) {
        let addr = ptr.as_ptr() as usize;
        let slot = self.slot_of(addr);
        debug_assert!(slot < self.slots, "pointer outside partition");
        debug_assert_eq!((addr - self.base) % self.size_class, 0, "interior pointer");
        let link = &*(addr as *const AtomicUsize);
        loop {
            let word = self.head.load(Ordering::Relaxed);
            let (first_free, generation) = unpack(word);
            // Always an explicit, non-zero address; even the exhausted marker
            // maps to `base + size`.
            link.store(self.slot_addr(first_free), Ordering::Relaxed);
            if self
                .head
                .compare_exchange_weak(
                    word,
                    pack(slot, generation),
                    Ordering::Release,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                return;
            }
        }
    }
}
