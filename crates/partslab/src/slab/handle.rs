//! Per-actor allocation context.
//!
//! Each allocating actor (thread, fiber, cooperating process) owns one
//! `HeapHandle`. The first allocation through it takes the next partition in
//! the heap's round-robin order and caches it as the actor's home; every
//! later allocation starts there. Actors therefore spread over partitions
//! instead of all contending on one free list.

use crate::error::Result;
use crate::slab::heap::SlabHeap;
use core::ptr::NonNull;

pub struct HeapHandle<'heap> {
    heap: &'heap SlabHeap,
    home: Option<usize>,
}

impl<'heap> HeapHandle<'heap> {
    pub(crate) fn new(heap: &'heap SlabHeap) -> Self {
        HeapHandle { heap, home: None }
    }

    /// The heap this handle allocates from.
    #[inline]
    pub fn heap(&self) -> &'heap SlabHeap {
        self.heap
    }

    /// Home partition, once assigned.
    #[inline]
    pub fn home_partition(&self) -> Option<usize> {
        self.home
    }

    /// Allocate one `size_class`-byte object. Fails with
    /// [`AllocError::OutOfMemory`](crate::AllocError::OutOfMemory) when
    /// every partition is exhausted.
    #[inline]
    pub fn alloc(&mut self) -> Result<NonNull<u8>> {
        let heap = self.heap;
        let home = *self.home.get_or_insert_with(|| heap.assign_home());
        heap.alloc_from(home)
    }

    /// Free through the handle's heap.
    ///
    /// # Safety
    /// See [`SlabHeap::free`].
    #[inline]
    pub unsafe fn free(&self, ptr: NonNull<u8>) {
        self.heap.free(ptr);
    }
}

impl core::fmt::Debug for HeapHandle<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HeapHandle")
            .field("size_class", &self.heap.size_class())
            .field("home", &self.home)
            .finish()
    }
}
