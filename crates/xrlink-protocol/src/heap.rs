//! Native allocator port.
//!
//! Every buffer handed across the boundary is allocated right before the
//! native invocation and released right after it returns. [`HeapLease`]
//! ties the release to scope exit so it also happens when the callback
//! unwinds.

use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};

/// A zero-initialised block obtained from a [`NativeHeap`].
#[derive(Debug)]
pub struct NativeBlock {
    id: u64,
    bytes: Vec<u8>,
}

impl NativeBlock {
    pub fn new(id: u64, len: usize) -> Self {
        Self {
            id,
            bytes: vec![0; len],
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// The allocator pair exposed by the native side.
pub trait NativeHeap: Send + Sync {
    /// Returns `None` when the allocation cannot be satisfied.
    fn alloc(&self, len: usize) -> Option<NativeBlock>;
    fn free(&self, block: NativeBlock);
}

/// Scoped ownership of one native block.
pub struct HeapLease<'h> {
    heap: &'h dyn NativeHeap,
    block: Option<NativeBlock>,
}

impl<'h> HeapLease<'h> {
    pub fn alloc(heap: &'h dyn NativeHeap, len: usize) -> Option<Self> {
        heap.alloc(len).map(|block| Self {
            heap,
            block: Some(block),
        })
    }
}

impl Deref for HeapLease<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.block
            .as_ref()
            .map(|block| block.bytes.as_slice())
            .unwrap_or_default()
    }
}

impl DerefMut for HeapLease<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        match self.block.as_mut() {
            Some(block) => block.bytes.as_mut_slice(),
            None => &mut [],
        }
    }
}

impl Drop for HeapLease<'_> {
    fn drop(&mut self) {
        if let Some(block) = self.block.take() {
            self.heap.free(block);
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    /// Blocks handed out and not yet freed.
    pub outstanding: usize,
    pub outstanding_bytes: usize,
    /// Blocks handed out since creation.
    pub allocations: u64,
    pub frees: u64,
    pub failed: u64,
}

/// Default heap backed by the process allocator, with bookkeeping.
#[derive(Debug, Default)]
pub struct SystemHeap {
    limit_bytes: Option<usize>,
    next_id: Mutex<u64>,
    stats: Mutex<HeapStats>,
}

impl SystemHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// A heap that refuses allocations once `limit_bytes` are outstanding.
    pub fn with_limit(limit_bytes: usize) -> Self {
        Self {
            limit_bytes: Some(limit_bytes),
            ..Self::default()
        }
    }

    pub fn stats(&self) -> HeapStats {
        *self.stats.lock()
    }

    pub fn outstanding(&self) -> usize {
        self.stats.lock().outstanding
    }

    pub fn allocations(&self) -> u64 {
        self.stats.lock().allocations
    }
}

impl NativeHeap for SystemHeap {
    fn alloc(&self, len: usize) -> Option<NativeBlock> {
        let mut stats = self.stats.lock();
        if let Some(limit) = self.limit_bytes
            && stats.outstanding_bytes + len > limit
        {
            stats.failed += 1;
            return None;
        }
        stats.outstanding += 1;
        stats.outstanding_bytes += len;
        stats.allocations += 1;
        drop(stats);

        let mut next_id = self.next_id.lock();
        *next_id += 1;
        Some(NativeBlock::new(*next_id, len))
    }

    fn free(&self, block: NativeBlock) {
        let mut stats = self.stats.lock();
        stats.outstanding = stats.outstanding.saturating_sub(1);
        stats.outstanding_bytes = stats.outstanding_bytes.saturating_sub(block.len());
        stats.frees += 1;
    }
}
