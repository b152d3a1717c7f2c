//! Track allocation counters for a [`Heap`](crate::Heap).

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Counters {
    /// Number of active allocations.
    pub allocation_count: usize,
    /// Total number of allocations.
    pub total_allocation_count: u64,

    /// Sum of active allocations' payload sizes.
    pub allocated_bytes: usize,
    /// Sum of all allocations' payload sizes.
    pub total_allocated_bytes: u64,

    /// Sum of free blocks' payload sizes.
    pub available_bytes: usize,
    /// Number of free blocks.
    pub fragment_count: usize,

    /// Size of the arena.
    pub claimed_bytes: usize,
    /// Number of times the arena was grown, initialization included.
    pub growth_count: u64,

    /// Number of frees of already-free blocks.
    pub redundant_free_count: u64,
}

impl Counters {
    pub const fn new() -> Self {
        Self {
            allocation_count: 0,
            total_allocation_count: 0,
            allocated_bytes: 0,
            total_allocated_bytes: 0,
            available_bytes: 0,
            fragment_count: 0,
            claimed_bytes: 0,
            growth_count: 0,
            redundant_free_count: 0,
        }
    }

    /// Returns the number of bytes unavailable due to boundary tags, sentinels and padding.
    pub const fn overhead_bytes(&self) -> usize {
        self.claimed_bytes - self.available_bytes - self.allocated_bytes
    }

    /// Returns the total number of allocated bytes freed.
    pub const fn total_freed_bytes(&self) -> u64 {
        self.total_allocated_bytes - self.allocated_bytes as u64
    }

    pub(crate) fn account_register_free(&mut self, size: usize) {
        self.available_bytes += size;
        self.fragment_count += 1;
    }
    pub(crate) fn account_deregister_free(&mut self, size: usize) {
        self.available_bytes -= size;
        self.fragment_count -= 1;
    }
    /// A listed free block grew in place by absorbing its successor.
    pub(crate) fn account_resize_free(&mut self, old_size: usize, new_size: usize) {
        self.available_bytes += new_size - old_size;
    }

    pub(crate) fn account_alloc(&mut self, size: usize) {
        self.allocation_count += 1;
        self.allocated_bytes += size;

        self.total_allocation_count += 1;
        self.total_allocated_bytes += size as u64;
    }

    pub(crate) fn account_dealloc(&mut self, size: usize) {
        self.allocation_count -= 1;
        self.allocated_bytes -= size;
    }

    pub(crate) fn account_grow(&mut self, bytes: usize) {
        self.claimed_bytes += bytes;
        self.growth_count += 1;
    }

    pub(crate) fn account_redundant_free(&mut self) {
        self.redundant_free_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use crate::block::OVERHEAD;
    use crate::heap::INIT_BYTES;
    use crate::*;

    #[test]
    fn test_alloc_free_counters() {
        let mut heap = Heap::new(Brk::new());
        heap.initialize().unwrap();

        let counters = *heap.counters();
        assert_eq!(counters.claimed_bytes, INIT_BYTES);
        assert_eq!(counters.growth_count, 1);
        assert_eq!(counters.available_bytes, 0);
        assert_eq!(counters.fragment_count, 0);
        assert_eq!(counters.overhead_bytes(), INIT_BYTES);

        let a = heap.allocate(20);
        let b = heap.allocate(64);
        let _c = heap.allocate(16);

        let counters = *heap.counters();
        assert_eq!(counters.allocation_count, 3);
        assert_eq!(counters.allocated_bytes, 24 + 64 + 16);
        assert_eq!(counters.growth_count, 4);
        assert_eq!(counters.claimed_bytes, INIT_BYTES + 24 + 64 + 16 + 3 * OVERHEAD);
        assert_eq!(counters.overhead_bytes(), INIT_BYTES + 3 * OVERHEAD);

        heap.deallocate(b);
        heap.deallocate(a);

        let counters = *heap.counters();
        assert_eq!(counters.allocation_count, 1);
        assert_eq!(counters.total_allocation_count, 3);
        assert_eq!(counters.fragment_count, 1);
        assert_eq!(counters.available_bytes, 24 + 64 + OVERHEAD);
        assert_eq!(counters.total_freed_bytes(), 24 + 64);

        // split the merged block
        let d = heap.allocate(16);
        let counters = *heap.counters();
        assert_eq!(d, a);
        assert_eq!(counters.fragment_count, 1);
        assert_eq!(counters.available_bytes, 24 + 64 - 16);
        assert_eq!(counters.growth_count, 4);

        heap.deallocate(a);
        heap.deallocate(a);
        let counters = *heap.counters();
        assert_eq!(counters.redundant_free_count, 1);
        assert_eq!(counters.available_bytes, 24 + 64 + OVERHEAD);
        assert_eq!(counters.overhead_bytes(), counters.claimed_bytes - counters.available_bytes - 16);
    }
}
