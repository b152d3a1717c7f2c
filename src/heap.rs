use log::{debug, trace, warn};

use crate::arena::{ArenaExhausted, ArenaProvider};
use crate::block::{
    self, adjust_size, header_of, next_block, prev_block, prev_footer_of, write_boundary, Addr,
    Block, ALIGN, LINK_SIZE, MIN_BLOCK_SIZE, OVERHEAD, TAG_SIZE,
};
use crate::llist::FreeList;
use crate::tag::Tag;
use crate::Span;

#[cfg(feature = "counters")]
use crate::Counters;

/// Declared size of the prologue: just enough for the free list's links.
pub(crate) const PROLOGUE_SIZE: usize = 2 * LINK_SIZE;
/// Padding word, prologue header, links, prologue footer, epilogue.
pub(crate) const INIT_BYTES: usize = 4 * TAG_SIZE + PROLOGUE_SIZE;

/// A double free was absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedundantFree;

impl core::fmt::Display for RedundantFree {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("block is already free")
    }
}

/// An explicit free-list allocator over one growable arena.
///
/// Blocks carry a boundary tag at both ends. Free blocks are threaded on a
/// circular doubly-linked list anchored at the arena's prologue block.
/// Allocation is first-fit in most-recently-freed order; deallocation
/// coalesces with free neighbours immediately.
///
/// Create with [`new`](Heap::new), then call [`initialize`](Heap::initialize) once.
///
/// No synchronization is performed; see [`lock`](Heap::lock) for a locked wrapper.
pub struct Heap<P: ArenaProvider> {
    provider: P,
    free_list: FreeList,
    is_initialized: bool,

    #[cfg(feature = "counters")]
    counters: Counters,
}

impl<P: ArenaProvider> core::fmt::Debug for Heap<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Heap")
            .field("bounds", &format_args!("{}", self.provider.current_bounds()))
            .field("sentinel", &format_args!("{:#x}", self.free_list.sentinel()))
            .field("is_initialized", &self.is_initialized)
            .finish()
    }
}

impl<P: ArenaProvider> Heap<P> {
    /// Wrap `provider`. The heap is unusable until [`initialize`](Heap::initialize) succeeds.
    pub const fn new(provider: P) -> Self {
        Self {
            provider,
            free_list: FreeList::new(TAG_SIZE * 2),
            is_initialized: false,

            #[cfg(feature = "counters")]
            counters: Counters::new(),
        }
    }

    /// Lay down the prologue and epilogue blocks.
    ///
    /// Calling this on an initialized heap does nothing.
    pub fn initialize(&mut self) -> Result<(), ArenaExhausted> {
        if self.is_initialized {
            warn!("heap already initialized, ignoring");
            return Ok(());
        }

        let base = self.provider.grow(INIT_BYTES)?;
        debug_assert!(block::is_aligned(base, ALIGN), "arena top {:#x} is misaligned", base);

        let sentinel = base + 2 * TAG_SIZE;
        self.free_list = FreeList::new(sentinel);

        let list = self.free_list;
        let mem = self.provider.memory_mut();
        block::store_tag(mem, base, Tag::from_bits(0));
        write_boundary(mem, sentinel, PROLOGUE_SIZE, true);
        list.init(mem);
        block::store_tag(mem, header_of(next_block(sentinel, PROLOGUE_SIZE)), Tag::EPILOGUE);

        self.is_initialized = true;

        #[cfg(feature = "counters")]
        self.counters.account_grow(INIT_BYTES);

        debug!("heap initialized, sentinel at {:#x}", sentinel);
        self.scan_for_errors();
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    /// Allocate at least `size` bytes, 8-byte aligned.
    ///
    /// Returns `None` if `size` is zero or the arena can't grow.
    pub fn allocate(&mut self, size: usize) -> Option<Addr> {
        debug_assert!(self.is_initialized, "allocate called before initialize");

        if size == 0 {
            return None;
        }

        let Some(asize) = adjust_size(size) else {
            debug!("request of {} bytes exceeds the largest block", size);
            return None;
        };

        let bp = match self.find_fit(asize) {
            Some(bp) => {
                self.place(bp, asize);
                bp
            }
            None => self.extend(asize)?,
        };

        #[cfg(feature = "counters")]
        self.counters.account_alloc(block::header(self.provider.memory(), bp).size());

        trace!("allocate({}) -> {:#x}", size, bp);
        self.scan_for_errors();
        Addr::new(bp)
    }

    /// First free block, in free-list order, with a payload of at least `asize`.
    fn find_fit(&self, asize: usize) -> Option<usize> {
        let mem = self.provider.memory();
        if self.free_list.is_empty(mem) {
            return None;
        }
        self.free_list.iter(mem).find(|&bp| block::header(mem, bp).size() >= asize)
    }

    /// Grow the arena by one allocated block of `asize`, moving the epilogue up.
    ///
    /// The arena never grows past [`Tag::MAX_SIZE`], so no block, however many
    /// neighbours it later absorbs, outgrows its tags.
    fn extend(&mut self, asize: usize) -> Option<usize> {
        let bytes = asize.checked_add(OVERHEAD)?;
        let top = self.provider.current_bounds().acme;
        if top.checked_add(bytes).map_or(true, |new_top| new_top > Tag::MAX_SIZE) {
            debug!("growing by {} bytes would take the arena past {:#x}", bytes, Tag::MAX_SIZE);
            return None;
        }

        let bp = match self.provider.grow(bytes) {
            Ok(old_top) => old_top,
            Err(ArenaExhausted) => {
                debug!("arena exhausted growing by {} bytes", bytes);
                return None;
            }
        };

        let mem = self.provider.memory_mut();
        // the old epilogue becomes this block's header
        debug_assert_eq!(block::header(mem, bp), Tag::EPILOGUE);
        write_boundary(mem, bp, asize, true);
        block::store_tag(mem, header_of(next_block(bp, asize)), Tag::EPILOGUE);

        #[cfg(feature = "counters")]
        self.counters.account_grow(bytes);

        debug!("arena grown by {} bytes to {}", bytes, self.provider.current_bounds());
        Some(bp)
    }

    /// Allocate `asize` bytes from the free block at `bp`, splitting off the
    /// remainder if it can stand as a block of its own.
    fn place(&mut self, bp: usize, asize: usize) {
        let bsize = block::header(self.provider.memory(), bp).size();
        debug_assert!(bsize >= asize);

        self.remove_free(bp);

        if bsize - asize >= MIN_BLOCK_SIZE {
            let rest = next_block(bp, asize);
            let rest_size = bsize - asize - OVERHEAD;

            let mem = self.provider.memory_mut();
            write_boundary(mem, bp, asize, true);
            write_boundary(mem, rest, rest_size, false);
            self.insert_free(rest);

            debug!("split {:#x}: {} allocated, {} free at {:#x}", bp, asize, rest_size, rest);
        } else {
            write_boundary(self.provider.memory_mut(), bp, bsize, true);
        }
    }

    /// Release the block at `ptr`. `None` and already-free blocks are ignored.
    pub fn deallocate(&mut self, ptr: Option<Addr>) {
        if let Some(ptr) = ptr {
            let _ = self.try_deallocate(ptr);
        }
    }

    /// Release the block at `ptr`, reporting a block that is already free.
    ///
    /// The heap is left untouched in the error case.
    pub fn try_deallocate(&mut self, ptr: Addr) -> Result<(), RedundantFree> {
        debug_assert!(self.is_initialized, "deallocate called before initialize");

        let bp = ptr.offset();
        let (size, allocated) = block::header(self.provider.memory(), bp).decode();

        if !allocated {
            warn!("redundant free of {:#x}", bp);

            #[cfg(feature = "counters")]
            self.counters.account_redundant_free();

            return Err(RedundantFree);
        }

        write_boundary(self.provider.memory_mut(), bp, size, false);

        #[cfg(feature = "counters")]
        self.counters.account_dealloc(size);

        let merged = self.coalesce(bp);

        trace!("deallocate({:#x}) -> free block at {:#x}", bp, merged);
        self.scan_for_errors();
        Ok(())
    }

    /// Merge the newly freed block at `bp` with its free neighbours and list the result.
    ///
    /// Returns the payload offset of the merged block.
    fn coalesce(&mut self, bp: usize) -> usize {
        let mem = self.provider.memory();
        let size = block::header(mem, bp).size();
        let (prev_size, prev_allocated) = block::load_tag(mem, prev_footer_of(bp)).decode();
        let next_bp = next_block(bp, size);
        let (next_size, next_allocated) = block::header(mem, next_bp).decode();
        let prev_bp = prev_block(bp, prev_size);

        match (prev_allocated, next_allocated) {
            (true, true) => {
                self.insert_free(bp);
                bp
            }
            (true, false) => {
                self.remove_free(next_bp);
                let merged = size + next_size + OVERHEAD;
                write_boundary(self.provider.memory_mut(), bp, merged, false);
                self.insert_free(bp);

                debug!("merged {:#x} with next {:#x} into {} bytes", bp, next_bp, merged);
                bp
            }
            (false, true) => {
                // the previous block keeps its place in the list
                let merged = prev_size + size + OVERHEAD;
                write_boundary(self.provider.memory_mut(), prev_bp, merged, false);

                #[cfg(feature = "counters")]
                self.counters.account_resize_free(prev_size, merged);

                debug!("merged {:#x} into previous {:#x}, {} bytes", bp, prev_bp, merged);
                prev_bp
            }
            (false, false) => {
                self.remove_free(next_bp);
                self.remove_free(prev_bp);
                let merged = prev_size + size + next_size + 2 * OVERHEAD;
                write_boundary(self.provider.memory_mut(), prev_bp, merged, false);
                self.insert_free(prev_bp);

                debug!("merged {:#x} with both neighbours into {:#x}, {} bytes", bp, prev_bp, merged);
                prev_bp
            }
        }
    }

    /// Resize the block at `ptr` by moving its contents into a fresh block.
    ///
    /// - `size == 0` frees `ptr` and returns `None`.
    /// - `ptr == None` is [`allocate`](Heap::allocate).
    /// - On allocation failure `ptr` is left intact and `None` is returned.
    pub fn reallocate(&mut self, ptr: Option<Addr>, size: usize) -> Option<Addr> {
        let Some(old) = ptr else {
            return self.allocate(size);
        };

        if size == 0 {
            self.deallocate(Some(old));
            return None;
        }

        let new = self.allocate(size)?;

        let old_size = self.payload_size(old);
        let copied = size.min(old_size);
        self.provider
            .memory_mut()
            .copy_within(old.offset()..old.offset() + copied, new.offset());

        self.deallocate(Some(old));

        trace!("reallocate({}, {}) -> {}", old, size, new);
        Some(new)
    }

    /// Allocate `count * size` bytes with the whole payload zeroed.
    ///
    /// Returns `None` if either argument is zero or the product overflows.
    /// An overflowing product is refused outright rather than wrapped into a
    /// smaller request, which a plain `allocate(count * size)` would do.
    pub fn zero_allocate(&mut self, count: usize, size: usize) -> Option<Addr> {
        let bytes = count.checked_mul(size)?;
        let ptr = self.allocate(bytes)?;
        self.payload_mut(ptr).fill(0);
        Some(ptr)
    }

    /// The payload of the allocated block at `ptr`, as declared in its boundary tag.
    ///
    /// This may be longer than the size originally requested.
    pub fn payload(&self, ptr: Addr) -> &[u8] {
        let mem = self.provider.memory();
        let size = block::header(mem, ptr.offset()).size();
        &mem[ptr.offset()..ptr.offset() + size]
    }

    pub fn payload_mut(&mut self, ptr: Addr) -> &mut [u8] {
        let mem = self.provider.memory_mut();
        let size = block::header(mem, ptr.offset()).size();
        &mut mem[ptr.offset()..ptr.offset() + size]
    }

    pub fn payload_size(&self, ptr: Addr) -> usize {
        block::header(self.provider.memory(), ptr.offset()).size()
    }

    /// The arena's current extent.
    pub fn bounds(&self) -> Span {
        self.provider.current_bounds()
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn into_provider(self) -> P {
        self.provider
    }

    /// Payload offset of the prologue block anchoring the free list.
    pub fn sentinel(&self) -> usize {
        self.free_list.sentinel()
    }

    /// Free blocks and their payload sizes, most recently freed first.
    pub fn free_blocks(&self) -> impl Iterator<Item = (Addr, usize)> + '_ {
        let mem = self.provider.memory();
        self.free_list
            .iter(mem)
            .filter_map(move |bp| Some((Addr::new(bp)?, block::header(mem, bp).size())))
    }

    /// Every block between the prologue and the epilogue, in address order.
    ///
    /// Stops early at a block whose tags would reach past the arena.
    pub fn blocks(&self) -> Blocks<'_> {
        let cursor = if self.is_initialized {
            next_block(self.sentinel(), PROLOGUE_SIZE)
        } else {
            // nothing to walk
            usize::MAX
        };

        Blocks { mem: self.provider.memory(), cursor }
    }

    /// Allocation statistics.
    #[cfg(feature = "counters")]
    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub(crate) fn memory(&self) -> &[u8] {
        self.provider.memory()
    }

    #[cfg(test)]
    pub(crate) fn memory_mut(&mut self) -> &mut [u8] {
        self.provider.memory_mut()
    }

    fn insert_free(&mut self, bp: usize) {
        let list = self.free_list;
        list.insert_at_head(self.provider.memory_mut(), bp);

        #[cfg(feature = "counters")]
        self.counters.account_register_free(block::header(self.provider.memory(), bp).size());
    }

    fn remove_free(&mut self, bp: usize) {
        #[cfg(feature = "counters")]
        self.counters.account_deregister_free(block::header(self.provider.memory(), bp).size());

        let list = self.free_list;
        list.remove(self.provider.memory_mut(), bp);
    }

    #[cfg(not(debug_assertions))]
    fn scan_for_errors(&self) {}

    /// Debugging check run after every mutation in debug builds.
    #[cfg(debug_assertions)]
    fn scan_for_errors(&self) {
        if let Err(err) = self.validate() {
            panic!("heap corrupted: {}", err);
        }
    }
}

/// Iterator over a heap's blocks in address order, created by [`Heap::blocks`].
#[derive(Debug, Clone)]
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Blocks<'a> {
    mem: &'a [u8],
    cursor: usize,
}

impl Iterator for Blocks<'_> {
    type Item = (Addr, Block);

    fn next(&mut self) -> Option<Self::Item> {
        let bp = self.cursor;
        if bp > self.mem.len() {
            return None;
        }

        let size = block::header(self.mem, bp).size();
        if size == 0 || bp + size + TAG_SIZE > self.mem.len() {
            self.cursor = usize::MAX;
            return None;
        }

        self.cursor = next_block(bp, size);
        Some((Addr::new(bp)?, Block::read(self.mem, bp)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Brk, SliceArena};

    fn heap() -> Heap<Brk> {
        let mut heap = Heap::new(Brk::new());
        heap.initialize().unwrap();
        heap
    }

    fn free_sizes<P: ArenaProvider>(heap: &Heap<P>) -> std::vec::Vec<usize> {
        heap.free_blocks().map(|(_, size)| size).collect()
    }

    /// Counts calls to `grow`.
    struct Counting<P> {
        inner: P,
        grows: usize,
    }

    impl<P: ArenaProvider> ArenaProvider for Counting<P> {
        fn grow(&mut self, bytes: usize) -> Result<usize, ArenaExhausted> {
            self.grows += 1;
            self.inner.grow(bytes)
        }
        fn current_bounds(&self) -> Span {
            self.inner.current_bounds()
        }
        fn memory(&self) -> &[u8] {
            self.inner.memory()
        }
        fn memory_mut(&mut self) -> &mut [u8] {
            self.inner.memory_mut()
        }
    }

    #[test]
    fn initialize_lays_out_sentinels() {
        let heap = heap();

        assert_eq!(heap.bounds(), Span::new(0, INIT_BYTES));
        assert_eq!(heap.sentinel(), 8);
        assert_eq!(Block::read(heap.memory(), 8), Block::Allocated { size: PROLOGUE_SIZE });
        assert_eq!(block::load_tag(heap.memory(), 24), Tag::encode(PROLOGUE_SIZE, true));
        assert_eq!(block::load_tag(heap.memory(), 28), Tag::EPILOGUE);
        assert_eq!(heap.free_blocks().count(), 0);
        assert_eq!(heap.blocks().count(), 0);
    }

    #[test]
    fn initialize_fails_without_memory() {
        let mut buf = [0u8; INIT_BYTES - 8];
        let mut heap = Heap::new(SliceArena::new(&mut buf));
        assert_eq!(heap.initialize(), Err(ArenaExhausted));
        assert!(!heap.is_initialized());
    }

    #[test]
    fn initialize_twice_is_a_no_op() {
        let mut heap = heap();
        let ptr = heap.allocate(24).unwrap();

        heap.initialize().unwrap();
        assert_eq!(heap.bounds(), Span::new(0, INIT_BYTES + 24 + OVERHEAD));
        assert_eq!(heap.payload_size(ptr), 24);
    }

    #[test]
    fn zero_sized_requests() {
        let mut heap = heap();
        assert_eq!(heap.allocate(0), None);
        assert_eq!(heap.zero_allocate(0, 8), None);
        assert_eq!(heap.zero_allocate(8, 0), None);
        assert_eq!(heap.bounds().size(), INIT_BYTES);

        heap.deallocate(None);
        assert_eq!(heap.bounds().size(), INIT_BYTES);
    }

    #[test]
    fn allocations_are_aligned_and_sized() {
        let mut heap = heap();

        for size in 1..100 {
            let ptr = heap.allocate(size).unwrap();
            assert_eq!(ptr.offset() % ALIGN, 0);
            assert_eq!(heap.payload_size(ptr), adjust_size(size).unwrap());
            assert!(heap.payload(ptr).len() >= size);
        }
    }

    #[test]
    fn extend_places_block_at_old_top() {
        let mut heap = heap();

        let a = heap.allocate(1).unwrap();
        assert_eq!(a.offset(), INIT_BYTES);
        assert_eq!(heap.payload_size(a), 16);
        assert_eq!(heap.bounds().acme, INIT_BYTES + 16 + OVERHEAD);

        let b = heap.allocate(40).unwrap();
        assert_eq!(b.offset(), next_block(a.offset(), 16));
        assert_eq!(block::load_tag(heap.memory(), heap.bounds().acme - TAG_SIZE), Tag::EPILOGUE);
    }

    #[test]
    fn both_neighbours_allocated() {
        let mut heap = heap();
        let a = heap.allocate(16);
        let b = heap.allocate(16);
        let c = heap.allocate(16);

        heap.deallocate(b);
        assert_eq!(free_sizes(&heap), [16]);

        heap.deallocate(a);
        heap.deallocate(c);
        assert_eq!(free_sizes(&heap), [16 * 3 + 2 * OVERHEAD]);
    }

    #[test]
    fn coalesce_with_next() {
        let mut heap = heap();
        let a = heap.allocate(16);
        let b = heap.allocate(16);
        let _guard = heap.allocate(16);

        heap.deallocate(b);
        heap.deallocate(a);

        let free: std::vec::Vec<_> = heap.free_blocks().collect();
        assert_eq!(free, [(a.unwrap(), 16 + 16 + OVERHEAD)]);
    }

    #[test]
    fn coalesce_with_previous_keeps_list_position() {
        let mut heap = heap();
        let a = heap.allocate(16);
        let _g1 = heap.allocate(16);
        let b = heap.allocate(32);
        let c = heap.allocate(16);
        let _g2 = heap.allocate(16);

        heap.deallocate(b);
        heap.deallocate(a);
        assert_eq!(free_sizes(&heap), [16, 32]);

        // b sits behind a in the list and absorbs c without moving
        heap.deallocate(c);
        let free: std::vec::Vec<_> = heap.free_blocks().collect();
        assert_eq!(free, [(a.unwrap(), 16), (b.unwrap(), 32 + 16 + OVERHEAD)]);
    }

    #[test]
    fn coalesce_with_both() {
        let mut heap = heap();
        let a = heap.allocate(16);
        let b = heap.allocate(24);
        let c = heap.allocate(32);
        let _guard = heap.allocate(16);

        heap.deallocate(a);
        heap.deallocate(c);
        heap.deallocate(b);

        let free: std::vec::Vec<_> = heap.free_blocks().collect();
        assert_eq!(free, [(a.unwrap(), 16 + 24 + 32 + 2 * OVERHEAD)]);
    }

    #[test]
    fn coalesced_pair_is_reused_without_growth() {
        let mut heap = Heap::new(Counting { inner: Brk::new(), grows: 0 });
        heap.initialize().unwrap();

        let a = heap.allocate(16);
        let b = heap.allocate(16);
        let _guard = heap.allocate(16);
        heap.deallocate(a);
        heap.deallocate(b);

        let grows = heap.provider().grows;
        let c = heap.allocate(40).unwrap();
        assert_eq!(heap.provider().grows, grows);
        assert_eq!(Some(c), a);
        assert_eq!(heap.free_blocks().count(), 0);
    }

    #[test]
    fn split_leaves_residue() {
        let mut heap = heap();
        let a = heap.allocate(64);
        let _guard = heap.allocate(16);
        heap.deallocate(a);

        let b = heap.allocate(16);
        assert_eq!(b, a);
        assert_eq!(free_sizes(&heap), [64 - 16 - OVERHEAD]);
    }

    #[test]
    fn small_residue_is_not_split() {
        let mut heap = heap();
        let a = heap.allocate(32);
        let _guard = heap.allocate(16);
        heap.deallocate(a);

        // 32 - 16 = 16 < MIN_BLOCK_SIZE
        let b = heap.allocate(16).unwrap();
        assert_eq!(Some(b), a);
        assert_eq!(heap.payload_size(b), 32);
        assert_eq!(heap.free_blocks().count(), 0);

        let c = heap.allocate(40);
        heap.deallocate(c);
        // 40 - 16 = 24 == MIN_BLOCK_SIZE
        let d = heap.allocate(16).unwrap();
        assert_eq!(Some(d), c);
        assert_eq!(free_sizes(&heap), [40 - 16 - OVERHEAD]);
    }

    #[test]
    fn first_fit_in_recency_order() {
        let mut heap = heap();
        let big = heap.allocate(64);
        let _g1 = heap.allocate(16);
        let small = heap.allocate(24);
        let _g2 = heap.allocate(16);

        heap.deallocate(big);
        heap.deallocate(small);

        // small was freed last and fits, so it wins despite big being first in memory
        assert_eq!(heap.allocate(24), small);
        assert_eq!(heap.allocate(24), big);
    }

    #[test]
    fn growth_once_per_unmet_request() {
        let mut heap = Heap::new(Counting { inner: Brk::new(), grows: 0 });
        heap.initialize().unwrap();
        assert_eq!(heap.provider().grows, 1);

        for i in 1..=50 {
            heap.allocate(i * 8).unwrap();
            assert_eq!(heap.provider().grows, 1 + i);
        }
    }

    #[test]
    fn exhaustion_is_clean() {
        let mut buf = [0u8; 128];
        let mut heap = Heap::new(SliceArena::new(&mut buf));
        heap.initialize().unwrap();

        let a = heap.allocate(40).unwrap();
        heap.payload_mut(a).fill(0x5a);
        let bounds = heap.bounds();

        assert_eq!(heap.allocate(64), None);
        assert_eq!(heap.bounds(), bounds);
        assert_eq!(heap.reallocate(Some(a), 64), None);
        assert!(heap.payload(a).iter().all(|&b| b == 0x5a));
        assert_eq!(heap.zero_allocate(8, 8), None);

        heap.validate().unwrap();
    }

    #[test]
    fn oversized_request_is_refused() {
        let mut heap = heap();
        assert_eq!(heap.allocate(usize::MAX), None);
        assert_eq!(heap.allocate(Tag::MAX_SIZE + 1), None);
        assert_eq!(heap.zero_allocate(usize::MAX, 2), None);
        assert_eq!(heap.bounds().size(), INIT_BYTES);
    }

    #[test]
    fn arena_capped_at_tag_reach() {
        let mut heap = Heap::new(Counting { inner: Brk::with_limit(usize::MAX), grows: 0 });
        heap.initialize().unwrap();

        // fits a tag on its own, but not on top of the existing arena
        assert_eq!(heap.allocate(Tag::MAX_SIZE), None);
        assert_eq!(heap.allocate(Tag::MAX_SIZE - INIT_BYTES), None);
        assert_eq!(heap.provider().grows, 1);
        assert_eq!(heap.bounds().size(), INIT_BYTES);
        heap.validate().unwrap();
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn merged_blocks_stay_within_tag_reach() {
        // untouched pages of a zeroed allocation are not committed
        let mut buf = std::vec![0u8; 5 << 30];
        let mut heap = Heap::new(SliceArena::new(&mut buf));
        heap.initialize().unwrap();

        let half = 0x8000_0000;
        let a = heap.allocate(half).unwrap();
        assert_eq!(heap.allocate(half), None);
        let guard = heap.allocate(16).unwrap();
        assert!(heap.bounds().acme <= Tag::MAX_SIZE);

        heap.deallocate(Some(a));
        heap.deallocate(Some(guard));
        assert_eq!(free_sizes(&heap), [heap.bounds().size() - INIT_BYTES - OVERHEAD]);

        let report = heap.validate().unwrap();
        assert_eq!(report.free_blocks, 1);
        assert_eq!(report.free_bytes, half + 16 + OVERHEAD);
    }

    #[test]
    fn redundant_free_is_absorbed() {
        let mut heap = heap();
        let a = heap.allocate(16);
        let _guard = heap.allocate(16);

        assert_eq!(heap.try_deallocate(a.unwrap()), Ok(()));
        assert_eq!(heap.try_deallocate(a.unwrap()), Err(RedundantFree));
        heap.deallocate(a);
        assert_eq!(free_sizes(&heap), [16]);
    }

    #[test]
    fn reallocate_moves_contents() {
        let mut heap = heap();
        let a = heap.allocate(24).unwrap();
        for (i, byte) in heap.payload_mut(a).iter_mut().enumerate() {
            *byte = i as u8;
        }

        let b = heap.reallocate(Some(a), 100).unwrap();
        assert_ne!(a, b);
        assert!(heap.payload(b)[..24].iter().enumerate().all(|(i, &byte)| byte == i as u8));
        assert_eq!(free_sizes(&heap), [24]);

        // shrinking still moves
        let c = heap.reallocate(Some(b), 8).unwrap();
        assert_ne!(b, c);
        assert!(heap.payload(c)[..8].iter().enumerate().all(|(i, &byte)| byte == i as u8));
    }

    #[test]
    fn reallocate_edge_cases() {
        let mut heap = heap();

        let a = heap.reallocate(None, 32);
        assert!(a.is_some());
        assert_eq!(heap.payload_size(a.unwrap()), 32);

        let _guard = heap.allocate(16);
        assert_eq!(heap.reallocate(a, 0), None);
        assert_eq!(free_sizes(&heap), [32]);

        assert_eq!(heap.reallocate(None, 0), None);
    }

    #[test]
    fn zero_allocate_clears_reused_memory() {
        let mut heap = heap();
        let a = heap.allocate(48).unwrap();
        heap.payload_mut(a).fill(0xff);
        let _guard = heap.allocate(16);
        heap.deallocate(Some(a));

        let b = heap.zero_allocate(6, 8).unwrap();
        assert_eq!(b, a);
        assert_eq!(heap.payload(b).len(), 48);
        assert!(heap.payload(b).iter().all(|&byte| byte == 0));
    }

    #[test]
    fn blocks_walk_in_address_order() {
        let mut heap = heap();
        let a = heap.allocate(16).unwrap();
        let b = heap.allocate(32).unwrap();
        let c = heap.allocate(48).unwrap();
        heap.deallocate(Some(b));

        let blocks: std::vec::Vec<_> = heap.blocks().collect();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0], (a, Block::Allocated { size: 16 }));
        assert!(matches!(blocks[1], (addr, Block::Free { size: 32, .. }) if addr == b));
        assert_eq!(blocks[2], (c, Block::Allocated { size: 48 }));
    }

    #[test]
    fn independent_heaps() {
        let mut one = heap();
        let mut two = heap();

        let a = one.allocate(16).unwrap();
        let b = two.allocate(16).unwrap();
        assert_eq!(a, b);

        one.deallocate(Some(a));
        assert_eq!(one.free_blocks().count(), 1);
        assert_eq!(two.free_blocks().count(), 0);
    }
}
