//! Heap consistency checking.
//!
//! Read-only: a failed check reports what it found and repairs nothing.

use alloc::vec::Vec;

use log::{error, info};

use crate::arena::ArenaProvider;
use crate::block::{self, footer_of, header_of, next_block, ALIGN, MIN_PAYLOAD, TAG_SIZE};
use crate::heap::PROLOGUE_SIZE;
use crate::tag::Tag;
use crate::Heap;

/// Something about the heap's structure is wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    /// The heap has not been initialized.
    Uninitialized,
    /// The prologue block's tags were overwritten.
    BadPrologue { header: Tag, footer: Tag },
    /// A block's payload offset isn't a multiple of the alignment unit.
    Misaligned { block: usize },
    /// A block's tags reach past the top of the arena.
    OutOfBounds { block: usize, size: usize },
    /// A block's header and footer disagree.
    TagMismatch { block: usize, header: Tag, footer: Tag },
    /// A tag has a reserved bit set.
    ReservedBits { block: usize, tag: Tag },
    /// A non-sentinel block is smaller than the minimum payload.
    Undersized { block: usize, size: usize },
    /// Two free blocks are adjacent; they should have been coalesced.
    AdjacentFree { block: usize, next: usize },
    /// The block walk ended somewhere other than the top of the arena.
    BadEpilogue { offset: usize },
    /// The free list links to an offset that is not a block of the heap.
    BrokenLink { node: usize },
    /// A node's neighbour doesn't link back to it.
    AsymmetricLink { node: usize },
    /// A node of the free list is marked allocated.
    AllocatedInList { block: usize },
    /// A free block isn't in the free list, or is listed more than once.
    ListMismatch { free_blocks: usize, listed: usize },
}

impl core::fmt::Display for HeapError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match *self {
            HeapError::Uninitialized => write!(f, "heap is not initialized"),
            HeapError::BadPrologue { header, footer } => {
                write!(f, "prologue damaged: header {:?}, footer {:?}", header, footer)
            }
            HeapError::Misaligned { block } => write!(f, "block {:#x} is misaligned", block),
            HeapError::OutOfBounds { block, size } => {
                write!(f, "block {:#x} of size {} extends past the arena", block, size)
            }
            HeapError::TagMismatch { block, header, footer } => write!(
                f,
                "block {:#x}: header {:?} doesn't match footer {:?}",
                block, header, footer
            ),
            HeapError::ReservedBits { block, tag } => {
                write!(f, "block {:#x}: reserved bits set in {:?}", block, tag)
            }
            HeapError::Undersized { block, size } => {
                write!(f, "block {:#x} has a payload of only {} bytes", block, size)
            }
            HeapError::AdjacentFree { block, next } => {
                write!(f, "free blocks {:#x} and {:#x} are adjacent", block, next)
            }
            HeapError::BadEpilogue { offset } => {
                write!(f, "epilogue at {:#x} is not at the top of the arena", offset)
            }
            HeapError::BrokenLink { node } => write!(f, "free list links to non-block {:#x}", node),
            HeapError::AsymmetricLink { node } => {
                write!(f, "free list neighbours of {:#x} don't link back", node)
            }
            HeapError::AllocatedInList { block } => {
                write!(f, "allocated block {:#x} is in the free list", block)
            }
            HeapError::ListMismatch { free_blocks, listed } => {
                write!(f, "{} free blocks but {} free list entries", free_blocks, listed)
            }
        }
    }
}

/// Summary of a successful [`Heap::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapReport {
    pub allocated_blocks: usize,
    pub allocated_bytes: usize,
    pub free_blocks: usize,
    pub free_bytes: usize,
    pub arena_bytes: usize,
}

impl<P: ArenaProvider> Heap<P> {
    /// Walk every block and the whole free list, checking boundary-tag and list consistency.
    pub fn validate(&self) -> Result<HeapReport, HeapError> {
        if !self.is_initialized() {
            return Err(HeapError::Uninitialized);
        }

        let mem = self.memory();
        let sentinel = self.sentinel();

        let header = block::load_tag(mem, header_of(sentinel));
        let footer = block::load_tag(mem, footer_of(sentinel, PROLOGUE_SIZE));
        let prologue = Tag::encode(PROLOGUE_SIZE, true);
        if header != prologue || footer != prologue {
            return Err(HeapError::BadPrologue { header, footer });
        }

        let mut report = HeapReport { arena_bytes: mem.len(), ..HeapReport::default() };
        // in address order, so sorted
        let mut free_blocks = Vec::new();
        let mut prev_free = None;
        let mut bp = next_block(sentinel, PROLOGUE_SIZE);

        loop {
            if !block::is_aligned(bp, ALIGN) {
                return Err(HeapError::Misaligned { block: bp });
            }
            if bp > mem.len() {
                return Err(HeapError::OutOfBounds { block: bp, size: 0 });
            }

            let header = block::header(mem, bp);
            let (size, allocated) = header.decode();
            if header.has_reserved_bits() {
                return Err(HeapError::ReservedBits { block: bp, tag: header });
            }

            if size == 0 {
                if !allocated || bp != mem.len() {
                    return Err(HeapError::BadEpilogue { offset: header_of(bp) });
                }
                break;
            }

            if bp + size + TAG_SIZE > mem.len() {
                return Err(HeapError::OutOfBounds { block: bp, size });
            }
            let footer = block::load_tag(mem, footer_of(bp, size));
            if header != footer {
                return Err(HeapError::TagMismatch { block: bp, header, footer });
            }
            if size < MIN_PAYLOAD {
                return Err(HeapError::Undersized { block: bp, size });
            }

            if allocated {
                report.allocated_blocks += 1;
                report.allocated_bytes += size;
                prev_free = None;
            } else {
                if let Some(prev) = prev_free {
                    return Err(HeapError::AdjacentFree { block: prev, next: bp });
                }
                report.free_blocks += 1;
                report.free_bytes += size;
                free_blocks.push(bp);
                prev_free = Some(bp);
            }

            bp = next_block(bp, size);
        }

        self.validate_free_list(&free_blocks)?;
        Ok(report)
    }

    /// Every node must be one of `free_blocks` with neighbours that point back at it,
    /// and the list must hold exactly as many nodes as there are free blocks.
    fn validate_free_list(&self, free_blocks: &[usize]) -> Result<(), HeapError> {
        let mem = self.memory();
        let sentinel = self.sentinel();
        let first_block = next_block(sentinel, PROLOGUE_SIZE);
        let last_node = mem.len().saturating_sub(MIN_PAYLOAD + TAG_SIZE);
        let link = |node: usize, offset: usize| -> Result<usize, HeapError> {
            let target = block::load_link(mem, node + offset);
            let in_arena = target == sentinel || (first_block..=last_node).contains(&target);
            if in_arena && block::is_aligned(target, ALIGN) {
                Ok(target)
            } else {
                Err(HeapError::BrokenLink { node: target })
            }
        };

        let mut listed = 0;
        let mut node = sentinel;
        loop {
            let next = link(node, block::LINK_SIZE)?;
            if link(next, 0)? != node {
                return Err(HeapError::AsymmetricLink { node });
            }
            if next == sentinel {
                break;
            }

            if block::header(mem, next).is_allocated() {
                return Err(HeapError::AllocatedInList { block: next });
            }
            if free_blocks.binary_search(&next).is_err() {
                return Err(HeapError::BrokenLink { node: next });
            }

            listed += 1;
            // a cycle not passing through the sentinel, or duplicates
            if listed > free_blocks.len() {
                return Err(HeapError::ListMismatch { free_blocks: free_blocks.len(), listed });
            }
            node = next;
        }

        if listed != free_blocks.len() {
            return Err(HeapError::ListMismatch { free_blocks: free_blocks.len(), listed });
        }
        Ok(())
    }

    /// Log the outcome of [`validate`](Heap::validate).
    ///
    /// With `verbose`, every block and a summary are logged as well.
    pub fn check(&self, verbose: bool) {
        if verbose {
            for (addr, block) in self.blocks() {
                info!("{}: {:?}", addr, block);
            }
        }

        match self.validate() {
            Ok(report) if verbose => info!(
                "heap ok: {} allocated ({} bytes), {} free ({} bytes), arena {} bytes",
                report.allocated_blocks,
                report.allocated_bytes,
                report.free_blocks,
                report.free_bytes,
                report.arena_bytes,
            ),
            Ok(_) => (),
            Err(err) => error!("heap check failed: {}", err),
        }
    }
}
