//! Block layout and address arithmetic.
//!
//! All addresses are byte offsets from the arena base.
//!
//! Allocated block:
//!   ?? | HEADER: Tag | PAYLOAD (size bytes)              | FOOTER: Tag | ??
//! Free block:
//!   ?? | HEADER: Tag | PREV: u64, NEXT: u64, ..???..     | FOOTER: Tag | ??
//!
//! A block is identified by its payload offset. The footer of every block,
//! allocated or not, lets the following block find it in constant time.

use core::num::NonZeroUsize;

use crate::tag::Tag;

pub const ALIGN: usize = 8;
pub const TAG_SIZE: usize = core::mem::size_of::<Tag>();
pub const LINK_SIZE: usize = core::mem::size_of::<u64>();

/// Header and footer of one block.
pub const OVERHEAD: usize = 2 * TAG_SIZE;
/// Smallest payload: room for the prev/next links once the block is freed.
pub const MIN_PAYLOAD: usize = 2 * LINK_SIZE;
/// Smallest block including its boundary tags. Residues below this are not split off.
pub const MIN_BLOCK_SIZE: usize = MIN_PAYLOAD + OVERHEAD;

/// Payload offset of a block handed out by a [`Heap`](crate::Heap).
///
/// Always non-zero and a multiple of 8, so `Option<Addr>` doubles as a nullable pointer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Addr(NonZeroUsize);

impl Addr {
    /// Wrap an arena offset. Returns `None` for zero.
    ///
    /// No provenance checking happens: handing the heap an `Addr` it did
    /// not give out corrupts that heap (it cannot corrupt anything else).
    #[inline]
    pub const fn new(offset: usize) -> Option<Self> {
        match NonZeroUsize::new(offset) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    #[inline]
    pub const fn offset(self) -> usize {
        self.0.get()
    }
}

impl core::fmt::Debug for Addr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Addr({:#x})", self.offset())
    }
}

impl core::fmt::Display for Addr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#x}", self.offset())
    }
}

/// Rounds `offset` up to the next multiple of `align`, which must be a power of two.
#[inline]
pub const fn align_up(offset: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (offset + (align - 1)) & !(align - 1)
}

#[inline]
pub const fn is_aligned(offset: usize, align: usize) -> bool {
    offset & (align - 1) == 0
}

/// The payload size that serves a request of `size` bytes.
///
/// Rounds up to [`ALIGN`] and raises anything below [`MIN_PAYLOAD`].
/// Returns `None` if the result can't be described by a [`Tag`].
#[inline]
pub const fn adjust_size(size: usize) -> Option<usize> {
    if size > Tag::MAX_SIZE {
        return None;
    }

    let asize = align_up(size, ALIGN);
    if asize < MIN_PAYLOAD {
        Some(MIN_PAYLOAD)
    } else {
        Some(asize)
    }
}

#[inline]
pub const fn header_of(payload: usize) -> usize {
    payload - TAG_SIZE
}

#[inline]
pub const fn footer_of(payload: usize, size: usize) -> usize {
    payload + size
}

/// Payload of the block following the one at `payload` with declared `size`.
#[inline]
pub const fn next_block(payload: usize, size: usize) -> usize {
    payload + size + OVERHEAD
}

/// The footer word of the block preceding `payload`.
#[inline]
pub const fn prev_footer_of(payload: usize) -> usize {
    payload - OVERHEAD
}

/// Payload of the block preceding `payload`, given the size read from its footer.
#[inline]
pub const fn prev_block(payload: usize, prev_size: usize) -> usize {
    payload - OVERHEAD - prev_size
}

#[inline]
pub(crate) fn load_tag(mem: &[u8], offset: usize) -> Tag {
    let mut word = [0; TAG_SIZE];
    word.copy_from_slice(&mem[offset..offset + TAG_SIZE]);
    Tag(u32::from_ne_bytes(word))
}

#[inline]
pub(crate) fn store_tag(mem: &mut [u8], offset: usize, tag: Tag) {
    mem[offset..offset + TAG_SIZE].copy_from_slice(&tag.0.to_ne_bytes());
}

#[inline]
pub(crate) fn load_link(mem: &[u8], offset: usize) -> usize {
    let mut word = [0; LINK_SIZE];
    word.copy_from_slice(&mem[offset..offset + LINK_SIZE]);
    u64::from_ne_bytes(word) as usize
}

#[inline]
pub(crate) fn store_link(mem: &mut [u8], offset: usize, link: usize) {
    mem[offset..offset + LINK_SIZE].copy_from_slice(&(link as u64).to_ne_bytes());
}

/// Write identical header and footer tags for the block at `payload`.
#[inline]
pub(crate) fn write_boundary(mem: &mut [u8], payload: usize, size: usize, allocated: bool) {
    let tag = Tag::encode(size, allocated);
    store_tag(mem, header_of(payload), tag);
    store_tag(mem, footer_of(payload, size), tag);
}

/// The header tag of the block at `payload`.
#[inline]
pub(crate) fn header(mem: &[u8], payload: usize) -> Tag {
    load_tag(mem, header_of(payload))
}

/// A decoded view of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Block {
    Allocated { size: usize },
    Free { size: usize, prev: usize, next: usize },
}

impl Block {
    /// Decode the block at `payload`. Links are only read if the header says the block is free.
    pub fn read(mem: &[u8], payload: usize) -> Self {
        let (size, allocated) = header(mem, payload).decode();

        if allocated {
            Block::Allocated { size }
        } else {
            Block::Free {
                size,
                prev: load_link(mem, payload),
                next: load_link(mem, payload + LINK_SIZE),
            }
        }
    }

    pub fn size(self) -> usize {
        match self {
            Block::Allocated { size } | Block::Free { size, .. } => size,
        }
    }

    pub fn is_free(self) -> bool {
        matches!(self, Block::Free { .. })
    }
}
