//! A `Tag` is a block size with flags in the least significant bits.
//!
//! The same word is written as a block's header and its footer.

// bits 1 and 2 are reserved and always written as zero.

/// Boundary tag: a block's payload size packed with its allocated bit.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Tag(pub(crate) u32);

impl core::fmt::Debug for Tag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tag")
            .field("size", &self.size())
            .field("is_allocated", &self.is_allocated())
            .field("raw", &format_args!("{:#x}", self.0))
            .finish()
    }
}

impl Tag {
    pub const ALLOCATED_FLAG: u32 = 1 << 0;
    pub const RESERVED_BITS: u32 = 0b110;

    const SIZE_MASK: u32 = !0b111;

    /// The largest block size a tag can describe.
    pub const MAX_SIZE: usize = Self::SIZE_MASK as usize;

    /// The zero-size allocated marker terminating the block chain.
    pub const EPILOGUE: Tag = Tag(Self::ALLOCATED_FLAG);

    /// Pack `size` and the allocated bit into a tag.
    ///
    /// `size` must be a multiple of 8 no larger than [`Tag::MAX_SIZE`].
    #[inline]
    pub const fn encode(size: usize, allocated: bool) -> Self {
        debug_assert!(size & 0b111 == 0);
        debug_assert!(size <= Self::MAX_SIZE);

        Self(size as u32 | allocated as u32)
    }

    /// Unpack into `(size, allocated)`.
    #[inline]
    pub const fn decode(self) -> (usize, bool) {
        (self.size(), self.is_allocated())
    }

    #[inline]
    pub const fn size(self) -> usize {
        (self.0 & Self::SIZE_MASK) as usize
    }

    #[inline]
    pub const fn is_allocated(self) -> bool {
        self.0 & Self::ALLOCATED_FLAG != 0
    }

    /// Whether either reserved bit is set. Never true for a tag this crate wrote.
    #[inline]
    pub const fn has_reserved_bits(self) -> bool {
        self.0 & Self::RESERVED_BITS != 0
    }

    #[inline]
    pub const fn to_bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }
}
