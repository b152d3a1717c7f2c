//! Arena providers: the backing memory a [`Heap`](crate::Heap) grows into.

use alloc::vec::Vec;

use crate::Span;

/// The arena could not be grown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaExhausted;

impl core::fmt::Display for ArenaExhausted {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("arena exhausted")
    }
}

/// A contiguous region of memory that only grows at its top.
///
/// Offsets handed out are relative to the start of the region.
pub trait ArenaProvider {
    /// Extend the arena by `bytes`, returning the previous top offset,
    /// at which the newly usable memory begins.
    ///
    /// Growth is all-or-nothing: on failure the arena is unchanged.
    fn grow(&mut self, bytes: usize) -> Result<usize, ArenaExhausted>;

    /// The usable arena, from its base to the current top.
    fn current_bounds(&self) -> Span;

    /// The bytes of [`current_bounds`](ArenaProvider::current_bounds).
    fn memory(&self) -> &[u8];

    /// The bytes of [`current_bounds`](ArenaProvider::current_bounds), mutably.
    fn memory_mut(&mut self) -> &mut [u8];
}

impl<P: ArenaProvider + ?Sized> ArenaProvider for &mut P {
    fn grow(&mut self, bytes: usize) -> Result<usize, ArenaExhausted> {
        (**self).grow(bytes)
    }
    fn current_bounds(&self) -> Span {
        (**self).current_bounds()
    }
    fn memory(&self) -> &[u8] {
        (**self).memory()
    }
    fn memory_mut(&mut self) -> &mut [u8] {
        (**self).memory_mut()
    }
}

/// A `Vec`-backed arena with a hard size limit, in the spirit of `sbrk`.
#[derive(Debug, Clone)]
pub struct Brk {
    mem: Vec<u8>,
    limit: usize,
}

impl Brk {
    /// The default limit: 100 MiB.
    pub const DEFAULT_LIMIT: usize = 100 << 20;

    /// An empty arena that may grow up to [`Brk::DEFAULT_LIMIT`] bytes.
    pub const fn new() -> Self {
        Self::with_limit(Self::DEFAULT_LIMIT)
    }

    /// An empty arena that may grow up to `limit` bytes.
    pub const fn with_limit(limit: usize) -> Self {
        Self { mem: Vec::new(), limit }
    }

    pub const fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for Brk {
    fn default() -> Self {
        Self::new()
    }
}

impl ArenaProvider for Brk {
    fn grow(&mut self, bytes: usize) -> Result<usize, ArenaExhausted> {
        let old_top = self.mem.len();
        if bytes > self.limit - old_top {
            return Err(ArenaExhausted);
        }

        self.mem.try_reserve(bytes).map_err(|_| ArenaExhausted)?;
        self.mem.resize(old_top + bytes, 0);
        Ok(old_top)
    }

    fn current_bounds(&self) -> Span {
        Span::new(0, self.mem.len())
    }

    fn memory(&self) -> &[u8] {
        &self.mem
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.mem
    }
}

/// An arena carved out of a caller-supplied buffer.
///
/// The break starts at the bottom of the buffer and is exhausted once it reaches the end.
#[derive(Debug)]
pub struct SliceArena<'a> {
    buf: &'a mut [u8],
    brk: usize,
}

impl<'a> SliceArena<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, brk: 0 }
    }

    /// Bytes left before the buffer is exhausted.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.brk
    }
}

impl ArenaProvider for SliceArena<'_> {
    fn grow(&mut self, bytes: usize) -> Result<usize, ArenaExhausted> {
        if bytes > self.remaining() {
            return Err(ArenaExhausted);
        }

        let old_top = self.brk;
        self.brk += bytes;
        Ok(old_top)
    }

    fn current_bounds(&self) -> Span {
        Span::new(0, self.brk)
    }

    fn memory(&self) -> &[u8] {
        &self.buf[..self.brk]
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.buf[..self.brk]
    }
}
