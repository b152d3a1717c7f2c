use core::ops::Range;

/// A half-open range of arena offsets, `base..acme`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Span {
    pub base: usize,
    pub acme: usize,
}

impl From<Range<usize>> for Span {
    fn from(value: Range<usize>) -> Self {
        Self { base: value.start, acme: value.end }
    }
}

impl PartialEq for Span {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        (self.is_empty() && other.is_empty()) || (self.base == other.base && self.acme == other.acme)
    }
}
impl Eq for Span {}

impl Span {
    pub const fn empty() -> Self {
        Self { base: 0, acme: 0 }
    }

    pub const fn new(base: usize, acme: usize) -> Self {
        Self { base, acme }
    }

    pub const fn from_base_size(base: usize, size: usize) -> Self {
        Self { base, acme: base + size }
    }

    pub const fn to_range(&self) -> Range<usize> {
        Range { start: self.base, end: self.acme }
    }

    pub const fn size(&self) -> usize {
        if self.acme > self.base {
            self.acme - self.base
        } else {
            0
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.base >= self.acme
    }

    /// Returns whether `self` contains `offset`.
    pub const fn contains(&self, offset: usize) -> bool {
        self.base <= offset && offset < self.acme
    }

    /// Returns whether `self` contains `other`.
    ///
    /// Empty spans are contained by any span.
    pub const fn contains_span(&self, other: Span) -> bool {
        other.is_empty() || (self.base <= other.base && other.acme <= self.acme)
    }
}

impl core::fmt::Display for Span {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#x}..{:#x}", self.base, self.acme)
    }
}
