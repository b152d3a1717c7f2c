//! The free list.
//!
//! The linked list is:
//!  * **Intrusive**: the nodes are the free blocks' payloads themselves
//!  * **Circular** to minimize branches
//!  * Anchored at a **sentinel** node (the heap prologue) which isn't iterated over
//!  * **Doubly linked** to allow bidirectional traversal and single node removal
//!  * **LIFO**: insertion always happens right after the sentinel
//!
//! Nodes are arena offsets. Each node stores `prev` at `node + 0` and `next` at
//! `node + LINK_SIZE`. Membership is tracked by the caller through the
//! allocated bit; removing a node that isn't in the list garbles the list.

use crate::block::{self, LINK_SIZE};

#[inline]
fn prev_of(mem: &[u8], node: usize) -> usize {
    block::load_link(mem, node)
}
#[inline]
fn next_of(mem: &[u8], node: usize) -> usize {
    block::load_link(mem, node + LINK_SIZE)
}
#[inline]
fn set_prev(mem: &mut [u8], node: usize, prev: usize) {
    block::store_link(mem, node, prev)
}
#[inline]
fn set_next(mem: &mut [u8], node: usize, next: usize) {
    block::store_link(mem, node + LINK_SIZE, next)
}

/// Handle to a free list rooted at `sentinel`. Holds no memory itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeList {
    sentinel: usize,
}

impl FreeList {
    pub const fn new(sentinel: usize) -> Self {
        Self { sentinel }
    }

    pub const fn sentinel(&self) -> usize {
        self.sentinel
    }

    /// Make the sentinel an empty circular list: it links to itself both ways.
    pub fn init(&self, mem: &mut [u8]) {
        set_prev(mem, self.sentinel, self.sentinel);
        set_next(mem, self.sentinel, self.sentinel);
    }

    pub fn is_empty(&self, mem: &[u8]) -> bool {
        next_of(mem, self.sentinel) == self.sentinel
    }

    /// The most recently inserted node, if any.
    #[cfg(test)]
    pub fn head(&self, mem: &[u8]) -> Option<usize> {
        let next = next_of(mem, self.sentinel);
        (next != self.sentinel).then_some(next)
    }

    /// Splice `node` in between the sentinel and its current successor.
    pub fn insert_at_head(&self, mem: &mut [u8], node: usize) {
        debug_assert!(node != self.sentinel);
        debug_assert!(!block::header(mem, node).is_allocated());

        let first = next_of(mem, self.sentinel);

        set_prev(mem, node, self.sentinel);
        set_next(mem, node, first);
        // first can be the sentinel, so patch it before the sentinel's next
        set_prev(mem, first, node);
        set_next(mem, self.sentinel, node);
    }

    /// Unsplice `node` using its own prev/next links.
    ///
    /// The node's stale links are left in place.
    pub fn remove(&self, mem: &mut [u8], node: usize) {
        debug_assert!(node != self.sentinel);
        debug_assert!(!block::header(mem, node).is_allocated());

        let prev = prev_of(mem, node);
        let next = next_of(mem, node);
        set_next(mem, prev, next);
        set_prev(mem, next, prev);
    }

    /// Iterate the list, excluding the sentinel, from most to least recently inserted.
    ///
    /// The list must not be modified while iterating.
    pub fn iter<'a>(&self, mem: &'a [u8]) -> Iter<'a> {
        Iter::new(mem, self.sentinel)
    }
}

/// An iterator over a [`FreeList`], excluding the sentinel.
///
/// Created by [`FreeList::iter`].
#[derive(Debug, Clone)]
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Iter<'a> {
    mem: &'a [u8],
    forward: usize,
    backward: usize,
    ongoing: bool,
}

impl<'a> Iter<'a> {
    fn new(mem: &'a [u8], sentinel: usize) -> Self {
        let forward = next_of(mem, sentinel);
        Self { mem, forward, backward: prev_of(mem, sentinel), ongoing: forward != sentinel }
    }
}

impl Iterator for Iter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        if self.ongoing {
            let ret = self.forward;
            if self.forward == self.backward {
                self.ongoing = false;
            }
            self.forward = next_of(self.mem, self.forward);
            Some(ret)
        } else {
            None
        }
    }
}

impl DoubleEndedIterator for Iter<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.ongoing {
            let ret = self.backward;
            if self.forward == self.backward {
                self.ongoing = false;
            }
            self.backward = prev_of(self.mem, self.backward);
            Some(ret)
        } else {
            None
        }
    }
}
