//! An explicit free-list heap allocator over a growable byte arena.
//!
//! Every block carries a boundary tag at each end (header and footer) holding its
//! payload size and an allocated bit. Free blocks also hold the two links of a
//! circular doubly-linked free list anchored at a prologue sentinel. Allocation
//! is first fit in most-recently-freed order, freeing coalesces immediately, and
//! the arena grows by one new block when no free block fits.
//!
//! Addresses are payload offsets into the arena ([`Addr`]); the bytes are reached
//! through [`Heap::payload`] and [`Heap::payload_mut`].
//!
//! ```
//! use tagheap::{Brk, Heap};
//!
//! let mut heap = Heap::new(Brk::new());
//! heap.initialize().unwrap();
//!
//! let a = heap.allocate(100).unwrap();
//! heap.payload_mut(a)[..5].copy_from_slice(b"hello");
//!
//! let b = heap.reallocate(Some(a), 200).unwrap();
//! assert_eq!(&heap.payload(b)[..5], b"hello");
//!
//! heap.deallocate(Some(b));
//! assert_eq!(heap.validate().unwrap().allocated_blocks, 0);
//! ```
//!
//! Cargo features:
//! - `lock_api` (default): [`LockedHeap`], a [`Heap`] behind a `lock_api::Mutex`.
//! - `counters`: allocation statistics through `Heap::counters`.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[cfg(feature = "lock_api")]
mod locked;
#[cfg(feature = "lock_api")]
mod locking;

#[cfg(feature = "counters")]
mod counters;

mod arena;
mod block;
mod check;
mod heap;
mod llist;
mod span;
mod tag;
pub mod trace;

pub use arena::{ArenaExhausted, ArenaProvider, Brk, SliceArena};
pub use block::{Addr, Block, ALIGN, MIN_BLOCK_SIZE, MIN_PAYLOAD, OVERHEAD};
pub use check::{HeapError, HeapReport};
pub use heap::{Blocks, Heap, RedundantFree};
pub use span::Span;
pub use tag::Tag;

#[cfg(feature = "counters")]
pub use counters::Counters;
#[cfg(feature = "lock_api")]
pub use locked::LockedHeap;
#[cfg(feature = "lock_api")]
pub use locking::AssumeUnlockable;
