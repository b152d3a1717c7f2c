//! Allocation traces: parsing and replaying request sequences against a [`Heap`].
//!
//! One request per line:
//! ```text
//! a <id> <bytes>    allocate
//! r <id> <bytes>    reallocate
//! f <id>            free
//! ```
//! Blank lines and lines starting with `#` are skipped. A trace may open with a
//! four-number header (suggested heap size, id count, op count, weight), one
//! number per line.

use alloc::vec::Vec;

use log::debug;

use crate::{Addr, ArenaProvider, Heap, HeapError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Alloc { id: usize, size: usize },
    Realloc { id: usize, size: usize },
    Free { id: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceHeader {
    pub suggested_heap_size: usize,
    pub id_count: usize,
    pub op_count: usize,
    pub weight: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Trace {
    pub header: Option<TraceHeader>,
    pub ops: Vec<Op>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    UnknownOp,
    MissingField,
    TrailingField,
    BadNumber,
    /// Header numbers after the first request, or not exactly four of them.
    BadHeader,
    OpCountMismatch { expected: usize, found: usize },
}

/// A trace line that couldn't be parsed. Lines are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseError {
    pub line: usize,
    pub kind: ParseErrorKind,
}

impl core::fmt::Display for ParseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "line {}: ", self.line)?;
        match self.kind {
            ParseErrorKind::UnknownOp => f.write_str("unknown request kind"),
            ParseErrorKind::MissingField => f.write_str("missing field"),
            ParseErrorKind::TrailingField => f.write_str("unexpected trailing field"),
            ParseErrorKind::BadNumber => f.write_str("invalid number"),
            ParseErrorKind::BadHeader => f.write_str("malformed header"),
            ParseErrorKind::OpCountMismatch { expected, found } => {
                write!(f, "header announces {} requests, found {}", expected, found)
            }
        }
    }
}

impl Trace {
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut header: Vec<usize> = Vec::new();
        let mut ops = Vec::new();
        let mut last_line = 0;

        for (index, line) in text.lines().enumerate() {
            let line_no = index + 1;
            let err = |kind| ParseError { line: line_no, kind };
            last_line = line_no;

            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split_whitespace();
            let Some(kind) = fields.next() else { continue };

            if kind.bytes().all(|b| b.is_ascii_digit()) {
                if !ops.is_empty() || header.len() == 4 {
                    return Err(err(ParseErrorKind::BadHeader));
                }
                header.push(kind.parse::<usize>().map_err(|_| err(ParseErrorKind::BadNumber))?);
                continue;
            }

            let mut number = || -> Result<usize, ParseError> {
                fields
                    .next()
                    .ok_or(err(ParseErrorKind::MissingField))?
                    .parse()
                    .map_err(|_| err(ParseErrorKind::BadNumber))
            };

            let op = match kind {
                "a" => Op::Alloc { id: number()?, size: number()? },
                "r" => Op::Realloc { id: number()?, size: number()? },
                "f" => Op::Free { id: number()? },
                _ => return Err(err(ParseErrorKind::UnknownOp)),
            };

            if fields.next().is_some() {
                return Err(err(ParseErrorKind::TrailingField));
            }
            ops.push(op);
        }

        let header = match header[..] {
            [] => None,
            [suggested_heap_size, id_count, op_count, weight] => {
                if op_count != ops.len() {
                    return Err(ParseError {
                        line: last_line,
                        kind: ParseErrorKind::OpCountMismatch { expected: op_count, found: ops.len() },
                    });
                }
                Some(TraceHeader { suggested_heap_size, id_count, op_count, weight })
            }
            _ => return Err(ParseError { line: last_line, kind: ParseErrorKind::BadHeader }),
        };

        Ok(Self { header, ops })
    }
}

/// Why a replay stopped. `op` is the index of the failing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceError {
    /// A free referenced an id with no live block.
    UnknownId { op: usize, id: usize },
    /// An allocation reused an id whose block is still live.
    IdInUse { op: usize, id: usize },
    /// The heap could not satisfy a non-zero request.
    Exhausted { op: usize, size: usize },
    /// A live block's contents changed behind its owner's back.
    Corrupted { op: usize, id: usize },
    /// Validation after a request failed.
    Heap { op: usize, err: HeapError },
}

impl core::fmt::Display for TraceError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match *self {
            TraceError::UnknownId { op, id } => write!(f, "request {}: id {} is not live", op, id),
            TraceError::IdInUse { op, id } => write!(f, "request {}: id {} is already live", op, id),
            TraceError::Exhausted { op, size } => {
                write!(f, "request {}: out of memory allocating {} bytes", op, size)
            }
            TraceError::Corrupted { op, id } => {
                write!(f, "request {}: contents of id {} were overwritten", op, id)
            }
            TraceError::Heap { op, err } => write!(f, "request {}: {}", op, err),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplayReport {
    pub ops: usize,
    /// Largest sum of live requested bytes at any point.
    pub peak_live_bytes: usize,
    pub arena_bytes: usize,
}

impl ReplayReport {
    /// Peak live bytes over final arena size.
    pub fn utilization(&self) -> f64 {
        if self.arena_bytes == 0 {
            0.0
        } else {
            self.peak_live_bytes as f64 / self.arena_bytes as f64
        }
    }
}

#[derive(Clone, Copy)]
struct Live {
    ptr: Option<Addr>,
    size: usize,
}

#[inline]
fn pattern(id: usize, index: usize) -> u8 {
    (id.wrapping_mul(0x9e) ^ index) as u8
}

fn fill<P: ArenaProvider>(heap: &mut Heap<P>, id: usize, live: Live, from: usize) {
    if let Some(ptr) = live.ptr {
        for (i, byte) in heap.payload_mut(ptr)[..live.size].iter_mut().enumerate().skip(from) {
            *byte = pattern(id, i);
        }
    }
}

fn intact<P: ArenaProvider>(heap: &Heap<P>, id: usize, live: Live) -> bool {
    live.ptr.map_or(true, |ptr| {
        heap.payload(ptr)[..live.size].iter().enumerate().all(|(i, &byte)| byte == pattern(id, i))
    })
}

/// Run `trace` against `heap`, checking that every live block keeps its contents.
///
/// With `check_each_op`, the heap is validated after every request.
pub fn replay<P: ArenaProvider>(
    heap: &mut Heap<P>,
    trace: &Trace,
    check_each_op: bool,
) -> Result<ReplayReport, TraceError> {
    let mut slots: Vec<Option<Live>> = Vec::new();
    let mut live_bytes = 0;
    let mut report = ReplayReport::default();

    for (op, &request) in trace.ops.iter().enumerate() {
        match request {
            Op::Alloc { id, size } => {
                if slots.len() <= id {
                    slots.resize(id + 1, None);
                }
                if slots[id].is_some() {
                    return Err(TraceError::IdInUse { op, id });
                }

                let ptr = heap.allocate(size);
                if ptr.is_none() && size != 0 {
                    return Err(TraceError::Exhausted { op, size });
                }

                let live = Live { ptr, size };
                fill(heap, id, live, 0);
                slots[id] = Some(live);
                live_bytes += size;
            }
            Op::Realloc { id, size } => {
                if slots.len() <= id {
                    slots.resize(id + 1, None);
                }

                let old = slots[id].unwrap_or(Live { ptr: None, size: 0 });
                if !intact(heap, id, old) {
                    return Err(TraceError::Corrupted { op, id });
                }

                let ptr = heap.reallocate(old.ptr, size);
                if ptr.is_none() && size != 0 {
                    return Err(TraceError::Exhausted { op, size });
                }

                let kept = Live { ptr, size: size.min(old.size) };
                if !intact(heap, id, kept) {
                    return Err(TraceError::Corrupted { op, id });
                }

                let live = Live { ptr, size };
                fill(heap, id, live, kept.size);
                slots[id] = Some(live);
                live_bytes = live_bytes - old.size + size;
            }
            Op::Free { id } => {
                let Some(live) = slots.get_mut(id).and_then(Option::take) else {
                    return Err(TraceError::UnknownId { op, id });
                };
                if !intact(heap, id, live) {
                    return Err(TraceError::Corrupted { op, id });
                }

                heap.deallocate(live.ptr);
                live_bytes -= live.size;
            }
        }

        report.peak_live_bytes = report.peak_live_bytes.max(live_bytes);

        if check_each_op {
            heap.validate().map_err(|err| TraceError::Heap { op, err })?;
        }
    }

    report.ops = trace.ops.len();
    report.arena_bytes = heap.bounds().size();

    debug!(
        "replayed {} requests: peak {} live bytes in a {} byte arena",
        report.ops, report.peak_live_bytes, report.arena_bytes
    );
    Ok(report)
}
