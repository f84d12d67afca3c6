//! Page geometry.
//!
//! A page is a 4096-byte aligned region of virtual address space identified
//! by `address >> PAGE_SHIFT`. Address arithmetic is widened to `u128` so an
//! allocation ending at the top of the address space never wraps.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Page size exponent
pub const PAGE_SHIFT: u32 = 12;

/// Page size in bytes
pub const PAGE_SIZE: u64 = 1 << PAGE_SHIFT;

const PAGE_MASK: u128 = (PAGE_SIZE as u128) - 1;

/// Page number containing `address`
#[must_use]
pub const fn page_of(address: u64) -> u64 {
    address >> PAGE_SHIFT
}

/// Inclusive range of page numbers covered by an allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageSpan {
    /// First page touched
    pub first: u64,
    /// Last page touched (inclusive)
    pub last: u64,
}

impl PageSpan {
    /// Span of `size` bytes starting at `pointer`.
    ///
    /// A zero-sized allocation spans exactly the page containing `pointer`.
    #[must_use]
    pub fn of(pointer: u64, size: u64) -> Self {
        let first = page_of(pointer);
        let last = if size == 0 {
            first
        } else {
            ((u128::from(pointer) + u128::from(size) - 1) >> PAGE_SHIFT) as u64
        };
        Self { first, last }
    }

    /// Iterate over the page numbers of the span
    #[must_use]
    pub fn pages(&self) -> RangeInclusive<u64> {
        self.first..=self.last
    }
}

/// Bytes of one allocation that land on one page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageChunk {
    /// Page number
    pub page: u64,
    /// Bytes attributed to the page
    pub bytes: u64,
}

/// Iterator splitting an allocation into per-page chunks.
///
/// Each step takes `min(remaining, PAGE_SIZE - offset)` bytes, so the chunk
/// sizes always sum to the allocation size.
#[derive(Debug, Clone)]
pub struct PageChunks {
    address: u128,
    remaining: u64,
}

impl PageChunks {
    /// Chunks of `size` bytes starting at `pointer`
    #[must_use]
    pub fn new(pointer: u64, size: u64) -> Self {
        Self {
            address: u128::from(pointer),
            remaining: size,
        }
    }
}

impl Iterator for PageChunks {
    type Item = PageChunk;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let offset = (self.address & PAGE_MASK) as u64;
        let bytes = self.remaining.min(PAGE_SIZE - offset);
        let page = (self.address >> PAGE_SHIFT) as u64;

        self.address += u128::from(bytes);
        self.remaining -= bytes;

        Some(PageChunk { page, bytes })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.remaining == 0 {
            return (0, Some(0));
        }
        let offset = (self.address & PAGE_MASK) as u64;
        let span = (u128::from(offset) + u128::from(self.remaining)).div_ceil(u128::from(PAGE_SIZE));
        let n = usize::try_from(span).unwrap_or(usize::MAX);
        (n, Some(n))
    }
}
