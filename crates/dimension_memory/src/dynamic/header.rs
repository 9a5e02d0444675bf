//! # Allocation Header
//!
//! In-band record stored immediately before every pointer the dynamic
//! allocator hands out, so `free` never needs the caller to repeat the size.
//!
//! ## Layout
//!
//! ```text
//! | padding (alignment_offset) | prefix slack | header (16B) | user bytes (size) |
//! ^ freelist span start                                      ^ returned pointer
//! ```
//!
//! The prefix is the header size rounded up to the alignment, so the user
//! pointer stays aligned whenever the freelist block is.

use bytemuck::{Pod, Zeroable};

/// Size of [`AllocationHeader`] in bytes.
pub const HEADER_SIZE: usize = std::mem::size_of::<AllocationHeader>();

/// Header written in front of each allocation.
///
/// Plain old data: written and read as raw arena bytes with `bytemuck`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct AllocationHeader {
    /// Caller-requested size, header and padding excluded.
    pub size: u64,
    /// Stamp shared with the [`ArenaPtr`](super::ArenaPtr). Zero once freed.
    pub generation: u32,
    /// Freelist padding owned by the allocation.
    pub alignment_offset: u16,
    /// Requested alignment.
    pub alignment: u16,
}

impl AllocationHeader {
    /// Creates a header.
    #[inline]
    #[must_use]
    pub const fn new(size: usize, alignment: u16, alignment_offset: u16, generation: u32) -> Self {
        Self {
            size: size as u64,
            generation,
            alignment_offset,
            alignment,
        }
    }

    /// Recorded size as `usize`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn size(&self) -> usize {
        self.size as usize
    }

    /// Bytes reserved in front of the user pointer for this header.
    #[inline]
    #[must_use]
    pub fn prefix(&self) -> usize {
        header_prefix(self.alignment)
    }

    /// Writes the header into the first [`HEADER_SIZE`] bytes of `dst`.
    #[inline]
    pub fn write_to(&self, dst: &mut [u8]) {
        dst[..HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(self));
    }

    /// Reads a header from the first [`HEADER_SIZE`] bytes of `src`.
    ///
    /// The arena is byte-aligned, so the read is unaligned.
    #[inline]
    #[must_use]
    pub fn read_from(src: &[u8]) -> Self {
        bytemuck::pod_read_unaligned(&src[..HEADER_SIZE])
    }
}

/// Bytes reserved in front of a user pointer with the given alignment.
///
/// Equal to [`HEADER_SIZE`] for every alignment up to 16.
#[inline]
#[must_use]
pub fn header_prefix(alignment: u16) -> usize {
    HEADER_SIZE.next_multiple_of(usize::from(alignment.max(1)))
}
