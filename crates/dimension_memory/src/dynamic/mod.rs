//! # Dynamic Allocator
//!
//! `malloc`/`free` style allocation from one owned arena.
//!
//! Every allocation carries an in-band [`AllocationHeader`] so freeing only
//! needs the pointer. Pointers are [`ArenaPtr`] handles: an arena offset plus
//! a generation stamp, which lets the allocator refuse double frees and
//! stale pointers instead of corrupting its free list.

mod header;

use std::fmt;

use crate::error::{AllocError, AllocResult};
use crate::freelist::{FreeRange, Freelist};

pub use header::{header_prefix, AllocationHeader, HEADER_SIZE};

/// Bytes of arena covered by one liveness bit.
///
/// Two live pointers are always more than a header apart, so each bucket
/// holds at most one of them. Its exact position inside the bucket is kept
/// in `live_slot`.
const LIVE_BUCKET: usize = HEADER_SIZE;

/// Handle to an allocation inside a [`DynamicAllocator`] arena.
///
/// The offset is arena-relative: offset 0 is the first arena byte, and the
/// alignment guarantee (`offset % alignment == 0`) holds in that space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ArenaPtr {
    offset: usize,
    generation: u32,
}

impl ArenaPtr {
    /// Rebuilds a handle from its parts.
    ///
    /// The allocator validates every handle it is given, so a forged one is
    /// refused rather than trusted.
    #[inline]
    #[must_use]
    pub const fn from_raw_parts(offset: usize, generation: u32) -> Self {
        Self { offset, generation }
    }

    /// Offset of the first user byte from the arena base.
    #[inline]
    #[must_use]
    pub const fn offset(self) -> usize {
        self.offset
    }

    /// Generation stamp written in the allocation header.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

/// General purpose allocator over a single arena.
///
/// # Thread Safety
///
/// NOT internally synchronized. Mutating calls take `&mut self`; wrap the
/// allocator in a lock to share it (see [`MemorySystem`](crate::MemorySystem)).
///
/// # Example
///
/// ```rust
/// use dimension_memory::DynamicAllocator;
///
/// let mut allocator = DynamicAllocator::new(1024)?;
/// let ptr = allocator.allocate_aligned(100, 8)?;
/// assert_eq!(ptr.offset() % 8, 0);
/// assert_eq!(allocator.get_alignment_size(ptr)?, (100, 8));
///
/// allocator.free_aligned(ptr)?;
/// assert_eq!(allocator.free_space(), 1024);
/// # Ok::<(), dimension_memory::AllocError>(())
/// ```
pub struct DynamicAllocator {
    /// Arena size in bytes.
    total_size: usize,
    /// Free ranges of the arena.
    list: Freelist,
    /// The arena.
    arena: Box<[u8]>,
    /// One bit per `LIVE_BUCKET` bytes, set where a live pointer starts.
    live: Box<[u64]>,
    /// Per bucket, `offset % LIVE_BUCKET` of the live pointer it holds.
    live_slot: Box<[u8]>,
    /// Last generation handed out. Zero is never used.
    generation: u32,
    /// Number of live allocations.
    live_count: usize,
}

impl DynamicAllocator {
    /// Creates an allocator owning a zeroed arena of `total_size` bytes.
    ///
    /// # Errors
    ///
    /// [`AllocError::InvalidArgument`] if `total_size` is zero.
    pub fn new(total_size: usize) -> AllocResult<Self> {
        if total_size == 0 {
            tracing::warn!("Dynamic allocator cannot be created with a total size of 0");
            return Err(AllocError::InvalidArgument(
                "dynamic allocator total size must be greater than zero",
            ));
        }

        let list = Freelist::new(total_size)?;
        tracing::debug!(
            "Dynamic allocator created: {}B arena, {} freelist entries",
            total_size,
            list.max_entries()
        );

        Ok(Self {
            total_size,
            list,
            arena: vec![0u8; total_size].into_boxed_slice(),
            live: vec![0u64; live_words(total_size)].into_boxed_slice(),
            live_slot: vec![0u8; live_buckets(total_size)].into_boxed_slice(),
            generation: 0,
            live_count: 0,
        })
    }

    /// Allocates `size` bytes with alignment 1.
    ///
    /// # Errors
    ///
    /// See [`DynamicAllocator::allocate_aligned`].
    pub fn allocate(&mut self, size: usize) -> AllocResult<ArenaPtr> {
        self.allocate_aligned(size, 1)
    }

    /// Allocates `size` bytes whose offset is a multiple of `alignment`.
    ///
    /// # Errors
    ///
    /// - [`AllocError::InvalidArgument`] for a zero size or alignment.
    /// - [`AllocError::CapacityExhausted`] if no free range fits. The
    ///   reported `requested` includes the header.
    pub fn allocate_aligned(&mut self, size: usize, alignment: u16) -> AllocResult<ArenaPtr> {
        if size == 0 || alignment == 0 {
            tracing::warn!(
                "Dynamic allocator requires a valid size and alignment (size: {}, alignment: {})",
                size,
                alignment
            );
            return Err(AllocError::InvalidArgument(
                "allocation requires a non-zero size and alignment",
            ));
        }

        let prefix = header_prefix(alignment);
        let Some(required) = size.checked_add(prefix) else {
            return Err(AllocError::CapacityExhausted {
                requested: size,
                available: self.list.free_space(),
            });
        };

        let block = match self.list.allocate_block_aligned(required, usize::from(alignment)) {
            Ok(block) => block,
            Err(err) => {
                tracing::warn!(
                    "Dynamic allocator has no block large enough (requested: {}B, available: {}B of {}B)",
                    size,
                    self.list.free_space(),
                    self.total_size
                );
                return Err(err);
            }
        };

        // Padding is always below the alignment, which is a u16.
        let Ok(alignment_offset) = u16::try_from(block.padding) else {
            self.list
                .free_block_aligned(required, block.offset, block.padding)?;
            return Err(AllocError::ConsistencyViolation(
                "alignment padding exceeds the requested alignment",
            ));
        };

        let offset = block.offset + prefix;
        let generation = self.next_generation();
        AllocationHeader::new(size, alignment, alignment_offset, generation)
            .write_to(&mut self.arena[offset - HEADER_SIZE..offset]);
        self.set_live(offset, true);
        self.live_count += 1;

        Ok(ArenaPtr { offset, generation })
    }

    /// Frees `ptr`, checking that `size` matches the recorded size.
    ///
    /// # Errors
    ///
    /// [`AllocError::SizeMismatch`] when `size` differs from the header, plus
    /// everything [`DynamicAllocator::free_aligned`] can return. Nothing is
    /// freed on error.
    pub fn free(&mut self, ptr: ArenaPtr, size: usize) -> AllocResult<()> {
        let header = self.checked_header(ptr)?;
        if header.size() != size {
            tracing::warn!(
                "Dynamic allocator free of {} refused: caller size {}B, recorded {}B",
                ptr.offset,
                size,
                header.size()
            );
            return Err(AllocError::SizeMismatch {
                recorded: header.size(),
                supplied: size,
            });
        }
        self.release(ptr, header)
    }

    /// Frees `ptr` using the size and padding recorded in its header.
    ///
    /// # Errors
    ///
    /// - [`AllocError::OutOfRange`] if `ptr` is not inside the arena.
    /// - [`AllocError::DoubleFree`] if `ptr` is not live.
    /// - [`AllocError::StalePointer`] if the slot was reused since.
    /// - [`AllocError::ConsistencyViolation`] if the header is corrupt.
    pub fn free_aligned(&mut self, ptr: ArenaPtr) -> AllocResult<()> {
        let header = self.checked_header(ptr)?;
        self.release(ptr, header)
    }

    fn release(&mut self, ptr: ArenaPtr, header: AllocationHeader) -> AllocResult<()> {
        let prefix = header.prefix();
        self.list.free_block_aligned(
            header.size() + prefix,
            ptr.offset - prefix,
            usize::from(header.alignment_offset),
        )?;

        let scrubbed = AllocationHeader {
            generation: 0,
            ..header
        };
        scrubbed.write_to(&mut self.arena[ptr.offset - HEADER_SIZE..ptr.offset]);
        self.set_live(ptr.offset, false);
        self.live_count -= 1;

        Ok(())
    }

    /// Returns the recorded `(size, alignment)` of a live allocation.
    ///
    /// # Errors
    ///
    /// Same pointer checks as [`DynamicAllocator::free_aligned`].
    pub fn get_alignment_size(&self, ptr: ArenaPtr) -> AllocResult<(usize, u16)> {
        let header = self.checked_header(ptr)?;
        Ok((header.size(), header.alignment))
    }

    /// The full header of a live allocation.
    ///
    /// # Errors
    ///
    /// Same pointer checks as [`DynamicAllocator::free_aligned`].
    pub fn header(&self, ptr: ArenaPtr) -> AllocResult<AllocationHeader> {
        self.checked_header(ptr)
    }

    /// The user bytes of a live allocation.
    ///
    /// # Errors
    ///
    /// Same pointer checks as [`DynamicAllocator::free_aligned`].
    pub fn bytes(&self, ptr: ArenaPtr) -> AllocResult<&[u8]> {
        let header = self.checked_header(ptr)?;
        Ok(&self.arena[ptr.offset..ptr.offset + header.size()])
    }

    /// The user bytes of a live allocation, mutably.
    ///
    /// # Errors
    ///
    /// Same pointer checks as [`DynamicAllocator::free_aligned`].
    pub fn bytes_mut(&mut self, ptr: ArenaPtr) -> AllocResult<&mut [u8]> {
        let header = self.checked_header(ptr)?;
        Ok(&mut self.arena[ptr.offset..ptr.offset + header.size()])
    }

    /// Grows the arena to `new_size` bytes, keeping content and handles.
    ///
    /// # Errors
    ///
    /// - [`AllocError::InvalidArgument`] if `new_size` is smaller than the
    ///   current size.
    /// - [`AllocError::PoolExhausted`] from the freelist rebuild.
    pub fn resize(&mut self, new_size: usize) -> AllocResult<()> {
        if new_size < self.total_size {
            return Err(AllocError::InvalidArgument("dynamic allocator cannot shrink"));
        }
        if new_size == self.total_size {
            return Ok(());
        }

        self.list.resize(new_size)?;

        let mut arena = vec![0u8; new_size].into_boxed_slice();
        arena[..self.total_size].copy_from_slice(&self.arena);
        let mut live = vec![0u64; live_words(new_size)].into_boxed_slice();
        live[..self.live.len()].copy_from_slice(&self.live);
        let mut live_slot = vec![0u8; live_buckets(new_size)].into_boxed_slice();
        live_slot[..self.live_slot.len()].copy_from_slice(&self.live_slot);

        tracing::debug!(
            "Dynamic allocator resized from {}B to {}B",
            self.total_size,
            new_size
        );
        self.arena = arena;
        self.live = live;
        self.live_slot = live_slot;
        self.total_size = new_size;

        Ok(())
    }

    /// Free bytes in the arena. Walks the free list.
    #[must_use]
    pub fn free_space(&self) -> usize {
        self.list.free_space()
    }

    /// Arena size in bytes.
    #[inline]
    #[must_use]
    pub const fn total_space(&self) -> usize {
        self.total_size
    }

    /// Number of live allocations.
    #[inline]
    #[must_use]
    pub const fn live_allocations(&self) -> usize {
        self.live_count
    }

    /// Largest single free range, header overhead included.
    #[must_use]
    pub fn largest_free_range(&self) -> Option<FreeRange> {
        self.list.largest_free_range()
    }

    /// Size of the per-allocation header. Mostly useful to tests.
    #[inline]
    #[must_use]
    pub const fn header_size() -> usize {
        HEADER_SIZE
    }

    /// Read access to the underlying free list.
    #[inline]
    #[must_use]
    pub const fn freelist(&self) -> &Freelist {
        &self.list
    }

    /// Validates `ptr` and returns its header.
    fn checked_header(&self, ptr: ArenaPtr) -> AllocResult<AllocationHeader> {
        let offset = ptr.offset;
        if offset < HEADER_SIZE || offset >= self.total_size {
            tracing::warn!(
                "Dynamic allocator given pointer {} outside of its arena [0, {})",
                offset,
                self.total_size
            );
            return Err(AllocError::OutOfRange {
                offset,
                total_size: self.total_size,
            });
        }

        if !self.is_live(offset) {
            tracing::warn!("Dynamic allocator given pointer {} that is not live", offset);
            return Err(AllocError::DoubleFree { offset });
        }

        let header = AllocationHeader::read_from(&self.arena[offset - HEADER_SIZE..offset]);
        if header.generation != ptr.generation {
            return Err(AllocError::StalePointer {
                offset,
                expected: ptr.generation,
                found: header.generation,
            });
        }

        let span_start = header.prefix() + usize::from(header.alignment_offset);
        let fits = header.alignment != 0
            && offset >= span_start
            && offset
                .checked_add(header.size())
                .is_some_and(|end| end <= self.total_size);
        if !fits {
            return Err(AllocError::ConsistencyViolation(
                "allocation header describes a span outside the arena",
            ));
        }

        Ok(header)
    }

    fn next_generation(&mut self) -> u32 {
        self.generation = self.generation.wrapping_add(1).max(1);
        self.generation
    }

    /// True only for the exact offset of a live pointer, never for an
    /// interior byte sharing its bucket.
    #[inline]
    fn is_live(&self, offset: usize) -> bool {
        let bucket = offset / LIVE_BUCKET;
        self.live[bucket / 64] & (1 << (bucket % 64)) != 0
            && usize::from(self.live_slot[bucket]) == offset % LIVE_BUCKET
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn set_live(&mut self, offset: usize, live: bool) {
        let bucket = offset / LIVE_BUCKET;
        let mask = 1u64 << (bucket % 64);
        if live {
            self.live[bucket / 64] |= mask;
            // LIVE_BUCKET is 16, so the residue fits a byte.
            self.live_slot[bucket] = (offset % LIVE_BUCKET) as u8;
        } else {
            self.live[bucket / 64] &= !mask;
        }
    }
}

impl Drop for DynamicAllocator {
    fn drop(&mut self) {
        self.arena.fill(0);
        tracing::debug!(
            "Dynamic allocator destroyed with {} live allocations",
            self.live_count
        );
    }
}

impl fmt::Debug for DynamicAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicAllocator")
            .field("total_size", &self.total_size)
            .field("live_allocations", &self.live_count)
            .field("list", &self.list)
            .finish_non_exhaustive()
    }
}

/// Liveness buckets covering an arena of `total_size` bytes.
fn live_buckets(total_size: usize) -> usize {
    total_size.div_ceil(LIVE_BUCKET)
}

/// Words of liveness bitmap needed for an arena of `total_size` bytes.
fn live_words(total_size: usize) -> usize {
    live_buckets(total_size).div_ceil(64)
}
