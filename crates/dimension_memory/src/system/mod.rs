//! # Memory System
//!
//! The process-facing entry point: one [`DynamicAllocator`] behind a lock,
//! tagged statistics, and a fallback to the platform heap.
//!
//! ## Design
//!
//! ```text
//! caller ──allocate(size, tag)──► MemorySystem ──lock──► DynamicAllocator
//!                                      │                     │ CapacityExhausted
//!                                      │◄────────────────────┘
//!                                      └──► platform heap (Box<[u8]>)
//! ```
//!
//! The allocator core stays single-writer; this layer is what makes it
//! shareable between threads.

mod stats;
mod tag;

use parking_lot::Mutex;

use crate::config::MemoryConfig;
use crate::dynamic::{ArenaPtr, DynamicAllocator};
use crate::error::{AllocError, AllocResult};

pub use stats::MemoryStats;
pub use tag::MemoryTag;

/// A block handed out by [`MemorySystem::allocate`].
#[derive(Debug)]
pub enum MemoryBlock {
    /// Carved from the arena.
    Arena {
        /// Handle into the arena.
        ptr: ArenaPtr,
        /// Requested size in bytes.
        size: usize,
    },
    /// Served by the platform heap because the arena was exhausted.
    Platform(Box<[u8]>),
}

impl MemoryBlock {
    /// Size of the block in bytes.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Self::Arena { size, .. } => *size,
            Self::Platform(bytes) => bytes.len(),
        }
    }

    /// Whether the block came from the platform heap.
    #[inline]
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        matches!(self, Self::Platform(_))
    }
}

/// Thread-safe tagged allocator facade.
///
/// # Example
///
/// ```rust
/// use dimension_memory::{MemoryConfig, MemorySystem, MemoryTag};
///
/// let memory = MemorySystem::new(MemoryConfig::new(4096))?;
/// let mut block = memory.allocate(128, MemoryTag::String)?;
/// memory.with_bytes_mut(&mut block, |bytes| bytes[0] = 7)?;
/// assert_eq!(memory.stats().tagged(MemoryTag::String), 128);
///
/// memory.free(block, MemoryTag::String)?;
/// # Ok::<(), dimension_memory::AllocError>(())
/// ```
pub struct MemorySystem {
    config: MemoryConfig,
    allocator: Mutex<DynamicAllocator>,
    stats: Mutex<MemoryStats>,
}

impl MemorySystem {
    /// Creates the arena described by `config`.
    ///
    /// # Errors
    ///
    /// [`AllocError::InvalidConfig`] or [`AllocError::InvalidArgument`] if
    /// the arena cannot be created.
    pub fn new(config: MemoryConfig) -> AllocResult<Self> {
        config.validate()?;
        let allocator = DynamicAllocator::new(config.total_size)?;
        tracing::debug!(
            "Memory system allocated {}B (fallback: {}, zero on allocate: {})",
            config.total_size,
            config.fallback_to_platform,
            config.zero_on_allocate
        );

        Ok(Self {
            config,
            allocator: Mutex::new(allocator),
            stats: Mutex::new(MemoryStats::default()),
        })
    }

    /// The active configuration.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Allocates `size` bytes attributed to `tag`.
    ///
    /// Falls back to the platform heap when the arena is out of space and
    /// `fallback_to_platform` is set.
    ///
    /// # Errors
    ///
    /// - [`AllocError::InvalidArgument`] for a zero size.
    /// - The arena error when it cannot serve and fallback is disabled.
    pub fn allocate(&self, size: usize, tag: MemoryTag) -> AllocResult<MemoryBlock> {
        if tag == MemoryTag::Unknown {
            tracing::warn!("allocate called with MemoryTag::Unknown. Re-class this allocation.");
        }
        if size == 0 {
            return Err(AllocError::InvalidArgument(
                "allocation size must be greater than zero",
            ));
        }

        let mut fallback = false;
        let block = match self.allocate_from_arena(size) {
            Ok(ptr) => MemoryBlock::Arena { ptr, size },
            // Allocation never takes a pool slot, so running out of arena
            // is the only condition the platform heap can cover.
            Err(err @ AllocError::CapacityExhausted { .. })
                if self.config.fallback_to_platform =>
            {
                tracing::warn!(
                    "Arena cannot serve {}B ({}). Allocating from the platform heap.",
                    size,
                    err
                );
                fallback = true;
                MemoryBlock::Platform(vec![0u8; size].into_boxed_slice())
            }
            Err(err) => return Err(err),
        };

        self.stats.lock().record_allocate(size, tag, fallback);
        Ok(block)
    }

    fn allocate_from_arena(&self, size: usize) -> AllocResult<ArenaPtr> {
        let mut allocator = self.allocator.lock();
        let ptr = allocator.allocate(size)?;
        if self.config.zero_on_allocate {
            allocator.bytes_mut(ptr)?.fill(0);
        }
        Ok(ptr)
    }

    /// Releases a block previously returned by [`MemorySystem::allocate`].
    ///
    /// # Errors
    ///
    /// Any pointer error from the arena. Statistics are left untouched then.
    pub fn free(&self, block: MemoryBlock, tag: MemoryTag) -> AllocResult<()> {
        if tag == MemoryTag::Unknown {
            tracing::warn!("free called with MemoryTag::Unknown. Re-class this allocation.");
        }

        let size = block.size();
        match block {
            MemoryBlock::Arena { ptr, size } => self.allocator.lock().free(ptr, size)?,
            MemoryBlock::Platform(bytes) => drop(bytes),
        }

        self.stats.lock().record_free(size, tag);
        Ok(())
    }

    /// Runs `f` over the bytes of `block`.
    ///
    /// Arena blocks are read under the allocator lock; keep `f` short.
    ///
    /// # Errors
    ///
    /// Any pointer error from the arena.
    pub fn with_bytes<R>(&self, block: &MemoryBlock, f: impl FnOnce(&[u8]) -> R) -> AllocResult<R> {
        match block {
            MemoryBlock::Arena { ptr, .. } => {
                let allocator = self.allocator.lock();
                Ok(f(allocator.bytes(*ptr)?))
            }
            MemoryBlock::Platform(bytes) => Ok(f(bytes)),
        }
    }

    /// Runs `f` over the bytes of `block`, mutably.
    ///
    /// # Errors
    ///
    /// Any pointer error from the arena.
    pub fn with_bytes_mut<R>(
        &self,
        block: &mut MemoryBlock,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> AllocResult<R> {
        match block {
            MemoryBlock::Arena { ptr, .. } => {
                let mut allocator = self.allocator.lock();
                Ok(f(allocator.bytes_mut(*ptr)?))
            }
            MemoryBlock::Platform(bytes) => Ok(f(bytes)),
        }
    }

    /// Copy of the current statistics.
    #[must_use]
    pub fn stats(&self) -> MemoryStats {
        self.stats.lock().clone()
    }

    /// Free bytes left in the arena.
    #[must_use]
    pub fn free_space(&self) -> usize {
        self.allocator.lock().free_space()
    }

    /// Arena size in bytes.
    #[must_use]
    pub fn total_space(&self) -> usize {
        self.allocator.lock().total_space()
    }

    /// Per-tag usage report.
    #[must_use]
    pub fn usage_report(&self) -> String {
        self.stats.lock().report()
    }

    /// Tears the system down and returns the final statistics.
    pub fn shutdown(self) -> MemoryStats {
        let allocator = self.allocator.into_inner();
        tracing::info!(
            "Memory system shut down: {}B of {}B free, {} live allocations",
            allocator.free_space(),
            allocator.total_space(),
            allocator.live_allocations()
        );
        self.stats.into_inner()
    }
}
