//! # DIMENSION Memory Core
//!
//! Free-list backed sub-allocation for the DIMENSION engine.
//!
//! ## Layers
//!
//! 1. [`Freelist`] - tracks free `(offset, size)` ranges of an arena using a
//!    node pool allocated once. Address ordered, first fit, coalescing.
//! 2. [`DynamicAllocator`] - owns one arena and writes an in-band
//!    [`AllocationHeader`] before every pointer so `free` needs no size.
//! 3. [`MemorySystem`] - locked, tagged facade with per-tag statistics and a
//!    platform-heap fallback when the arena runs out.
//!
//! ## Architecture Rules
//!
//! 1. **No allocation after construction** in the freelist
//! 2. **Every failure is a `Result`** - exhaustion, misuse and corruption
//!    are all reported, never panicked
//! 3. **Single writer** - the core takes `&mut self`; only the facade locks
//!
//! ## Example
//!
//! ```rust
//! use dimension_memory::DynamicAllocator;
//!
//! let mut allocator = DynamicAllocator::new(1024)?;
//! let a = allocator.allocate(300)?;
//! let b = allocator.allocate(200)?;
//! allocator.free_aligned(a)?;
//! allocator.free(b, 200)?;
//! assert_eq!(allocator.free_space(), 1024);
//! # Ok::<(), dimension_memory::AllocError>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod dynamic;
pub mod error;
pub mod freelist;
pub mod system;

pub use config::MemoryConfig;
pub use dynamic::{AllocationHeader, ArenaPtr, DynamicAllocator, HEADER_SIZE};
pub use error::{AllocError, AllocResult};
pub use freelist::{AlignedBlock, FreeRange, Freelist};
pub use system::{MemoryBlock, MemoryStats, MemorySystem, MemoryTag};
