//! # Allocator Error Types
//!
//! All errors that can occur in the memory core.

use thiserror::Error;

/// Errors that can occur in the freelist, the dynamic allocator or the
/// memory system facade.
///
/// Every variant is recoverable by contract: nothing in this crate panics on
/// an allocation or free failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    /// No free range is large enough for the request.
    #[error("capacity exhausted: requested {requested}B, available {available}B")]
    CapacityExhausted {
        /// Bytes requested (including any internal overhead).
        requested: usize,
        /// Total free bytes at the time of the request.
        available: usize,
    },

    /// Zero size, zero alignment, shrinking resize and similar misuse.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A pointer or span does not lie inside the owned arena.
    #[error("offset {offset} is outside of the arena (total size {total_size}B)")]
    OutOfRange {
        /// Offending arena offset.
        offset: usize,
        /// Size of the arena.
        total_size: usize,
    },

    /// The node pool has no slot left to describe another free range.
    #[error("freelist node pool exhausted ({max_entries} entries)")]
    PoolExhausted {
        /// Capacity of the node pool.
        max_entries: usize,
    },

    /// The free-range list is not in the shape it must be in.
    #[error("freelist consistency violation: {0}")]
    ConsistencyViolation(&'static str),

    /// The span or pointer being freed is already free.
    #[error("double free at offset {offset}")]
    DoubleFree {
        /// Arena offset passed to the free call.
        offset: usize,
    },

    /// The pointer refers to an allocation that was freed and reused.
    #[error("stale pointer at offset {offset}: generation {expected}, header has {found}")]
    StalePointer {
        /// Arena offset of the pointer.
        offset: usize,
        /// Generation carried by the pointer.
        expected: u32,
        /// Generation recorded in the header.
        found: u32,
    },

    /// The size passed to `free` does not match the recorded size.
    #[error("size mismatch: allocation holds {recorded}B, free was given {supplied}B")]
    SizeMismatch {
        /// Size recorded in the allocation header.
        recorded: usize,
        /// Size supplied by the caller.
        supplied: usize,
    },

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for allocator operations.
pub type AllocResult<T> = Result<T, AllocError>;
