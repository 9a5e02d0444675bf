//! # Freelist
//!
//! Tracks which byte ranges of an externally owned arena are unused.
//!
//! The list never touches the arena itself. It only hands out and takes back
//! `(offset, size)` spans, and it never allocates after construction: every
//! free range lives in a node pool sized once from the arena size.
//!
//! ## Invariants
//!
//! After every mutating call the free ranges are:
//! - ordered by address
//! - non-overlapping
//! - non-adjacent (touching ranges are always coalesced)
//! - never zero-sized

use std::fmt;

use crate::error::{AllocError, AllocResult};

/// Bytes of arena that pay for one node pool slot.
pub const NODE_SLOT_COST: usize = std::mem::size_of::<usize>();

/// Smallest node pool ever built, whatever the arena size.
pub const MIN_POOL_ENTRIES: usize = 10;

/// A contiguous span of unused bytes inside the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FreeRange {
    /// Start of the span, in bytes from the arena base.
    pub offset: usize,
    /// Length of the span in bytes. Never zero inside a list.
    pub size: usize,
}

impl FreeRange {
    /// Creates a new range.
    #[inline]
    #[must_use]
    pub const fn new(offset: usize, size: usize) -> Self {
        Self { offset, size }
    }

    /// One past the last byte of the range.
    #[inline]
    #[must_use]
    pub const fn end(self) -> usize {
        self.offset + self.size
    }
}

/// Result of an aligned block request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AlignedBlock {
    /// Aligned offset handed to the caller.
    pub offset: usize,
    /// Leading pad bytes owned by this block. Pass it back to
    /// [`Freelist::free_block_aligned`].
    pub padding: usize,
}

#[derive(Clone, Copy, Debug)]
struct Node {
    range: FreeRange,
    next: Option<usize>,
}

/// One entry of the node pool.
#[derive(Clone, Copy, Debug)]
enum PoolSlot {
    /// Not describing any range; available to the list.
    Free,
    /// Linked into the free-range list.
    Used(Node),
}

/// Address-ordered free-range tracker over a fixed-size arena.
///
/// # Thread Safety
///
/// Not internally synchronized. Every mutating method takes `&mut self`;
/// share it behind a lock if several threads need it.
///
/// # Example
///
/// ```rust
/// use dimension_memory::Freelist;
///
/// let mut list = Freelist::new(512)?;
/// let offset = list.allocate_block(64)?;
/// assert_eq!(list.free_space(), 448);
///
/// list.free_block(64, offset)?;
/// assert_eq!(list.free_space(), 512);
/// # Ok::<(), dimension_memory::AllocError>(())
/// ```
pub struct Freelist {
    /// Size of the tracked arena in bytes.
    total_size: usize,
    /// The node pool.
    slots: Box<[PoolSlot]>,
    /// Indices of `PoolSlot::Free` slots. Capacity equals the pool size.
    spare: Vec<usize>,
    /// First free range in address order, `None` when fully allocated.
    head: Option<usize>,
}

impl Freelist {
    /// Creates a freelist tracking `total_size` bytes, all of them free.
    ///
    /// # Errors
    ///
    /// [`AllocError::InvalidArgument`] if `total_size` is zero.
    pub fn new(total_size: usize) -> AllocResult<Self> {
        if total_size == 0 {
            return Err(AllocError::InvalidArgument(
                "freelist total size must be greater than zero",
            ));
        }

        let max_entries = Self::pool_entries_for(total_size);
        let mut list = Self {
            total_size,
            slots: vec![PoolSlot::Free; max_entries].into_boxed_slice(),
            spare: Vec::with_capacity(max_entries),
            head: None,
        };
        list.reset_pool();

        Ok(list)
    }

    /// Number of pool slots a freelist over `total_size` bytes gets.
    fn pool_entries_for(total_size: usize) -> usize {
        let entries = total_size / NODE_SLOT_COST;
        if entries < MIN_POOL_ENTRIES {
            tracing::warn!(
                "Freelists are inefficient below {}B (got {}B); node pool raised to {} entries",
                MIN_POOL_ENTRIES * NODE_SLOT_COST,
                total_size,
                MIN_POOL_ENTRIES
            );
            return MIN_POOL_ENTRIES;
        }
        entries
    }

    /// Marks every slot free, then links one range covering the arena.
    fn reset_pool(&mut self) {
        self.slots.fill(PoolSlot::Free);
        self.spare.clear();
        self.spare.extend((1..self.slots.len()).rev());

        self.slots[0] = PoolSlot::Used(Node {
            range: FreeRange::new(0, self.total_size),
            next: None,
        });
        self.head = Some(0);
    }

    /// Size of the tracked arena in bytes.
    #[inline]
    #[must_use]
    pub const fn total_size(&self) -> usize {
        self.total_size
    }

    /// Capacity of the node pool.
    #[inline]
    #[must_use]
    pub fn max_entries(&self) -> usize {
        self.slots.len()
    }

    /// Finds `size` free bytes, first fit in address order.
    ///
    /// # Errors
    ///
    /// See [`Freelist::allocate_block_aligned`].
    pub fn allocate_block(&mut self, size: usize) -> AllocResult<usize> {
        self.allocate_block_aligned(size, 1).map(|block| block.offset)
    }

    /// Finds `size` free bytes starting at a multiple of `alignment`.
    ///
    /// Ranges are scanned in address order. The first range that can hold
    /// `size` bytes after its leading padding wins:
    ///
    /// - exact fit, no padding: the range is unlinked
    /// - exact fit behind padding: the range shrinks to just the padding,
    ///   which stays free, and the returned `padding` is zero
    /// - larger: the range is split and the block owns the padding
    ///
    /// # Errors
    ///
    /// - [`AllocError::InvalidArgument`] for a zero size or alignment.
    /// - [`AllocError::CapacityExhausted`] if no range fits.
    pub fn allocate_block_aligned(
        &mut self,
        size: usize,
        alignment: usize,
    ) -> AllocResult<AlignedBlock> {
        if size == 0 {
            return Err(AllocError::InvalidArgument(
                "allocation size must be greater than zero",
            ));
        }
        if alignment == 0 {
            return Err(AllocError::InvalidArgument("alignment must be at least one"));
        }

        let mut prev = None;
        let mut cursor = self.head;
        while let Some(index) = cursor {
            let mut node = self.node(index)?;
            let range = node.range;
            let aligned = range
                .offset
                .checked_next_multiple_of(alignment)
                .unwrap_or(usize::MAX);
            let padding = aligned - range.offset;
            let needed = size.saturating_add(padding);

            if range.size == needed {
                if padding == 0 {
                    self.unlink(prev, index, node.next)?;
                    self.debug_validate();
                    return Ok(AlignedBlock {
                        offset: range.offset,
                        padding: 0,
                    });
                }

                // The pad bytes stay behind as a free micro-range.
                node.range.size = padding;
                self.set_node(index, node);
                self.debug_validate();
                return Ok(AlignedBlock {
                    offset: aligned,
                    padding: 0,
                });
            }

            if range.size > needed {
                node.range.offset += needed;
                node.range.size -= needed;
                self.set_node(index, node);
                self.debug_validate();
                return Ok(AlignedBlock {
                    offset: aligned,
                    padding,
                });
            }

            prev = Some(index);
            cursor = node.next;
        }

        let available = self.free_space();
        tracing::warn!(
            "Freelist found no block with enough free space (requested: {}B, alignment: {}, available: {}B)",
            size,
            alignment,
            available
        );
        Err(AllocError::CapacityExhausted {
            requested: size,
            available,
        })
    }

    /// Returns `size` bytes at `offset` to the list.
    ///
    /// # Errors
    ///
    /// See [`Freelist::free_block_aligned`].
    pub fn free_block(&mut self, size: usize, offset: usize) -> AllocResult<()> {
        self.free_block_aligned(size, offset, 0)
    }

    /// Returns a block obtained from [`Freelist::allocate_block_aligned`].
    ///
    /// `alignment_offset` is the `padding` reported at allocation time; the
    /// span actually released is `(offset - alignment_offset, size +
    /// alignment_offset)`. The span is coalesced with touching neighbours.
    ///
    /// # Errors
    ///
    /// - [`AllocError::InvalidArgument`] for a zero size.
    /// - [`AllocError::OutOfRange`] if the span leaves the arena.
    /// - [`AllocError::DoubleFree`] if any byte of the span is already free.
    /// - [`AllocError::PoolExhausted`] if a new range is needed and the pool
    ///   is full.
    ///
    /// The list is untouched on error.
    pub fn free_block_aligned(
        &mut self,
        size: usize,
        offset: usize,
        alignment_offset: usize,
    ) -> AllocResult<()> {
        if size == 0 {
            return Err(AllocError::InvalidArgument("freed size must be greater than zero"));
        }

        let out_of_range = AllocError::OutOfRange {
            offset,
            total_size: self.total_size,
        };
        let start = offset
            .checked_sub(alignment_offset)
            .ok_or_else(|| out_of_range.clone())?;
        let span_size = size
            .checked_add(alignment_offset)
            .ok_or_else(|| out_of_range.clone())?;
        match start.checked_add(span_size) {
            Some(end) if end <= self.total_size => {}
            _ => return Err(out_of_range),
        }

        self.insert_span(FreeRange::new(start, span_size))
    }

    /// Links `span` into the list at its address position.
    fn insert_span(&mut self, span: FreeRange) -> AllocResult<()> {
        let mut prev: Option<(usize, Node)> = None;
        let mut cursor = self.head;
        while let Some(index) = cursor {
            let node = self.node(index)?;
            if node.range.offset >= span.offset {
                break;
            }
            prev = Some((index, node));
            cursor = node.next;
        }
        let next = match cursor {
            Some(index) => Some((index, self.node(index)?)),
            None => None,
        };

        let overlaps_prev = prev.is_some_and(|(_, p)| p.range.end() > span.offset);
        let overlaps_next = next.is_some_and(|(_, n)| n.range.offset < span.end());
        if overlaps_prev || overlaps_next {
            tracing::warn!(
                "Freelist refused to free [{}, {}): bytes already free",
                span.offset,
                span.end()
            );
            return Err(AllocError::DoubleFree {
                offset: span.offset,
            });
        }

        let touches_prev = prev.is_some_and(|(_, p)| p.range.end() == span.offset);
        let touches_next = next.is_some_and(|(_, n)| n.range.offset == span.end());

        match (prev, next) {
            (Some((prev_index, mut prev_node)), _) if touches_prev => {
                prev_node.range.size += span.size;
                if let Some((next_index, next_node)) = next.filter(|_| touches_next) {
                    prev_node.range.size += next_node.range.size;
                    prev_node.next = next_node.next;
                    self.release_slot(next_index);
                }
                self.set_node(prev_index, prev_node);
            }
            (_, Some((next_index, mut next_node))) if touches_next => {
                next_node.range.offset = span.offset;
                next_node.range.size += span.size;
                self.set_node(next_index, next_node);
            }
            _ => {
                let index = self.acquire_slot()?;
                self.set_node(
                    index,
                    Node {
                        range: span,
                        next: next.map(|(next_index, _)| next_index),
                    },
                );
                match prev {
                    Some((prev_index, mut prev_node)) => {
                        prev_node.next = Some(index);
                        self.set_node(prev_index, prev_node);
                    }
                    None => self.head = Some(index),
                }
            }
        }

        self.debug_validate();
        Ok(())
    }

    /// Grows the tracked arena to `new_size` bytes.
    ///
    /// The node pool is rebuilt for the new size, existing ranges are copied
    /// in order and `[old_size, new_size)` is appended, merged into the last
    /// range when that one ends at `old_size`.
    ///
    /// # Errors
    ///
    /// - [`AllocError::InvalidArgument`] if `new_size` is smaller than the
    ///   current size.
    /// - [`AllocError::PoolExhausted`] if the rebuilt pool cannot hold the
    ///   ranges. Nothing is changed in that case.
    pub fn resize(&mut self, new_size: usize) -> AllocResult<()> {
        if new_size < self.total_size {
            return Err(AllocError::InvalidArgument("freelist cannot shrink"));
        }
        if new_size == self.total_size {
            return Ok(());
        }

        let old_size = self.total_size;
        let max_entries = Self::pool_entries_for(new_size);
        let mut slots = vec![PoolSlot::Free; max_entries].into_boxed_slice();
        let mut count = 0;

        for range in self.ranges() {
            if count == max_entries {
                return Err(AllocError::PoolExhausted { max_entries });
            }
            slots[count] = PoolSlot::Used(Node { range, next: None });
            count += 1;
        }

        let growth = new_size - old_size;
        let merged = match count.checked_sub(1) {
            Some(last) => match &mut slots[last] {
                PoolSlot::Used(node) if node.range.end() == old_size => {
                    node.range.size += growth;
                    true
                }
                _ => false,
            },
            None => false,
        };
        if !merged {
            if count == max_entries {
                return Err(AllocError::PoolExhausted { max_entries });
            }
            slots[count] = PoolSlot::Used(Node {
                range: FreeRange::new(old_size, growth),
                next: None,
            });
            count += 1;
        }

        for (index, slot) in slots.iter_mut().enumerate().take(count.saturating_sub(1)) {
            if let PoolSlot::Used(node) = slot {
                node.next = Some(index + 1);
            }
        }

        let mut spare = Vec::with_capacity(max_entries);
        spare.extend((count..max_entries).rev());

        self.slots = slots;
        self.spare = spare;
        self.head = Some(0);
        self.total_size = new_size;

        tracing::debug!(
            "Freelist resized from {}B to {}B ({} pool entries)",
            old_size,
            new_size,
            max_entries
        );
        self.debug_validate();
        Ok(())
    }

    /// Marks the whole arena free again. The pool is reused.
    pub fn clear(&mut self) {
        self.reset_pool();
    }

    /// Total free bytes.
    ///
    /// Walks the entire list, so this can be expensive. Use sparingly.
    #[must_use]
    pub fn free_space(&self) -> usize {
        self.ranges().map(|range| range.size).sum()
    }

    /// Number of free ranges.
    #[must_use]
    pub fn range_count(&self) -> usize {
        self.ranges().count()
    }

    /// The largest free range, if any. Useful to gauge fragmentation.
    #[must_use]
    pub fn largest_free_range(&self) -> Option<FreeRange> {
        self.ranges().max_by_key(|range| range.size)
    }

    /// Iterates over the free ranges in address order.
    pub fn ranges(&self) -> Ranges<'_> {
        Ranges {
            list: self,
            cursor: self.head,
        }
    }

    /// Checks every list invariant.
    ///
    /// # Errors
    ///
    /// [`AllocError::ConsistencyViolation`] naming the first broken one.
    pub fn validate(&self) -> AllocResult<()> {
        let mut visited = 0;
        let mut previous: Option<FreeRange> = None;
        let mut cursor = self.head;

        while let Some(index) = cursor {
            let node = self.node(index)?;
            visited += 1;
            if visited > self.slots.len() {
                return Err(AllocError::ConsistencyViolation(
                    "free-range list contains a cycle",
                ));
            }

            let range = node.range;
            if range.size == 0 {
                return Err(AllocError::ConsistencyViolation("zero-sized free range"));
            }
            if range.offset.checked_add(range.size).map_or(true, |end| end > self.total_size) {
                return Err(AllocError::ConsistencyViolation(
                    "free range extends past the arena",
                ));
            }
            if let Some(previous) = previous {
                if previous.end() > range.offset {
                    return Err(AllocError::ConsistencyViolation(
                        "free ranges overlap or are out of order",
                    ));
                }
                if previous.end() == range.offset {
                    return Err(AllocError::ConsistencyViolation(
                        "adjacent free ranges were not coalesced",
                    ));
                }
            }

            previous = Some(range);
            cursor = node.next;
        }

        if visited + self.spare.len() != self.slots.len() {
            return Err(AllocError::ConsistencyViolation(
                "node pool accounting does not match the list",
            ));
        }

        Ok(())
    }

    #[inline]
    fn debug_validate(&self) {
        debug_assert_eq!(self.validate(), Ok(()), "freelist invariants broken");
    }

    fn node(&self, index: usize) -> AllocResult<Node> {
        match self.slots.get(index) {
            Some(PoolSlot::Used(node)) => Ok(*node),
            _ => Err(AllocError::ConsistencyViolation(
                "free-range list links an unused pool slot",
            )),
        }
    }

    #[inline]
    fn set_node(&mut self, index: usize, node: Node) {
        self.slots[index] = PoolSlot::Used(node);
    }

    fn unlink(&mut self, prev: Option<usize>, index: usize, next: Option<usize>) -> AllocResult<()> {
        match prev {
            Some(prev_index) => {
                let mut prev_node = self.node(prev_index)?;
                prev_node.next = next;
                self.set_node(prev_index, prev_node);
            }
            None => self.head = next,
        }
        self.release_slot(index);
        Ok(())
    }

    fn acquire_slot(&mut self) -> AllocResult<usize> {
        self.spare.pop().ok_or_else(|| {
            tracing::warn!(
                "Freelist node pool exhausted ({} entries); arena too fragmented",
                self.slots.len()
            );
            AllocError::PoolExhausted {
                max_entries: self.slots.len(),
            }
        })
    }

    fn release_slot(&mut self, index: usize) {
        self.slots[index] = PoolSlot::Free;
        self.spare.push(index);
    }
}

impl fmt::Debug for Freelist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Freelist")
            .field("total_size", &self.total_size)
            .field("max_entries", &self.slots.len())
            .field("ranges", &self.ranges().collect::<Vec<_>>())
            .finish()
    }
}

/// Iterator over free ranges in address order.
///
/// Created by [`Freelist::ranges`].
pub struct Ranges<'a> {
    list: &'a Freelist,
    cursor: Option<usize>,
}

impl Iterator for Ranges<'_> {
    type Item = FreeRange;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        match self.list.slots.get(index) {
            Some(PoolSlot::Used(node)) => {
                self.cursor = node.next;
                Some(node.range)
            }
            _ => {
                self.cursor = None;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(list: &Freelist) -> Vec<(usize, usize)> {
        list.ranges().map(|r| (r.offset, r.size)).collect()
    }

    #[test]
    fn test_create_covers_whole_arena() {
        let list = Freelist::new(512).unwrap();
        assert_eq!(list.free_space(), 512);
        assert_eq!(ranges(&list), vec![(0, 512)]);
        assert_eq!(list.max_entries(), 512 / NODE_SLOT_COST);
    }

    #[test]
    fn test_create_zero_fails() {
        assert_eq!(
            Freelist::new(0).unwrap_err(),
            AllocError::InvalidArgument("freelist total size must be greater than zero")
        );
    }

    #[test]
    fn test_tiny_arena_gets_pool_floor() {
        let list = Freelist::new(4).unwrap();
        assert_eq!(list.max_entries(), MIN_POOL_ENTRIES);
        assert_eq!(list.free_space(), 4);
    }

    #[test]
    fn test_allocate_and_free_block() {
        let mut list = Freelist::new(512).unwrap();

        let offset = list.allocate_block(64).unwrap();
        assert_eq!(offset, 0);
        assert_eq!(list.free_space(), 448);

        list.free_block(64, offset).unwrap();
        assert_eq!(list.free_space(), 512);
        assert_eq!(ranges(&list), vec![(0, 512)]);
    }

    #[test]
    fn test_exact_match_unlinks_range() {
        let mut list = Freelist::new(128).unwrap();
        assert_eq!(list.allocate_block(128).unwrap(), 0);
        assert_eq!(list.range_count(), 0);
        assert_eq!(list.free_space(), 0);

        let err = list.allocate_block(1).unwrap_err();
        assert_eq!(
            err,
            AllocError::CapacityExhausted {
                requested: 1,
                available: 0
            }
        );

        // Freeing into an empty list makes a new head.
        list.free_block(128, 0).unwrap();
        assert_eq!(ranges(&list), vec![(0, 128)]);
    }

    #[test]
    fn test_zero_size_and_alignment_rejected() {
        let mut list = Freelist::new(128).unwrap();
        assert!(matches!(
            list.allocate_block(0),
            Err(AllocError::InvalidArgument(_))
        ));
        assert!(matches!(
            list.allocate_block_aligned(8, 0),
            Err(AllocError::InvalidArgument(_))
        ));
        assert!(matches!(
            list.free_block(0, 0),
            Err(AllocError::InvalidArgument(_))
        ));
        assert_eq!(ranges(&list), vec![(0, 128)]);
    }

    #[test]
    fn test_coalesce_in_either_order() {
        for reversed in [false, true] {
            let mut list = Freelist::new(256).unwrap();
            let a = list.allocate_block(64).unwrap();
            let b = list.allocate_block(64).unwrap();
            let _c = list.allocate_block(64).unwrap();

            if reversed {
                list.free_block(64, b).unwrap();
                list.free_block(64, a).unwrap();
            } else {
                list.free_block(64, a).unwrap();
                list.free_block(64, b).unwrap();
            }

            assert_eq!(ranges(&list), vec![(0, 128), (192, 64)]);
        }
    }

    #[test]
    fn test_free_between_ranges_merges_both_sides() {
        let mut list = Freelist::new(300).unwrap();
        let a = list.allocate_block(100).unwrap();
        let b = list.allocate_block(100).unwrap();
        let c = list.allocate_block(100).unwrap();
        assert_eq!(list.range_count(), 0);

        list.free_block(100, a).unwrap();
        list.free_block(100, c).unwrap();
        assert_eq!(ranges(&list), vec![(0, 100), (200, 100)]);

        list.free_block(100, b).unwrap();
        assert_eq!(ranges(&list), vec![(0, 300)]);
    }

    #[test]
    fn test_free_after_last_range_appends_tail() {
        let mut list = Freelist::new(1024).unwrap();
        let low = list.allocate_block(100).unwrap();
        let high = list.allocate_block(924).unwrap();
        list.free_block(100, low).unwrap();
        assert_eq!(ranges(&list), vec![(0, 100)]);

        // Span lies past every free range.
        list.free_block(500, high + 424).unwrap();
        assert_eq!(ranges(&list), vec![(0, 100), (524, 500)]);
    }

    #[test]
    fn test_double_free_detected() {
        let mut list = Freelist::new(256).unwrap();
        let a = list.allocate_block(64).unwrap();
        let _b = list.allocate_block(64).unwrap();
        list.free_block(64, a).unwrap();

        assert_eq!(
            list.free_block(64, a).unwrap_err(),
            AllocError::DoubleFree { offset: a }
        );
        // Partial overlap with the tail range.
        assert!(matches!(
            list.free_block(32, 112),
            Err(AllocError::DoubleFree { .. })
        ));
        assert_eq!(ranges(&list), vec![(0, 64), (128, 128)]);
    }

    #[test]
    fn test_free_out_of_range() {
        let mut list = Freelist::new(256).unwrap();
        let _ = list.allocate_block(256).unwrap();

        assert!(matches!(
            list.free_block(64, 224),
            Err(AllocError::OutOfRange { .. })
        ));
        assert!(matches!(
            list.free_block_aligned(8, 4, 8),
            Err(AllocError::OutOfRange { .. })
        ));
        assert_eq!(list.range_count(), 0);
    }

    #[test]
    fn test_aligned_split_owns_padding() {
        let mut list = Freelist::new(256).unwrap();
        let _ = list.allocate_block(3).unwrap();

        let block = list.allocate_block_aligned(16, 8).unwrap();
        assert_eq!(block, AlignedBlock { offset: 8, padding: 5 });
        assert_eq!(ranges(&list), vec![(24, 232)]);

        list.free_block_aligned(16, block.offset, block.padding).unwrap();
        assert_eq!(ranges(&list), vec![(3, 253)]);
    }

    #[test]
    fn test_exact_fit_behind_padding_keeps_micro_range() {
        let mut list = Freelist::new(64).unwrap();
        let _ = list.allocate_block(50).unwrap();
        assert_eq!(ranges(&list), vec![(50, 14)]);

        let block = list.allocate_block_aligned(12, 4).unwrap();
        assert_eq!(block, AlignedBlock { offset: 52, padding: 0 });
        assert_eq!(ranges(&list), vec![(50, 2)]);

        list.free_block(12, block.offset).unwrap();
        assert_eq!(ranges(&list), vec![(50, 14)]);
    }

    #[test]
    fn test_first_fit_skips_small_ranges() {
        let mut list = Freelist::new(1000).unwrap();
        let a = list.allocate_block(10).unwrap();
        let _b = list.allocate_block(10).unwrap();
        list.free_block(10, a).unwrap();

        assert_eq!(list.allocate_block(50).unwrap(), 20);
        assert_eq!(list.allocate_block(10).unwrap(), 0);
    }

    #[test]
    fn test_pool_exhaustion_is_recoverable() {
        let mut list = Freelist::new(80).unwrap();
        let max = list.max_entries();
        for expected in 0..80 {
            assert_eq!(list.allocate_block(1).unwrap(), expected);
        }
        assert_eq!(list.range_count(), 0);

        let mut freed = 0;
        let err = loop {
            match list.free_block(1, freed * 2) {
                Ok(()) => freed += 1,
                Err(err) => break err,
            }
        };

        assert_eq!(err, AllocError::PoolExhausted { max_entries: max });
        assert_eq!(freed, max);
        assert_eq!(list.range_count(), max);
        assert_eq!(list.validate(), Ok(()));

        // Coalescing a neighbour needs no slot and still works.
        list.free_block(1, 1).unwrap();
        assert_eq!(list.range_count(), max - 1);
    }

    #[test]
    fn test_resize_extends_tail_range() {
        let mut list = Freelist::new(256).unwrap();
        let _ = list.allocate_block(64).unwrap();
        list.resize(512).unwrap();

        assert_eq!(list.total_size(), 512);
        assert_eq!(ranges(&list), vec![(64, 448)]);
        assert_eq!(list.max_entries(), 512 / NODE_SLOT_COST);
    }

    #[test]
    fn test_resize_appends_separate_range() {
        let mut list = Freelist::new(256).unwrap();
        let a = list.allocate_block(64).unwrap();
        let _ = list.allocate_block(192).unwrap();
        list.free_block(64, a).unwrap();

        list.resize(300).unwrap();
        assert_eq!(ranges(&list), vec![(0, 64), (256, 44)]);
    }

    #[test]
    fn test_resize_when_fully_allocated() {
        let mut list = Freelist::new(128).unwrap();
        let _ = list.allocate_block(128).unwrap();

        list.resize(192).unwrap();
        assert_eq!(ranges(&list), vec![(128, 64)]);
    }

    #[test]
    fn test_resize_rejects_shrink() {
        let mut list = Freelist::new(256).unwrap();
        assert!(matches!(
            list.resize(128),
            Err(AllocError::InvalidArgument(_))
        ));
        list.resize(256).unwrap();
        assert_eq!(ranges(&list), vec![(0, 256)]);
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut list = Freelist::new(256).unwrap();
        for _ in 0..4 {
            let _ = list.allocate_block(16).unwrap();
        }
        list.free_block(16, 16).unwrap();

        list.clear();
        assert_eq!(ranges(&list), vec![(0, 256)]);
        assert_eq!(list.validate(), Ok(()));
    }

    #[test]
    fn test_largest_free_range() {
        let mut list = Freelist::new(256).unwrap();
        let a = list.allocate_block(100).unwrap();
        let _b = list.allocate_block(10).unwrap();
        list.free_block(100, a).unwrap();

        assert_eq!(list.largest_free_range(), Some(FreeRange::new(110, 146)));
    }

    /// Two ranges, `(0, 64)` then `(128, 384)`, with their slot indices.
    fn two_range_list() -> (Freelist, usize, usize) {
        let mut list = Freelist::new(512).unwrap();
        let a = list.allocate_block(64).unwrap();
        let _b = list.allocate_block(64).unwrap();
        list.free_block(64, a).unwrap();
        assert_eq!(ranges(&list), vec![(0, 64), (128, 384)]);

        let first = list.head.unwrap();
        let second = list.node(first).unwrap().next.unwrap();
        (list, first, second)
    }

    #[test]
    fn test_validate_reports_corruption() {
        let (mut list, first, _) = two_range_list();
        let mut node = list.node(first).unwrap();
        node.range.size = 0;
        list.set_node(first, node);
        assert_eq!(
            list.validate(),
            Err(AllocError::ConsistencyViolation("zero-sized free range"))
        );

        let (mut list, first, _) = two_range_list();
        let mut node = list.node(first).unwrap();
        node.range.size = 128;
        list.set_node(first, node);
        assert_eq!(
            list.validate(),
            Err(AllocError::ConsistencyViolation(
                "adjacent free ranges were not coalesced"
            ))
        );

        let (mut list, first, _) = two_range_list();
        let mut node = list.node(first).unwrap();
        node.range.size = 200;
        list.set_node(first, node);
        assert_eq!(
            list.validate(),
            Err(AllocError::ConsistencyViolation(
                "free ranges overlap or are out of order"
            ))
        );

        let (mut list, first, _) = two_range_list();
        let unused = *list.spare.last().unwrap();
        assert!(matches!(list.slots[unused], PoolSlot::Free));
        let mut node = list.node(first).unwrap();
        node.next = Some(unused);
        list.set_node(first, node);
        assert_eq!(
            list.validate(),
            Err(AllocError::ConsistencyViolation(
                "free-range list links an unused pool slot"
            ))
        );

        let (mut list, _, second) = two_range_list();
        let mut node = list.node(second).unwrap();
        node.range.size = 512;
        list.set_node(second, node);
        assert_eq!(
            list.validate(),
            Err(AllocError::ConsistencyViolation(
                "free range extends past the arena"
            ))
        );
    }
}
