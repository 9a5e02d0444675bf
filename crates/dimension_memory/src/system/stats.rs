//! Per-tag allocation statistics and the usage report.

use std::fmt::Write;

use super::MemoryTag;

const KIB: usize = 1024;
const MIB: usize = 1024 * KIB;
const GIB: usize = 1024 * MIB;

/// Snapshot of what the memory system has handed out.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Bytes currently allocated, all tags.
    pub total_allocated: usize,
    /// Bytes currently allocated per tag, indexed by [`MemoryTag::index`].
    pub tagged_allocations: [usize; MemoryTag::COUNT],
    /// Allocations served since startup.
    pub allocation_count: usize,
    /// Allocations served by the platform heap instead of the arena.
    pub fallback_count: usize,
}

impl MemoryStats {
    /// Bytes currently allocated under `tag`.
    #[inline]
    #[must_use]
    pub const fn tagged(&self, tag: MemoryTag) -> usize {
        self.tagged_allocations[tag.index()]
    }

    pub(crate) fn record_allocate(&mut self, size: usize, tag: MemoryTag, fallback: bool) {
        self.total_allocated += size;
        self.tagged_allocations[tag.index()] += size;
        self.allocation_count += 1;
        if fallback {
            self.fallback_count += 1;
        }
    }

    pub(crate) fn record_free(&mut self, size: usize, tag: MemoryTag) {
        self.total_allocated = self.total_allocated.saturating_sub(size);
        let tagged = &mut self.tagged_allocations[tag.index()];
        *tagged = tagged.saturating_sub(size);
    }

    /// Human readable per-tag usage, one line per tag.
    #[must_use]
    pub fn report(&self) -> String {
        let mut out = String::from("System memory use (tagged):\n");
        for tag in MemoryTag::ALL {
            let (amount, unit) = human_size(self.tagged(tag));
            // Writing into a String cannot fail.
            let _ = writeln!(out, "  {tag}: {amount:.2}{unit}");
        }
        out
    }
}

/// Splits a byte count into a value and its binary unit.
#[allow(clippy::cast_precision_loss)]
fn human_size(bytes: usize) -> (f64, &'static str) {
    if bytes >= GIB {
        (bytes as f64 / GIB as f64, "GiB")
    } else if bytes >= MIB {
        (bytes as f64 / MIB as f64, "MiB")
    } else if bytes >= KIB {
        (bytes as f64 / KIB as f64, "KiB")
    } else {
        (bytes as f64, "B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_release() {
        let mut stats = MemoryStats::default();
        stats.record_allocate(100, MemoryTag::Texture, false);
        stats.record_allocate(50, MemoryTag::String, true);

        assert_eq!(stats.total_allocated, 150);
        assert_eq!(stats.tagged(MemoryTag::Texture), 100);
        assert_eq!(stats.allocation_count, 2);
        assert_eq!(stats.fallback_count, 1);

        stats.record_free(100, MemoryTag::Texture);
        assert_eq!(stats.total_allocated, 50);
        assert_eq!(stats.tagged(MemoryTag::Texture), 0);
    }

    #[test]
    fn test_human_size_units() {
        assert_eq!(human_size(512), (512.0, "B"));
        assert_eq!(human_size(1536), (1.5, "KiB"));
        assert_eq!(human_size(3 * MIB), (3.0, "MiB"));
        assert_eq!(human_size(2 * GIB), (2.0, "GiB"));
    }

    #[test]
    fn test_report_lists_every_tag() {
        let mut stats = MemoryStats::default();
        stats.record_allocate(2048, MemoryTag::Renderer, false);

        let report = stats.report();
        assert_eq!(report.lines().count(), MemoryTag::COUNT + 1);
        assert!(report.contains("  Renderer: 2.00KiB"));
        assert!(report.contains("  Scene: 0.00B"));
    }
}
