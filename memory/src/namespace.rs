//! Wire namespace: bucketed allocator over an unbounded label space.
//!
//! Every compilation scope owns one `WireAllocator`. Free space is kept as a
//! partition of disjoint, maximal ranges indexed two ways:
//!
//! - by size (`buckets`), so `allocate(n)` can find the smallest range that
//!   fits with an ordered-map range query;
//! - by boundary (`by_start` / `by_end`), so `free` can find the neighbours
//!   of a released range in O(1) and coalesce with them.
//!
//! The address space is unbounded above: the last free range always extends
//! to `UNBOUNDED`, so allocation never fails.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

/// End marker of the free tail of every namespace.
pub const UNBOUNDED: u64 = u64::MAX;

// ============================================================================
// WireRange
// ============================================================================

/// A half-open range `[start, end)` of wire labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WireRange {
    pub start: u64,
    pub end: u64,
}

impl WireRange {
    pub fn new(start: u64, end: u64) -> Self {
        assert!(start <= end, "inverted wire range {start}..{end}");
        Self { start, end }
    }

    /// The range holding exactly one wire.
    pub fn single(wire: u64) -> Self {
        Self::new(wire, wire + 1)
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    #[inline]
    pub fn contains(&self, wire: u64) -> bool {
        self.start <= wire && wire < self.end
    }

    /// Label of the `i`-th wire of the range.
    pub fn nth(&self, i: u64) -> u64 {
        assert!(i < self.len(), "wire index {i} outside range of {} wires", self.len());
        self.start + i
    }

    pub fn iter(&self) -> std::ops::Range<u64> {
        self.start..self.end
    }
}

impl IntoIterator for WireRange {
    type Item = u64;
    type IntoIter = std::ops::Range<u64>;

    fn into_iter(self) -> Self::IntoIter {
        self.start..self.end
    }
}

impl fmt::Display for WireRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

// ============================================================================
// WireAllocator
// ============================================================================

#[derive(Debug, Clone)]
pub struct WireAllocator {
    offset: u64,
    /// High-water mark: one past the greatest label ever handed out.
    top: u64,
    buckets: BTreeMap<u64, BTreeSet<WireRange>>,
    by_start: FxHashMap<u64, WireRange>,
    by_end: FxHashMap<u64, WireRange>,
    /// Labels currently handed out. Used to reject double frees.
    allocated: FxHashSet<u64>,
}

impl WireAllocator {
    /// Create a namespace whose first allocatable label is `offset`.
    pub fn new(offset: u64) -> Self {
        assert!(offset < UNBOUNDED, "namespace offset {offset} leaves no room");
        let mut ns = Self {
            offset,
            top: offset,
            buckets: BTreeMap::new(),
            by_start: FxHashMap::default(),
            by_end: FxHashMap::default(),
            allocated: FxHashSet::default(),
        };
        ns.insert_free(WireRange::new(offset, UNBOUNDED));
        ns
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn top(&self) -> u64 {
        self.top
    }

    /// The span of labels ever touched: `[offset, top)`.
    pub fn range(&self) -> WireRange {
        WireRange::new(self.offset, self.top)
    }

    pub fn allocated_count(&self) -> usize {
        self.allocated.len()
    }

    pub fn is_allocated(&self, wire: u64) -> bool {
        self.allocated.contains(&wire)
    }

    // ========================================================================
    // Allocation
    // ========================================================================

    /// Allocate `n` consecutive wires.
    ///
    /// Takes the smallest free range that fits. A perfect fit is handed out
    /// whole; otherwise the range is split and the remainder goes back to the
    /// pool.
    pub fn allocate(&mut self, n: u64) -> WireRange {
        assert!(n > 0, "cannot allocate an empty wire range");

        let Some(size) = self.buckets.range(n..).next().map(|(size, _)| *size) else {
            panic!("wire namespace exhausted allocating {n} wires");
        };
        let free = self.pop_bucket(size);

        let out = WireRange::new(free.start, free.start + n);
        if size > n {
            self.add_free(WireRange::new(out.end, free.end));
        }

        self.top = self.top.max(out.end);
        self.allocated.extend(out);
        out
    }

    /// Allocate a single wire.
    pub fn allocate_one(&mut self) -> u64 {
        self.allocate(1).start
    }

    // ========================================================================
    // Release
    // ========================================================================

    /// Return a range of wires to the pool, merging it with free neighbours.
    ///
    /// Labels below the namespace offset belong to the enclosing frame
    /// (function outputs and inputs) and are ignored. Every other label must
    /// currently be allocated.
    pub fn free(&mut self, range: WireRange) {
        let start = range.start.max(self.offset);
        if start >= range.end {
            return;
        }
        let range = WireRange::new(start, range.end);
        for wire in range {
            assert!(
                self.allocated.remove(&wire),
                "freeing unallocated wire ${wire} (double free or never allocated)"
            );
        }
        self.add_free(range);
    }

    pub fn free_one(&mut self, wire: u64) {
        self.free(WireRange::single(wire));
    }

    // ========================================================================
    // Free-range bookkeeping
    // ========================================================================

    fn insert_free(&mut self, range: WireRange) {
        debug_assert!(!self.by_start.contains_key(&range.start));
        debug_assert!(!self.by_end.contains_key(&range.end));
        self.by_start.insert(range.start, range);
        self.by_end.insert(range.end, range);
        self.buckets.entry(range.len()).or_default().insert(range);
    }

    fn remove_free(&mut self, range: WireRange) {
        let size = range.len();
        if let Some(bucket) = self.buckets.get_mut(&size) {
            bucket.remove(&range);
            if bucket.is_empty() {
                self.buckets.remove(&size);
            }
        }
        self.by_start.remove(&range.start);
        self.by_end.remove(&range.end);
    }

    /// Add a free range, absorbing any free range that touches either end.
    fn add_free(&mut self, mut range: WireRange) {
        loop {
            if let Some(&next) = self.by_start.get(&range.end) {
                self.remove_free(next);
                range = WireRange::new(range.start, next.end);
                continue;
            }
            if let Some(&prev) = self.by_end.get(&range.start) {
                self.remove_free(prev);
                range = WireRange::new(prev.start, range.end);
                continue;
            }
            break;
        }
        self.insert_free(range);
    }

    /// Pop the lowest range of the given bucket.
    fn pop_bucket(&mut self, size: u64) -> WireRange {
        let range = self
            .buckets
            .get(&size)
            .and_then(|bucket| bucket.first().copied());
        let Some(range) = range else {
            panic!("free-list bucket of size {size} is empty");
        };
        self.remove_free(range);
        range
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// All free ranges ordered by start. The last one is the unbounded tail.
    pub fn free_ranges(&self) -> Vec<WireRange> {
        let mut ranges: Vec<WireRange> = self.by_start.values().copied().collect();
        ranges.sort();
        ranges
    }

    /// Check the partition invariants, panicking on the first violation:
    /// free ranges are disjoint and never adjacent, the three indexes agree,
    /// and free ∪ allocated covers exactly `[offset, top)` below the tail.
    pub fn check_invariants(&self) {
        let ranges = self.free_ranges();

        let bucketed: usize = self.buckets.values().map(BTreeSet::len).sum();
        assert_eq!(bucketed, ranges.len(), "size index out of sync");
        assert_eq!(self.by_end.len(), ranges.len(), "end index out of sync");
        for (size, bucket) in &self.buckets {
            assert!(!bucket.is_empty(), "empty bucket of size {size} kept");
            for range in bucket {
                assert_eq!(range.len(), *size, "range {range} filed under size {size}");
                assert_eq!(self.by_end.get(&range.end), Some(range));
            }
        }

        for pair in ranges.windows(2) {
            assert!(
                pair[0].end < pair[1].start,
                "free ranges {} and {} overlap or touch",
                pair[0],
                pair[1]
            );
        }

        let tail = ranges.last().copied();
        assert!(
            matches!(tail, Some(r) if r.end == UNBOUNDED && r.start <= self.top),
            "free tail missing or above top"
        );

        let mut free_below_top = 0u64;
        for range in &ranges {
            assert!(range.start >= self.offset, "free range {range} below offset");
            let end = range.end.min(self.top);
            if end > range.start {
                free_below_top += end - range.start;
            }
        }
        for wire in &self.allocated {
            assert!(
                self.offset <= *wire && *wire < self.top,
                "allocated wire ${wire} outside namespace"
            );
            assert!(
                !ranges.iter().any(|r| r.contains(*wire)),
                "allocated wire ${wire} is also free"
            );
        }
        assert_eq!(
            free_below_top + self.allocated.len() as u64,
            self.top - self.offset,
            "free and allocated wires do not cover the namespace"
        );
    }
}

impl Default for WireAllocator {
    fn default() -> Self {
        Self::new(0)
    }
}
