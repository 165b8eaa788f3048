use std::{
    collections::{BTreeMap, btree_map},
    ops::{Range, RangeInclusive},
};

/// A set of `u64` stored as sorted, non-overlapping, non-adjacent half-open ranges.
///
/// Used for received packet numbers, received stream offsets and
/// acknowledged send buffer offsets.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RangeSet(BTreeMap<u64, u64>);

impl RangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of disjoint ranges.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, value: u64) -> bool {
        self.0
            .range(..=value)
            .next_back()
            .is_some_and(|(_, &end)| value < end)
    }

    /// Whether the whole `range` is covered.
    pub fn contains_range(&self, range: &Range<u64>) -> bool {
        if range.is_empty() {
            return true;
        }
        self.0
            .range(..=range.start)
            .next_back()
            .is_some_and(|(_, &end)| range.end <= end)
    }

    pub fn min(&self) -> Option<u64> {
        self.0.keys().next().copied()
    }

    pub fn max(&self) -> Option<u64> {
        self.0.values().next_back().map(|end| end - 1)
    }

    /// Insert a single value, returning whether it was absent.
    pub fn insert_one(&mut self, value: u64) -> bool {
        self.insert(value..value + 1)
    }

    /// Insert `range`, merging with overlapping or adjacent ranges.
    ///
    /// Returns whether any value of `range` was absent.
    pub fn insert(&mut self, range: Range<u64>) -> bool {
        if range.is_empty() || self.contains_range(&range) {
            return false;
        }
        let mut start = range.start;
        let mut end = range.end;
        if let Some((&prev_start, &prev_end)) = self.0.range(..=start).next_back() {
            if prev_end >= start {
                start = prev_start;
                end = end.max(prev_end);
            }
        }
        let covered = self
            .0
            .range(start..=end)
            .map(|(&s, &e)| (s, e))
            .collect::<Vec<_>>();
        for (s, e) in covered {
            self.0.remove(&s);
            end = end.max(e);
        }
        self.0.insert(start, end);
        true
    }

    /// Remove `range` from the set, splitting ranges as needed.
    pub fn remove(&mut self, range: Range<u64>) {
        if range.is_empty() {
            return;
        }
        if let Some((&prev_start, &prev_end)) = self.0.range(..range.start).next_back() {
            if prev_end > range.start {
                self.0.insert(prev_start, range.start);
                if prev_end > range.end {
                    self.0.insert(range.end, prev_end);
                }
            }
        }
        let covered = self
            .0
            .range(range.start..range.end)
            .map(|(&s, &e)| (s, e))
            .collect::<Vec<_>>();
        for (s, e) in covered {
            self.0.remove(&s);
            if e > range.end {
                self.0.insert(range.end, e);
            }
        }
    }

    /// Drop every value below `bound`.
    pub fn remove_below(&mut self, bound: u64) {
        self.remove(0..bound);
    }

    /// Drop the oldest ranges until at most `n` are left.
    pub fn truncate_oldest(&mut self, n: usize) {
        while self.0.len() > n {
            self.0.pop_first();
        }
    }

    /// Iterate ranges from lowest to highest.
    pub fn iter(&self) -> Iter<'_> {
        Iter(self.0.iter())
    }

    /// Iterate ranges newest first, as inclusive ranges.
    pub fn iter_newest_first(&self) -> impl Iterator<Item = RangeInclusive<u64>> + '_ {
        self.0.iter().rev().map(|(&s, &e)| s..=e - 1)
    }

    /// Iterate the sub-ranges of `range` that are not in the set.
    pub fn gaps(&self, range: Range<u64>) -> impl Iterator<Item = Range<u64>> + '_ {
        let (start, end) = (range.start, range.end);
        let mut cursor = start;
        let mut covered = self
            .0
            .range(..end)
            .filter(move |(_, e)| **e > start)
            .map(|(&s, &e)| (s, e));
        std::iter::from_fn(move || {
            while cursor < end {
                match covered.next() {
                    Some((s, e)) if s > cursor => {
                        let gap = cursor..s.min(end);
                        cursor = e;
                        return Some(gap);
                    }
                    Some((_, e)) => cursor = cursor.max(e),
                    None => {
                        let gap = cursor..end;
                        cursor = end;
                        return Some(gap);
                    }
                }
            }
            None
        })
    }
}

/// Iterator over the ranges of a [`RangeSet`], lowest first.
pub struct Iter<'a>(btree_map::Iter<'a, u64, u64>);

impl Iterator for Iter<'_> {
    type Item = Range<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(&s, &e)| s..e)
    }
}

impl DoubleEndedIterator for Iter<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.0.next_back().map(|(&s, &e)| s..e)
    }
}

#[cfg(test)]
mod tests {
    use super::RangeSet;

    #[test]
    fn test_insert_merges() {
        let mut set = RangeSet::new();
        assert!(set.insert(10..20));
        assert!(set.insert(30..40));
        assert!(!set.insert(12..18));
        assert_eq!(set.len(), 2);
        assert!(set.insert(20..30));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![10..40]);
        assert!(set.insert(5..50));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![5..50]);
        assert!(set.insert_one(50));
        assert_eq!(set.max(), Some(50));
        assert_eq!(set.min(), Some(5));
    }

    #[test]
    fn test_contains() {
        let mut set = RangeSet::new();
        set.insert(0..10);
        set.insert(20..30);
        assert!(set.contains(0));
        assert!(set.contains(9));
        assert!(!set.contains(10));
        assert!(set.contains_range(&(20..30)));
        assert!(!set.contains_range(&(5..25)));
    }

    #[test]
    fn test_remove_splits() {
        let mut set = RangeSet::new();
        set.insert(0..100);
        set.remove(10..20);
        set.remove(90..120);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0..10, 20..90]);
        set.remove_below(50);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![50..90]);
    }

    #[test]
    fn test_newest_first_and_truncate() {
        let mut set = RangeSet::new();
        for pn in [0, 1, 2, 5, 6, 9] {
            set.insert_one(pn);
        }
        assert_eq!(
            set.iter_newest_first().collect::<Vec<_>>(),
            vec![9..=9, 5..=6, 0..=2]
        );
        set.truncate_oldest(2);
        assert_eq!(set.iter_newest_first().collect::<Vec<_>>(), vec![9..=9, 5..=6]);
    }

    #[test]
    fn test_gaps() {
        let mut set = RangeSet::new();
        set.insert(10..20);
        set.insert(30..40);
        assert_eq!(set.gaps(0..50).collect::<Vec<_>>(), vec![0..10, 20..30, 40..50]);
        assert_eq!(set.gaps(15..35).collect::<Vec<_>>(), vec![20..30]);
        assert_eq!(set.gaps(12..18).count(), 0);
        assert_eq!(RangeSet::new().gaps(3..7).collect::<Vec<_>>(), vec![3..7]);
    }
}
