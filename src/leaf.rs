//! Adaptive Gapped Leaf: a fixed-capacity slot array with intentional
//! holes, a cached key range, and a learned linear model that narrows
//! lookups to a short exponential search.
//!
//! Keys and values live in two parallel `Vec<Option<_>>`s rather than one
//! `Vec<Slot>` of a tagged enum — the design notes call both
//! representations equally valid; this one keeps the hot key comparisons
//! packed together and lets a slot be cleared with `Option::take` instead
//! of a clone.

use crate::error::{Error, Result};
use crate::model::LinearModel;
use crate::Key;
use tracing::{debug, trace};

/// Capacity growth factor applied when the compaction rate crosses
/// [`COMPACT_RATE_GROWTH_THRESHOLD`].
pub const GROWTH_FACTOR: f64 = 1.5;
/// If more than this fraction of inserts have required a compaction,
/// the leaf is thrashing and grows its capacity.
pub const COMPACT_RATE_GROWTH_THRESHOLD: f64 = 0.3;

/// Result of attempting to place a pair into a leaf's gapped array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The pair was written; the caller does nothing further.
    Placed,
    /// No gap was available anywhere in the array; the caller must
    /// [`AdaptiveGappedLeaf::compact`] (and possibly split) the leaf and
    /// retry.
    Full,
}

/// Where a leaf sits in its own lifecycle, per the state machine in the
/// design notes. Informational — nothing in the crate branches on it
/// directly, since `insert`/`compact`/`split` already encode the
/// transitions, but it's useful for tests and introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafState {
    Empty,
    Growing,
    Modeled,
    Saturated,
}

#[derive(Debug)]
pub struct AdaptiveGappedLeaf<V> {
    keys: Vec<Option<Key>>,
    values: Vec<Option<V>>,
    size: usize,
    next: Option<usize>,
    insert_count: u64,
    compact_count: u64,
    min_key: Option<Key>,
    max_key: Option<Key>,
    model: LinearModel,
    model_trained: bool,
    avg_error: f64,
    model_hit_count: u64,
    model_miss_count: u64,
}

impl<V> AdaptiveGappedLeaf<V> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 4, "leaf capacity must be at least 4");
        Self {
            keys: vec![None; capacity],
            values: (0..capacity).map(|_| None).collect(),
            size: 0,
            next: None,
            insert_count: 0,
            compact_count: 0,
            min_key: None,
            max_key: None,
            model: LinearModel::untrained(),
            model_trained: false,
            avg_error: 0.0,
            model_hit_count: 0,
            model_miss_count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.keys.len()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn min_key(&self) -> Option<Key> {
        self.min_key
    }

    pub fn max_key(&self) -> Option<Key> {
        self.max_key
    }

    pub fn model_trained(&self) -> bool {
        self.model_trained
    }

    pub fn avg_error(&self) -> f64 {
        self.avg_error
    }

    pub fn insert_count(&self) -> u64 {
        self.insert_count
    }

    pub fn compact_count(&self) -> u64 {
        self.compact_count
    }

    pub fn next(&self) -> Option<usize> {
        self.next
    }

    pub fn set_next(&mut self, next: Option<usize>) {
        self.next = next;
    }

    /// Fraction of trained lookups against this leaf that the model
    /// predicted correctly (before falling back to binary search). `None`
    /// until at least one trained lookup has been attempted.
    pub fn model_hit_ratio(&self) -> Option<f64> {
        let total = self.model_hit_count + self.model_miss_count;
        if total == 0 {
            None
        } else {
            Some(self.model_hit_count as f64 / total as f64)
        }
    }

    pub fn state(&self) -> LeafState {
        if self.size == 0 {
            LeafState::Empty
        } else if self.size == self.keys.len() {
            LeafState::Saturated
        } else if self.model_trained {
            LeafState::Modeled
        } else {
            LeafState::Growing
        }
    }

    /// Non-empty `(key, slot_index)` pairs in ascending key order.
    fn occupied_projection(&self) -> Vec<(Key, usize)> {
        self.keys
            .iter()
            .enumerate()
            .filter_map(|(i, k)| k.map(|kk| (kk, i)))
            .collect()
    }

    /// All occupied pairs, in ascending key order. For tests and for the
    /// tree's split bookkeeping.
    pub fn pairs(&self) -> impl Iterator<Item = (Key, &V)> + '_ {
        self.keys
            .iter()
            .zip(self.values.iter())
            .filter_map(|(k, v)| k.zip(v.as_ref()))
    }

    fn write_slot(&mut self, slot: usize, key: Key, value: V) {
        self.keys[slot] = Some(key);
        self.values[slot] = Some(value);
        self.size += 1;
        self.min_key = Some(self.min_key.map_or(key, |m| m.min(key)));
        self.max_key = Some(self.max_key.map_or(key, |m| m.max(key)));
    }

    /// Find the slot a new `key` should land in, per the leaf insert
    /// algorithm's "slot location" step: below the current minimum goes
    /// to slot 0, above the current maximum goes just past the maximum's
    /// slot, and anything in between lands on the first occupied slot
    /// whose key is not less than `key` (so duplicates of an existing key
    /// land immediately after the run of equal keys already present).
    fn locate_target(&self, key: Key) -> usize {
        if self.size == 0 {
            return 0;
        }
        let min = self.min_key.expect("size > 0 implies min_key");
        let max = self.max_key.expect("size > 0 implies max_key");

        if key < min {
            return 0;
        }
        if key > max {
            let max_pos = self
                .keys
                .iter()
                .rposition(|k| k.is_some())
                .expect("size > 0 implies an occupied slot");
            return (max_pos + 1..self.keys.len())
                .find(|&i| self.keys[i].is_none())
                .unwrap_or(max_pos + 1);
        }

        let projection = self.occupied_projection();
        let rank = projection.partition_point(|&(k, _)| k < key);
        projection.get(rank).map(|&(_, slot)| slot).unwrap_or(self.keys.len())
    }

    /// Expand outward from `target` one slot at a time until an empty
    /// slot is found on either side. Ties (an empty slot equidistant on
    /// both sides) favor the right, matching the duplicate-key ordering
    /// `locate_target` already establishes.
    fn nearest_gap(&self, target: usize) -> Option<usize> {
        let len = self.keys.len();
        if target < len && self.keys[target].is_none() {
            return Some(target);
        }
        let mut radius = 1usize;
        loop {
            if radius > len {
                return None;
            }
            let left = target
                .checked_sub(radius)
                .filter(|&l| self.keys[l].is_none());
            let right = target
                .checked_add(radius)
                .filter(|&r| r < len && self.keys[r].is_none());
            match (left, right) {
                (_, Some(r)) => return Some(r),
                (Some(l), None) => return Some(l),
                (None, None) => {
                    let left_exhausted = target.checked_sub(radius).is_none();
                    let right_exhausted = target.checked_add(radius).map_or(true, |r| r >= len);
                    if left_exhausted && right_exhausted {
                        return None;
                    }
                    radius += 1;
                }
            }
        }
    }

    /// Shift the run of slots between `target` and `gap` by one position
    /// toward `gap`, clearing the slot the new pair will be written into.
    /// Returns that cleared slot.
    fn shift_toward_gap(&mut self, target: usize, gap: usize) -> usize {
        if gap > target {
            let mut i = gap;
            while i > target {
                self.keys[i] = self.keys[i - 1].take();
                self.values[i] = self.values[i - 1].take();
                i -= 1;
            }
            target
        } else {
            let mut i = gap;
            while i + 1 < target {
                self.keys[i] = self.keys[i + 1].take();
                self.values[i] = self.values[i + 1].take();
                i += 1;
            }
            target - 1
        }
    }

    /// Insert `(key, value)`. Does not retrain the model — retraining is
    /// scheduled externally by the tree coordinator.
    pub fn insert(&mut self, key: Key, value: V) -> InsertOutcome {
        let target = self.locate_target(key);

        if target < self.keys.len() && self.keys[target].is_none() {
            self.write_slot(target, key, value);
            self.insert_count += 1;
            return InsertOutcome::Placed;
        }

        match self.nearest_gap(target) {
            Some(gap) => {
                let write_at = self.shift_toward_gap(target, gap);
                self.write_slot(write_at, key, value);
                self.insert_count += 1;
                InsertOutcome::Placed
            }
            None => InsertOutcome::Full,
        }
    }

    fn slot_key_eq(&self, idx: usize, key: Key) -> bool {
        idx < self.keys.len() && self.keys[idx] == Some(key)
    }

    /// Probe outward from `predicted` in powers of two on both sides.
    /// Only ever returns a confirmed match — it is allowed to miss a key
    /// that is actually present (a run of gaps can be skipped over by a
    /// geometric step), which is why `lookup` always consults the binary
    /// search fallback when this returns `None`.
    fn exponential_search(&self, predicted: usize, key: Key) -> Option<usize> {
        if self.slot_key_eq(predicted, key) {
            return Some(predicted);
        }
        let len = self.keys.len();
        let mut offset = 1usize;
        loop {
            let mut probed = false;
            if offset <= predicted {
                let idx = predicted - offset;
                if self.slot_key_eq(idx, key) {
                    return Some(idx);
                }
                probed = true;
            }
            let idx = predicted + offset;
            if idx < len {
                if self.slot_key_eq(idx, key) {
                    return Some(idx);
                }
                probed = true;
            }
            if !probed || offset >= len {
                return None;
            }
            offset *= 2;
        }
    }

    fn binary_search_fallback(&self, key: Key) -> Option<usize> {
        let projection = self.occupied_projection();
        projection
            .binary_search_by(|&(k, _)| k.cmp(&key))
            .ok()
            .map(|rank| projection[rank].1)
    }

    /// Find the slot holding `key`, if any, updating the trained-model
    /// hit/miss counters along the way. Returns the slot index plus the
    /// `(hit, miss)` deltas this call applied (each 0 or 1, never both 1)
    /// so a caller such as the tree coordinator can fold them into its
    /// own global counters without re-borrowing the leaf.
    fn locate(&mut self, key: Key) -> (Option<usize>, u64, u64) {
        if self.size == 0 {
            return (None, 0, 0);
        }

        if self.model_trained {
            let min = self.min_key.expect("model_trained implies size >= 2");
            let max = self.max_key.expect("model_trained implies size >= 2");
            if key < min || key > max {
                return (None, 0, 0);
            }

            let predicted = self.model.predict(key, self.keys.len() - 1);
            if let Some(idx) = self.exponential_search(predicted, key) {
                self.model_hit_count += 1;
                return (Some(idx), 1, 0);
            }
            self.model_miss_count += 1;
            return (self.binary_search_fallback(key), 0, 1);
        }

        (self.binary_search_fallback(key), 0, 0)
    }

    /// Look up `key`. When the model is trained, a range check against
    /// `min_key`/`max_key` short-circuits to absent without any probing;
    /// otherwise an exponential search is attempted and, if inconclusive,
    /// the binary search fallback is always consulted.
    pub fn lookup(&mut self, key: Key) -> Option<&V> {
        let (idx, _, _) = self.locate(key);
        idx.and_then(move |i| self.values[i].as_ref())
    }

    /// Same as [`lookup`](Self::lookup), but also returns the `(hit,
    /// miss)` counter deltas this call applied, so a caller holding its
    /// own global counters doesn't need a second, separately-borrowed
    /// call to read them back out.
    pub fn lookup_tracked(&mut self, key: Key) -> (Option<&V>, u64, u64) {
        let (idx, hit, miss) = self.locate(key);
        (idx.and_then(move |i| self.values[i].as_ref()), hit, miss)
    }

    /// Fit the linear model against the current occupied slots. Requires
    /// at least two distinct keys; fewer points, or identical keys (a
    /// zero OLS denominator), leave the leaf untrained.
    pub fn train_model(&mut self) {
        let data = self.occupied_projection();
        match LinearModel::train(&data) {
            Some(model) => {
                self.avg_error = model.avg_error(&data, self.keys.len().saturating_sub(1));
                self.model = model;
                self.model_trained = true;
                self.model_hit_count = 0;
                self.model_miss_count = 0;
                trace!(size = self.size, model = %model, "leaf model trained");
            }
            None => {
                self.model = LinearModel::untrained();
                self.model_trained = false;
                self.avg_error = 0.0;
            }
        }
    }

    /// Slide every occupied slot down to the low end, preserving order,
    /// and zero the tail. Grows capacity by [`GROWTH_FACTOR`] if the
    /// compaction rate has crossed [`COMPACT_RATE_GROWTH_THRESHOLD`], then
    /// retrains the model.
    pub fn compact(&mut self) {
        let mut write = 0;
        for read in 0..self.keys.len() {
            if self.keys[read].is_some() {
                if write != read {
                    self.keys[write] = self.keys[read].take();
                    self.values[write] = self.values[read].take();
                }
                write += 1;
            }
        }
        self.compact_count += 1;

        if self.insert_count > 0 {
            let compact_rate = self.compact_count as f64 / self.insert_count as f64;
            if compact_rate > COMPACT_RATE_GROWTH_THRESHOLD {
                let old_capacity = self.keys.len();
                let new_capacity = ((old_capacity as f64) * GROWTH_FACTOR).floor() as usize;
                self.keys.resize_with(new_capacity, || None);
                self.values.resize_with(new_capacity, || None);
                debug!(old_capacity, new_capacity, "leaf capacity grown");
            }
        }

        self.train_model();
    }

    /// Split a compacted leaf (occupied slots packed into `[0, size)`) at
    /// its median, returning the separator key and a new sibling leaf of
    /// the same capacity holding the upper half. `self` keeps the lower
    /// half. Both halves are retrained. The caller is responsible for
    /// stitching `next` links, since only it knows the sibling's eventual
    /// storage location.
    pub fn split(&mut self) -> Result<(Key, Self)> {
        if self.size < 2 {
            return Err(Error::NotSplittable);
        }
        debug_assert!(
            self.keys[..self.size].iter().all(Option::is_some)
                && self.keys[self.size..].iter().all(Option::is_none),
            "split requires a compacted leaf"
        );

        let capacity = self.keys.len();
        let old_size = self.size;
        let mid = old_size / 2;

        let mut sibling = Self::new(capacity);
        for i in mid..old_size {
            let key = self.keys[i].take().expect("compacted upper half");
            let value = self.values[i].take().expect("compacted upper half");
            sibling.write_slot(i - mid, key, value);
        }

        self.size = mid;
        self.min_key = self.keys[..mid].iter().flatten().next().copied();
        self.max_key = self.keys[..mid].iter().rev().flatten().next().copied();
        self.insert_count = 0;
        self.compact_count = 0;

        let separator = sibling.min_key.expect("sibling holds the upper half");

        self.train_model();
        sibling.train_model();

        Ok((separator, sibling))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_leaf_is_empty() {
        let leaf: AdaptiveGappedLeaf<&'static str> = AdaptiveGappedLeaf::new(8);
        assert_eq!(leaf.size(), 0);
        assert_eq!(leaf.capacity(), 8);
        assert_eq!(leaf.state(), LeafState::Empty);
        assert_eq!(leaf.min_key(), None);
        assert_eq!(leaf.max_key(), None);
    }

    #[test]
    fn sequential_inserts_stay_ordered() {
        let mut leaf = AdaptiveGappedLeaf::new(16);
        for k in [10, 30, 20, 5, 25] {
            assert_eq!(leaf.insert(k, k * 10), InsertOutcome::Placed);
        }
        let keys: Vec<Key> = leaf.pairs().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![5, 10, 20, 25, 30]);
        assert_eq!(leaf.min_key(), Some(5));
        assert_eq!(leaf.max_key(), Some(30));
    }

    #[test]
    fn duplicate_keys_land_after_existing_run() {
        let mut leaf = AdaptiveGappedLeaf::new(16);
        leaf.insert(10, "a");
        leaf.insert(10, "b");
        leaf.insert(10, "c");
        assert_eq!(leaf.size(), 3);
        let keys: Vec<Key> = leaf.pairs().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![10, 10, 10]);
    }

    #[test]
    fn full_leaf_reports_full() {
        let mut leaf = AdaptiveGappedLeaf::new(4);
        for k in 0..4 {
            assert_eq!(leaf.insert(k, k), InsertOutcome::Placed);
        }
        assert_eq!(leaf.insert(99, 99), InsertOutcome::Full);
        assert_eq!(leaf.size(), 4);
        assert_eq!(leaf.state(), LeafState::Saturated);
    }

    #[test]
    fn lookup_before_training_uses_fallback() {
        let mut leaf = AdaptiveGappedLeaf::new(16);
        leaf.insert(10, "ten");
        leaf.insert(20, "twenty");
        assert!(!leaf.model_trained());
        assert_eq!(leaf.lookup(10), Some(&"ten"));
        assert_eq!(leaf.lookup(20), Some(&"twenty"));
        assert_eq!(leaf.lookup(15), None);
    }

    #[test]
    fn lookup_after_training_is_consistent() {
        let mut leaf = AdaptiveGappedLeaf::new(64);
        for k in (0..50).map(|i| i * 3) {
            leaf.insert(k, k);
        }
        leaf.train_model();
        assert!(leaf.model_trained());
        for k in (0..50).map(|i| i * 3) {
            assert_eq!(leaf.lookup(k), Some(&k));
        }
        assert_eq!(leaf.lookup(-1), None);
        assert_eq!(leaf.lookup(1), None);
        assert_eq!(leaf.lookup(10_000), None);
    }

    #[test]
    fn out_of_bounds_short_circuits_without_hit_or_miss() {
        let mut leaf = AdaptiveGappedLeaf::new(16);
        for k in 0..10 {
            leaf.insert(k, k);
        }
        leaf.train_model();
        assert!(leaf.model_trained());
        assert_eq!(leaf.lookup(-5), None);
        assert_eq!(leaf.lookup(500), None);
        assert_eq!(leaf.model_hit_ratio(), None);
    }

    #[test]
    fn compact_packs_and_clears_tail() {
        let mut leaf = AdaptiveGappedLeaf::new(8);
        for k in [10, 20, 30] {
            leaf.insert(k, k);
        }
        leaf.compact();
        assert_eq!(leaf.size(), 3);
        let keys: Vec<Key> = leaf.pairs().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![10, 20, 30]);
        assert!(leaf.model_trained());
    }

    #[test]
    fn compact_grows_capacity_under_thrash() {
        let mut leaf = AdaptiveGappedLeaf::new(4);
        let starting_capacity = leaf.capacity();
        // Insert/compact repeatedly on a small leaf until the compaction
        // rate crosses the growth threshold.
        let mut next_key = 0;
        for _ in 0..6 {
            while leaf.insert(next_key, next_key) == InsertOutcome::Placed {
                next_key += 1;
            }
            leaf.compact();
        }
        assert!(leaf.capacity() > starting_capacity);
    }

    #[test]
    fn split_divides_at_the_median() {
        let mut leaf = AdaptiveGappedLeaf::new(16);
        for k in 0..8 {
            leaf.insert(k * 10, k);
        }
        leaf.compact();
        let (separator, right) = leaf.split().unwrap();

        assert_eq!(separator, 40);
        assert_eq!(leaf.size(), 4);
        assert_eq!(right.size(), 4);
        assert_eq!(leaf.max_key(), Some(30));
        assert_eq!(right.min_key(), Some(40));

        let left_keys: Vec<Key> = leaf.pairs().map(|(k, _)| k).collect();
        let right_keys: Vec<Key> = right.pairs().map(|(k, _)| k).collect();
        assert_eq!(left_keys, vec![0, 10, 20, 30]);
        assert_eq!(right_keys, vec![40, 50, 60, 70]);
    }

    #[test]
    fn split_requires_at_least_two_entries() {
        let mut leaf: AdaptiveGappedLeaf<i64> = AdaptiveGappedLeaf::new(8);
        assert!(matches!(leaf.split(), Err(Error::NotSplittable)));
        leaf.insert(1, 1);
        assert!(matches!(leaf.split(), Err(Error::NotSplittable)));
    }

    #[test]
    fn large_scale_round_trip() {
        let mut leaf = AdaptiveGappedLeaf::new(4096);
        let keys: Vec<Key> = (0..2000).map(|i| (i * 7) % 100_000).collect();
        for &k in &keys {
            leaf.insert(k, k);
        }
        leaf.train_model();
        for &k in keys.iter().step_by(13) {
            assert_eq!(leaf.lookup(k), Some(&k));
        }
    }
}
