//! Tree Coordinator: holds the root, the leaf arena, the branching
//! order, and the global counters. Descends from root to leaf using
//! separators, delegates leaf-local work to the [`AdaptiveGappedLeaf`],
//! and on overflow compacts, splits, and promotes until the root is
//! stable again.

use crate::leaf::{AdaptiveGappedLeaf, InsertOutcome as LeafOutcome};
use crate::node::{find_leaf_index, leftmost_leaf_index, DescendOutcome, InternalRoutingNode, Node};
use crate::Key;
use std::marker::PhantomData;
use tracing::{instrument, warn};

/// Unconditional retrain cadence, in insertions against a single leaf.
const RETRAIN_PERIOD: u64 = 20;
/// Conditional retrain cadence: every this many insertions, retrain if
/// the leaf's hit ratio has dropped below [`ACCURACY_THRESHOLD`].
const ACCURACY_CHECK_PERIOD: u64 = 50;
const ACCURACY_THRESHOLD: f64 = 0.70;

/// Read-only snapshot of the tree's aggregate health, computed by
/// walking the leaf chain from the leftmost leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    pub total_capacity: usize,
    pub total_filled: usize,
    pub utilization_percent: f64,
    pub total_compacts: u64,
    pub leaves_with_models: usize,
    pub leaf_count: usize,
    pub avg_model_accuracy: f64,
    pub global_model_accuracy: f64,
}

/// An in-memory ordered key-value index: a B+-tree whose leaves are
/// gapped arrays with a learned linear positional model.
pub struct Tree<V> {
    root: Node<V>,
    leaves: Vec<AdaptiveGappedLeaf<V>>,
    order: usize,
    shift_count: u64,
    model_hits: u64,
    model_misses: u64,
}

impl<V> Tree<V> {
    /// Construct an empty tree. `order` bounds separators per interior
    /// node and is also the packed-size threshold that forces a leaf
    /// split after compaction; it must be at least 3.
    /// `initial_leaf_capacity` sizes every newly created leaf and must be
    /// at least 4.
    pub fn new(order: usize, initial_leaf_capacity: usize) -> Self {
        assert!(order >= 3, "order must be at least 3");
        assert!(initial_leaf_capacity >= 4, "initial_leaf_capacity must be at least 4");
        Self {
            root: Node::Leaf(0),
            leaves: vec![AdaptiveGappedLeaf::new(initial_leaf_capacity)],
            order,
            shift_count: 0,
            model_hits: 0,
            model_misses: 0,
        }
    }

    /// Insert `(key, value)`. On equal keys, the new pair is inserted as
    /// a distinct entry rather than overwriting — see the crate's
    /// duplicate-key documentation.
    #[instrument(skip(self, value))]
    pub fn insert(&mut self, key: Key, value: V)
    where
        V: Clone,
    {
        let outcome = descend_insert(&mut self.root, &mut self.leaves, self.order, &mut self.shift_count, key, value);
        if let DescendOutcome::Promoted { separator, right } = outcome {
            let old_root = std::mem::replace(&mut self.root, Node::Leaf(0));
            self.root = Node::Internal(Box::new(InternalRoutingNode {
                separators: vec![separator],
                children: vec![old_root, right],
                _marker: PhantomData,
            }));
        }
    }

    /// Look up `key`. Never mutates the key-value mapping, but does
    /// update the tree's global model-accuracy bookkeeping.
    pub fn search(&mut self, key: Key) -> Option<&V> {
        let leaf_idx = find_leaf_index(&self.root, key);
        let (result, hit_delta, miss_delta) = self.leaves[leaf_idx].lookup_tracked(key);
        self.model_hits += hit_delta;
        self.model_misses += miss_delta;
        result
    }

    /// Read-only aggregate statistics, computed by walking the leaf
    /// chain from the leftmost leaf. Does not mutate observable state.
    pub fn stats(&self) -> Stats {
        let mut total_capacity = 0;
        let mut total_filled = 0;
        let mut total_compacts = 0;
        let mut leaves_with_models = 0;
        let mut leaf_count = 0;
        let mut hit_ratio_sum = 0.0;

        let mut cursor = Some(leftmost_leaf_index(&self.root));
        let mut visited = 0;
        while let Some(idx) = cursor {
            let leaf = &self.leaves[idx];
            total_capacity += leaf.capacity();
            total_filled += leaf.size();
            total_compacts += leaf.compact_count();
            leaf_count += 1;
            if leaf.model_trained() {
                leaves_with_models += 1;
                if let Some(ratio) = leaf.model_hit_ratio() {
                    hit_ratio_sum += ratio;
                }
            }

            visited += 1;
            assert!(visited <= self.leaves.len(), "leaf chain does not terminate");
            cursor = leaf.next();
        }

        let utilization_percent = if total_capacity == 0 {
            0.0
        } else {
            total_filled as f64 / total_capacity as f64 * 100.0
        };
        let avg_model_accuracy = if leaves_with_models == 0 {
            0.0
        } else {
            hit_ratio_sum / leaves_with_models as f64 * 100.0
        };
        let global_model_accuracy = if self.model_hits + self.model_misses == 0 {
            0.0
        } else {
            self.model_hits as f64 / (self.model_hits + self.model_misses) as f64 * 100.0
        };

        Stats {
            total_capacity,
            total_filled,
            utilization_percent,
            total_compacts,
            leaves_with_models,
            leaf_count,
            avg_model_accuracy,
            global_model_accuracy,
        }
    }
}

fn maybe_retrain<V>(leaf: &mut AdaptiveGappedLeaf<V>) {
    let n = leaf.insert_count();
    if n == 0 {
        return;
    }
    if n % RETRAIN_PERIOD == 0 {
        leaf.train_model();
        return;
    }
    if n % ACCURACY_CHECK_PERIOD == 0 {
        let below_threshold = leaf.model_hit_ratio().map_or(true, |ratio| ratio < ACCURACY_THRESHOLD);
        if below_threshold {
            leaf.train_model();
        }
    }
}

/// Recursive descent-and-insert. Mirrors the coordinator's algorithm:
/// on a leaf overflow, compact, split if the packed size still exceeds
/// `order`, and bubble any promoted separator back up through the
/// interior nodes on the way out of the recursion — ordinary call-stack
/// recursion standing in for the explicit path stack, bounded by the
/// same tree height either way.
fn descend_insert<V>(
    node: &mut Node<V>,
    leaves: &mut Vec<AdaptiveGappedLeaf<V>>,
    order: usize,
    shift_count: &mut u64,
    key: Key,
    value: V,
) -> DescendOutcome<V>
where
    V: Clone,
{
    match node {
        Node::Leaf(idx) => insert_into_leaf(*idx, leaves, order, shift_count, key, value),
        Node::Internal(internal) => {
            let child_index = internal.route(key);
            let outcome = descend_insert(&mut internal.children[child_index], leaves, order, shift_count, key, value);
            match outcome {
                DescendOutcome::Done => DescendOutcome::Done,
                DescendOutcome::Promoted { separator, right } => {
                    internal.absorb_promotion(child_index, separator, right);
                    if internal.separators.len() > order {
                        let (separator, right) = internal.split();
                        DescendOutcome::Promoted {
                            separator,
                            right: Node::Internal(Box::new(right)),
                        }
                    } else {
                        DescendOutcome::Done
                    }
                }
            }
        }
    }
}

fn insert_into_leaf<V>(
    idx: usize,
    leaves: &mut Vec<AdaptiveGappedLeaf<V>>,
    order: usize,
    shift_count: &mut u64,
    key: Key,
    value: V,
) -> DescendOutcome<V>
where
    V: Clone,
{
    match leaves[idx].insert(key, value.clone()) {
        LeafOutcome::Placed => {
            maybe_retrain(&mut leaves[idx]);
            DescendOutcome::Done
        }
        LeafOutcome::Full => {
            leaves[idx].compact();
            *shift_count += leaves[idx].size() as u64;

            if leaves[idx].size() > order {
                let (separator, mut sibling) = leaves[idx]
                    .split()
                    .expect("a leaf packed beyond order is always splittable");
                sibling.set_next(leaves[idx].next());
                let sibling_idx = leaves.len();
                leaves[idx].set_next(Some(sibling_idx));
                leaves.push(sibling);

                let target = if key < separator { idx } else { sibling_idx };
                let placed = leaves[target].insert(key, value);
                if placed == LeafOutcome::Full {
                    warn!(leaf = target, "freshly split leaf reported full");
                }
                maybe_retrain(&mut leaves[target]);

                DescendOutcome::Promoted {
                    separator,
                    right: Node::Leaf(sibling_idx),
                }
            } else {
                let placed = leaves[idx].insert(key, value);
                if placed == LeafOutcome::Full {
                    warn!(leaf = idx, "compacted leaf reported full");
                }
                maybe_retrain(&mut leaves[idx]);
                DescendOutcome::Done
            }
        }
    }
}
