//! Black-box scenario coverage, exercised entirely through the public
//! `Tree` API the way an external consumer would use it.

use adagel::Tree;

#[test]
fn s1_basic_inserts_and_lookups() {
    let mut tree: Tree<&'static str> = Tree::new(4, 16);
    tree.insert(10, "A");
    tree.insert(30, "C");
    tree.insert(20, "B");
    tree.insert(5, "Z");

    assert_eq!(tree.search(20), Some(&"B"));
    assert_eq!(tree.search(5), Some(&"Z"));
    assert_eq!(tree.search(99), None);
}

#[test]
fn s2_small_leaf_forces_one_split() {
    let mut tree: Tree<&'static str> = Tree::new(3, 4);
    for (k, v) in [(10, "A"), (20, "B"), (30, "C"), (40, "D"), (50, "E")] {
        tree.insert(k, v);
    }
    assert_eq!(tree.search(20), Some(&"B"));
    assert_eq!(tree.search(40), Some(&"D"));
    assert_eq!(tree.search(50), Some(&"E"));
}

#[test]
fn s3_cascading_splits_increase_height() {
    let mut tree: Tree<String> = Tree::new(3, 4);
    for k in (1..=10).map(|i| i * 10) {
        tree.insert(k, format!("Val_{k}"));
    }
    assert_eq!(tree.search(30), Some(&"Val_30".to_string()));
    assert_eq!(tree.search(70), Some(&"Val_70".to_string()));
    assert_eq!(tree.search(100), Some(&"Val_100".to_string()));
    assert_eq!(tree.search(999), None);
}

#[test]
fn s6_duplicate_key_insert_is_deterministic_not_overwrite() {
    let mut tree: Tree<&'static str> = Tree::new(4, 16);
    tree.insert(10, "first");
    tree.insert(10, "second");
    let a = tree.search(10).copied();
    let b = tree.search(10).copied();
    assert_eq!(a, b, "repeated search on a duplicated key must be deterministic");
    assert!(a == Some("first") || a == Some("second"));
}

#[test]
fn boundary_insert_into_empty_tree() {
    let mut tree: Tree<&'static str> = Tree::new(4, 16);
    tree.insert(42, "only");
    assert_eq!(tree.search(42), Some(&"only"));
    let stats = tree.stats();
    assert_eq!(stats.leaf_count, 1);
    assert_eq!(stats.total_filled, 1);
}

#[test]
fn boundary_search_below_min_key_is_absent() {
    let mut tree: Tree<i64> = Tree::new(4, 16);
    for k in (0..40).map(|i| i * 5) {
        tree.insert(k, k);
    }
    assert_eq!(tree.search(-1000), None);
}

#[test]
fn stats_are_idempotent_across_calls() {
    let mut tree: Tree<i64> = Tree::new(4, 16);
    for k in 0..300 {
        tree.insert(k, k * 2);
    }
    let first = tree.stats();
    let second = tree.stats();
    assert_eq!(first, second);
    assert!(first.utilization_percent <= 100.0);
    assert!(first.total_filled <= first.total_capacity);
    assert_eq!(first.total_filled, 300);
}
