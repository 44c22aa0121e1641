//! Concrete tree scenarios.
//!
//! Each test builds a small tree with eight-entry nodes and checks one
//! observable behavior end to end through the public API.

use cowstore_storage::cowtree::{CowTree, CowTreeError, ReadView};
use cowstore_test::utils::{collect, commit_pairs, small_tree};

#[test]
fn test_iterate_committed_snapshot_in_order() {
    let tree: CowTree<u32, u32> = small_tree().unwrap();
    commit_pairs(&tree, (0..20).map(|k| (k, k))).unwrap();

    let snapshot = tree.snapshot().unwrap();
    let keys: Vec<u32> = collect(&snapshot)
        .unwrap()
        .into_iter()
        .map(|(k, _)| k)
        .collect();

    assert_eq!(keys, (0..20).collect::<Vec<_>>());
    assert_eq!(snapshot.size().unwrap(), 20);
}

#[test]
fn test_old_snapshot_keeps_removed_key() {
    let tree: CowTree<u32, u32> = small_tree().unwrap();
    commit_pairs(&tree, [(1, 1), (2, 2), (3, 3)]).unwrap();
    let a = tree.snapshot().unwrap();

    let mut txn = tree.transaction().unwrap();
    assert!(txn.remove(&2).unwrap());
    txn.commit().unwrap();
    let b = tree.snapshot().unwrap();

    assert_eq!(a.find(&2).unwrap(), Some(2));
    assert_eq!(b.find(&2).unwrap(), None);
    assert_eq!(a.size().unwrap(), 3);
    assert_eq!(b.size().unwrap(), 2);
}

#[test]
fn test_ninth_insert_splits_root_leaf() {
    let tree: CowTree<u32, u32> = small_tree().unwrap();
    let mut txn = tree.transaction().unwrap();
    for key in 0..8 {
        txn.assign(key, key).unwrap();
    }
    assert_eq!(txn.validate().unwrap().height, 1);

    txn.assign(8, 8).unwrap();

    let shape = txn.validate().unwrap();
    assert_eq!(shape.height, 2);

    let leaves = txn.leaves().unwrap();
    assert_eq!(leaves.len(), 2);
    assert!(leaves[0].keys.last() < leaves[1].keys.first());

    let covered: Vec<u32> = leaves.iter().flat_map(|leaf| leaf.keys.clone()).collect();
    assert_eq!(covered, (0..9).collect::<Vec<_>>());
}

#[test]
fn test_merge_frees_exactly_one_node() {
    let tree: CowTree<u32, u32> = small_tree().unwrap();
    let mut txn = tree.transaction().unwrap();
    for key in 0..20 {
        txn.assign(key, key).unwrap();
    }
    assert_eq!(txn.validate().unwrap().height, 2);

    // Leaves hold [0..4) [4..8) [8..12) [12..16) [16..20); dropping key 0
    // leaves three entries beside a sibling of four.
    let leaves_before = txn.leaves().unwrap().len();
    let nodes_before = tree.node_count();

    assert!(txn.remove(&0).unwrap());

    assert_eq!(tree.node_count(), nodes_before - 1);
    assert_eq!(txn.leaves().unwrap().len(), leaves_before - 1);
    txn.validate().unwrap();
    for key in 1..20 {
        assert_eq!(txn.find(&key).unwrap(), Some(key));
    }
}

#[test]
fn test_second_transaction_is_rejected() {
    let tree: CowTree<u32, u32> = small_tree().unwrap();
    let mut t1 = tree.transaction().unwrap();
    t1.assign(5, 5).unwrap();

    let err = tree.transaction().unwrap_err();
    assert!(matches!(err, CowTreeError::AlreadyActiveTransaction));

    // The outstanding transaction is unaffected.
    assert_eq!(t1.find(&5).unwrap(), Some(5));
    t1.commit().unwrap();
}

#[test]
fn test_write_clones_leaf_shared_with_snapshot() {
    let tree: CowTree<u32, u32> = small_tree().unwrap();
    commit_pairs(&tree, (0..20).map(|k| (k, k))).unwrap();
    let snapshot = tree.snapshot().unwrap();
    let before = snapshot.leaf_summary(&3).unwrap();

    let mut t2 = tree.transaction().unwrap();
    t2.assign(3, 300).unwrap();

    let shared = snapshot.leaf_summary(&3).unwrap();
    let private = t2.leaf_summary(&3).unwrap();

    assert_eq!(shared.node, before.node);
    assert_eq!(shared.keys, before.keys);
    assert_eq!(shared.version, snapshot.version());

    assert_ne!(private.node, shared.node);
    assert_ne!(private.id, shared.id);
    assert_eq!(private.version, t2.version());
    assert_eq!(private.keys, shared.keys);

    assert_eq!(snapshot.find(&3).unwrap(), Some(3));
    assert_eq!(t2.find(&3).unwrap(), Some(300));
}
