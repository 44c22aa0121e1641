//! Benchmark utilities and helpers.

use cowstore_common::config::TreeConfig;
use cowstore_storage::cowtree::{CowTree, CowTreeResult};
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Generates random string data for benchmarks.
pub fn random_string(rng: &mut StdRng, len: usize) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generates a batch of random key-value pairs with distinct keys.
pub fn generate_kv_pairs(count: usize, value_size: usize) -> Vec<(u64, String)> {
    let mut rng = StdRng::seed_from_u64(42);
    let mut keys: Vec<u64> = (0..count as u64).map(|k| k * 7 + 3).collect();
    keys.shuffle(&mut rng);

    keys.into_iter()
        .map(|key| (key, random_string(&mut rng, value_size)))
        .collect()
}

/// Generates sequential keys for benchmarks.
pub fn generate_sequential_pairs(count: usize, value_size: usize) -> Vec<(u64, String)> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..count as u64)
        .map(|key| (key, random_string(&mut rng, value_size)))
        .collect()
}

/// Builds a tree holding `pairs` as a single committed version.
pub fn populated_tree(
    config: TreeConfig,
    pairs: &[(u64, String)],
) -> CowTreeResult<CowTree<u64, String>> {
    let tree = CowTree::with_config(config)?;
    {
        let mut txn = tree.transaction()?;
        for (key, value) in pairs {
            txn.assign(*key, value.clone())?;
        }
        txn.commit()?;
    }
    Ok(tree)
}
