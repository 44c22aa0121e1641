//! Shared helpers for the integration tests.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Once;

use cowstore_common::config::TreeConfig;
use cowstore_storage::cowtree::{CowTree, CowTreeResult, ReadView};
use tracing::debug;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Installs a test subscriber once per process.
///
/// Output is off unless `RUST_LOG` asks for it, e.g.
/// `RUST_LOG=cowstore_storage=trace`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_test_writer()
            .try_init();
    });
}

/// Small nodes so that a few dozen keys already build several levels.
pub fn small_config() -> TreeConfig {
    TreeConfig::for_testing().with_node_budget(100_000)
}

/// Creates a tree with [`small_config`].
pub fn small_tree<K: Ord + Clone, V: Clone>() -> CowTreeResult<CowTree<K, V>> {
    init_tracing();
    CowTree::with_config(small_config())
}

/// Assigns every pair in one transaction and commits it.
pub fn commit_pairs<K, V, I>(tree: &CowTree<K, V>, pairs: I) -> CowTreeResult<()>
where
    K: Ord + Clone,
    V: Clone,
    I: IntoIterator<Item = (K, V)>,
{
    let mut txn = tree.transaction()?;
    for (key, value) in pairs {
        txn.assign(key, value)?;
    }
    let version = txn.commit()?;
    debug!(version = %version, "pairs committed");
    Ok(())
}

/// Returns every entry of `view` in key order.
pub fn collect<R: ReadView>(view: &R) -> CowTreeResult<Vec<(R::Key, R::Value)>> {
    view.iter()?.collect()
}

/// Checks `view` against an oracle map: contents, size, point lookups and
/// structure.
pub fn assert_matches_oracle<R>(view: &R, oracle: &BTreeMap<R::Key, R::Value>)
where
    R: ReadView,
    R::Key: Debug,
    R::Value: Debug + PartialEq,
{
    view.validate().unwrap();

    let expected: Vec<(R::Key, R::Value)> =
        oracle.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    assert_eq!(collect(view).unwrap(), expected);
    assert_eq!(view.size().unwrap(), oracle.len() as u64);

    for (key, value) in oracle {
        assert_eq!(view.find(key).unwrap().as_ref(), Some(value), "key {key:?}");
    }
}
