//! CowTree - an in-memory copy-on-write multi-version B+Tree.
//!
//! ## Model
//!
//! - **Versions**: every committed transaction becomes an immutable version,
//!   identified by a strictly increasing [`VersionId`] and kept in the
//!   version log until no snapshot pins it and a newer version exists.
//!
//! - **Copy-on-write**: a transaction clones each node on the path it
//!   touches, from the root down, before changing it. Untouched subtrees
//!   are shared by every version that reaches them.
//!
//! - **Single writer**: at most one [`Transaction`] exists at a time. Any
//!   number of [`Snapshot`]s read concurrently with it.
//!
//! - **Reclamation**: nodes are reference counted by their owners. Dropping
//!   the last owner of a version's root tears down whatever only that
//!   version reached.
//!
//! ```text
//!   log:   v1 ─────────── v2
//!           │              │
//!         [R1]           [R2]            R2 cloned from R1
//!         /   \          /   \
//!      [A1]  [B1]     [A1]  [B2]         A1 shared, B2 cloned from B1
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use cowstore_common::config::TreeConfig;
//! use cowstore_storage::cowtree::{CowTree, ReadView};
//!
//! let tree: CowTree<u64, u64> = CowTree::with_config(TreeConfig::for_testing()).unwrap();
//!
//! let mut txn = tree.transaction().unwrap();
//! for i in 0..100 {
//!     txn.assign(i, i * i).unwrap();
//! }
//! let v1 = txn.commit().unwrap();
//!
//! let old = tree.snapshot().unwrap();
//!
//! let mut txn = tree.transaction().unwrap();
//! txn.remove(&7).unwrap();
//! txn.commit().unwrap();
//!
//! assert_eq!(old.version(), v1);
//! assert_eq!(old.find(&7).unwrap(), Some(49));
//! assert_eq!(tree.snapshot().unwrap().find(&7).unwrap(), None);
//!
//! let squares: Vec<u64> = old.scan(3..6).unwrap().into_iter().map(|(_, v)| v).collect();
//! assert_eq!(squares, vec![9, 16, 25]);
//! ```
//!
//! [`VersionId`]: cowstore_common::types::VersionId

mod arena;
mod cursor;
mod diag;
mod error;
mod gc;
mod mutate;
mod node;
mod path;
mod stats;
mod tree;
mod txn;
mod view;

// Re-export main types
pub use arena::{NodeArena, NodeRef};
pub use cursor::{Cursor, Iter, Range};
pub use diag::{version_digest, NodeSummary, TreeShape};
pub use error::{CowTreeError, CowTreeResult};
pub use node::{Node, NodeBody, NodeLayout, RootMetadata};
pub use path::{Direction, Path};
pub use stats::{TreeStats, TreeStatsSnapshot};
pub use tree::CowTree;
pub use txn::{Snapshot, Transaction};
pub use view::ReadView;
