//! cowstore Performance Benchmarks
//!
//! This crate contains benchmarks for the copy-on-write tree:
//! - Transactional inserts, sequential and random
//! - Point lookups and range scans through snapshots
//! - Commit and snapshot cleanup cycles
//!
//! Run benchmarks with:
//! ```bash
//! cargo bench -p cowstore-bench
//! ```

pub mod utils;
