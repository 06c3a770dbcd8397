//! File synchronization.
//!
//! Mirrors the bundle's source tree into the remote file area. A local
//! snapshot remembers what was uploaded so subsequent syncs only replay the
//! difference: modified files are re-put, removed files deleted, and empty
//! remote directories pruned leaves-first.

pub mod diff;
pub mod engine;
pub mod notebook;
pub mod snapshot;

pub use diff::{compute_plan, LocalFile, Put, SyncPlan};
pub use engine::{sync_once, watch_loop, SyncFiles, SyncStats};
pub use snapshot::{FileEntry, Snapshot};
