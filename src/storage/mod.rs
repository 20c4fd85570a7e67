//! Storage layer for the backup engine
//!
//! Provides atomic file writes, the `key=value` record format, tree copies,
//! the run lock and filesystem usage readings.

pub mod disk;
pub mod file_io;
pub mod lock;
pub mod tree;

pub use disk::{DiskUsage, FsProbe, StorageProbe};
pub use file_io::write_atomic;
pub use lock::RunLock;
pub use tree::{copy_tree, remove_path};
