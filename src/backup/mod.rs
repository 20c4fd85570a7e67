//! Backup lifecycle
//!
//! - `snapshot`: stage live domains into a scoped directory
//! - `archive`: pack a snapshot into an archive + manifest pair
//! - `verify`: list-only integrity checks
//! - `retention`: count retention and storage-pressure eviction
//! - `restore`: safe restore with preview and safety snapshot
//! - `inventory`: read-only listing and last-run state
//! - `runner`: one complete backup run

pub mod archive;
pub mod inventory;
pub mod restore;
pub mod retention;
pub mod runner;
pub mod snapshot;
pub mod verify;

pub use archive::{ArchiveBuilder, SetManifest};
pub use inventory::{list_sets, Inventory, SetSummary};
pub use restore::{RestoreOptions, RestoreOrchestrator, RestoreOutcome, RestoreReport};
pub use retention::{RetentionManager, RetentionReport, SweepOptions};
pub use runner::{BackupRequest, BackupRunner};
pub use snapshot::{assemble, Snapshot};
pub use verify::{verify_archive, VerifyOutcome};
