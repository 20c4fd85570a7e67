//! Event journal for the backup engine
//!
//! Records backup runs, deletions, verifications and restores in an
//! append-only JSONL file at `<backup_root>/journal.jsonl`.
//!
//! - `JournalEntry`: one event with timestamp, set, tier and summary.
//! - `Journal`: appends entries and reads them back for `history`.
//!
//! Journal writes never fail the operation they describe.

mod entry;
mod logger;

pub use entry::{EventKind, JournalEntry};
pub use logger::Journal;
