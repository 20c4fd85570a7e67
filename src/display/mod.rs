//! Display formatting for terminal output
//!
//! Provides tables and detail views for backup sets, run state and the
//! event journal.

pub mod backup;

pub use backup::{format_duration, format_history, format_run_state, format_set_list, format_size};
