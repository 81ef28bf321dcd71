//! Persistence for the monitors' log files.
//!
//! Each monitor owns one tab-separated text file: a header line plus one line
//! per day, where only the last line is mutable until day rollover. The
//! store keeps an in-memory snapshot of the record lines and rewrites the
//! file atomically on every commit, so a crash never leaves a truncated
//! file behind.

pub mod text;

use std::path::PathBuf;

pub use text::TextLogStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("log file {path} is locked by another running instance")]
    Locked { path: PathBuf },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
