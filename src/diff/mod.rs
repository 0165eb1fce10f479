//! Turning two snapshots into an ordered list of changes.

mod differ;

use std::path::PathBuf;

use derive_more::Display;

pub use differ::{diff, diff_with};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum DiffKind {
    #[display("CREATED")]
    Created,
    #[display("MODIFIED")]
    Modified,
    #[display("DELETED")]
    Deleted,
}

/// A single change, addressed by its path relative to the snapshot root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
#[display("{kind} {}", path.display())]
pub struct DiffEvent {
    pub path: PathBuf,
    pub kind: DiffKind,
}

impl DiffEvent {
    pub fn new(path: impl Into<PathBuf>, kind: DiffKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::new(path, DiffKind::Created)
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(path, DiffKind::Modified)
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self::new(path, DiffKind::Deleted)
    }
}
