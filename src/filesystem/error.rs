use std::io;
use std::path::{Path, PathBuf};

use snafu::Snafu;

use crate::ext::PathDisplayExt;

/// Why a snapshot could not be captured.
///
/// Always recoverable at the poller level: a failed capture is reported and
/// the previous baseline stays in place.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FilesystemError {
    #[snafu(display("Root {} does not exist", path.display_best_effort()))]
    RootNotFound { path: PathBuf },
    #[snafu(display("Root {} is not a directory", path.display_best_effort()))]
    RootNotDirectory { path: PathBuf },
    #[snafu(display("Permission denied while reading {}", path.display_best_effort()))]
    PermissionDenied { path: PathBuf, source: io::Error },
    #[snafu(display("Failed to read {}", path.display_best_effort()))]
    Unreadable { path: PathBuf, source: io::Error },
}

impl FilesystemError {
    pub fn path(&self) -> &Path {
        match self {
            FilesystemError::RootNotFound { path }
            | FilesystemError::RootNotDirectory { path }
            | FilesystemError::PermissionDenied { path, .. }
            | FilesystemError::Unreadable { path, .. } => path,
        }
    }
}

/// Maps an io error on a non-root path into the taxonomy.
pub(crate) fn classify(path: &Path, source: io::Error) -> FilesystemError {
    let path = path.to_path_buf();
    match source.kind() {
        io::ErrorKind::PermissionDenied => FilesystemError::PermissionDenied { path, source },
        _ => FilesystemError::Unreadable { path, source },
    }
}
