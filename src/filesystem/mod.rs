//! The capability through which snapshots observe a directory tree.
//!
//! Everything the snapshot builder knows about the world comes through
//! [`Filesystem`]: listing a directory and stating a single path. Any backend
//! that can answer those two questions works, whether it is the real OS
//! ([`OsFilesystem`]) or an in-memory double ([`MemoryFilesystem`]).

mod error;
mod memory;
mod os;

use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

pub use error::FilesystemError;
pub(crate) use error::classify;
pub use memory::MemoryFilesystem;
pub use os::OsFilesystem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMetadata {
    pub kind: EntryKind,
    pub modified: SystemTime,
}

impl EntryMetadata {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// One entry returned by [`Filesystem::list`]. The name is kept exactly as
/// the backend reported it, which need not be valid UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: OsString,
    pub metadata: EntryMetadata,
}

pub trait Filesystem {
    /// Stats a single path. Used for the snapshot root.
    fn stat(&self, path: &Path) -> io::Result<EntryMetadata>;

    /// Lists the direct entries of a directory, in no particular order.
    fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>>;
}

impl<F: Filesystem + ?Sized> Filesystem for &F {
    fn stat(&self, path: &Path) -> io::Result<EntryMetadata> {
        (**self).stat(path)
    }

    fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        (**self).list(path)
    }
}

impl<F: Filesystem + ?Sized> Filesystem for Arc<F> {
    fn stat(&self, path: &Path) -> io::Result<EntryMetadata> {
        (**self).stat(path)
    }

    fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        (**self).list(path)
    }
}
