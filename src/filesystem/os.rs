use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

use super::{DirEntry, EntryKind, EntryMetadata, Filesystem};

/// The real filesystem, read through `std::fs`.
///
/// The root passed to [`Filesystem::stat`] is resolved through symlinks, but
/// listed entries are not: a symlink shows up as a file and is never
/// descended into, so link cycles cannot make a capture run forever.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFilesystem;

impl OsFilesystem {
    pub fn new() -> Self {
        Self
    }
}

fn to_metadata(metadata: &fs::Metadata) -> io::Result<EntryMetadata> {
    let kind = if metadata.is_dir() {
        EntryKind::Directory
    } else {
        EntryKind::File
    };

    Ok(EntryMetadata {
        kind,
        modified: metadata.modified()?,
    })
}

impl Filesystem for OsFilesystem {
    fn stat(&self, path: &Path) -> io::Result<EntryMetadata> {
        to_metadata(&fs::metadata(path)?)
    }

    fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();

        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_str().is_none() {
                debug!("Entry name {:?} in {} is not valid UTF-8", name, path.display());
            }

            // DirEntry::metadata does not traverse symlinks
            let metadata = to_metadata(&entry.metadata()?)?;
            entries.push(DirEntry { name, metadata });
        }

        Ok(entries)
    }
}
