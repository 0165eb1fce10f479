use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io;
use std::path::{Component, Path};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use super::{DirEntry, EntryKind, EntryMetadata, Filesystem};

#[derive(Debug, Clone)]
struct MemoryEntry {
    kind: EntryKind,
    modified: SystemTime,
    unreadable: bool,
    children: BTreeMap<OsString, MemoryEntry>,
}

impl MemoryEntry {
    fn new(kind: EntryKind, modified: SystemTime) -> Self {
        Self {
            kind,
            modified,
            unreadable: false,
            children: BTreeMap::new(),
        }
    }

    fn metadata(&self) -> EntryMetadata {
        EntryMetadata {
            kind: self.kind,
            modified: self.modified,
        }
    }
}

/// An in-memory directory tree implementing [`Filesystem`].
///
/// Clones share the same tree, so a test can hand one clone to a poller and
/// keep mutating the tree through another. Every path is resolved relative to
/// the single root directory; root and `.` components are skipped.
#[derive(Debug, Clone)]
pub struct MemoryFilesystem {
    root: Arc<Mutex<MemoryEntry>>,
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} does not exist", path.display()),
    )
}

fn denied(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("{} is unreadable", path.display()),
    )
}

fn segments(path: &Path) -> io::Result<Vec<OsString>> {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(Ok(name.to_os_string())),
            Component::ParentDir => Some(Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} contains '..'", path.display()),
            ))),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => None,
        })
        .collect()
}

fn resolve<'a>(root: &'a MemoryEntry, path: &Path) -> io::Result<&'a MemoryEntry> {
    let mut current = root;
    for segment in segments(path)? {
        current = current.children.get(&segment).ok_or_else(|| not_found(path))?;
    }
    Ok(current)
}

fn resolve_mut<'a>(root: &'a mut MemoryEntry, path: &Path) -> io::Result<&'a mut MemoryEntry> {
    let mut current = root;
    for segment in segments(path)? {
        current = current
            .children
            .get_mut(&segment)
            .ok_or_else(|| not_found(path))?;
    }
    Ok(current)
}

impl MemoryFilesystem {
    /// Creates a filesystem holding only an empty root directory.
    pub fn new(root_modified: SystemTime) -> Self {
        Self {
            root: Arc::new(Mutex::new(MemoryEntry::new(
                EntryKind::Directory,
                root_modified,
            ))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryEntry> {
        self.root.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, path: &Path, kind: EntryKind, modified: SystemTime) -> io::Result<()> {
        let mut segments = segments(path)?;
        let name = segments.pop().ok_or_else(|| {
            io::Error::new(io::ErrorKind::AlreadyExists, "the root always exists")
        })?;

        let mut root = self.lock();
        let mut parent = &mut *root;
        for segment in segments {
            parent = parent
                .children
                .get_mut(&segment)
                .ok_or_else(|| not_found(path))?;
        }

        if parent.kind != EntryKind::Directory {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("parent of {} is not a directory", path.display()),
            ));
        }
        if parent.children.contains_key(&name) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", path.display()),
            ));
        }

        parent.children.insert(name, MemoryEntry::new(kind, modified));
        Ok(())
    }

    pub fn add_file(&self, path: impl AsRef<Path>, modified: SystemTime) -> io::Result<()> {
        self.insert(path.as_ref(), EntryKind::File, modified)
    }

    pub fn add_dir(&self, path: impl AsRef<Path>, modified: SystemTime) -> io::Result<()> {
        self.insert(path.as_ref(), EntryKind::Directory, modified)
    }

    /// Sets the modification time of an existing entry.
    pub fn touch(&self, path: impl AsRef<Path>, modified: SystemTime) -> io::Result<()> {
        let mut root = self.lock();
        resolve_mut(&mut root, path.as_ref())?.modified = modified;
        Ok(())
    }

    /// Removes an entry together with everything below it.
    pub fn remove(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let path = path.as_ref();
        let mut segments = segments(path)?;
        let name = segments.pop().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "cannot remove the root")
        })?;

        let mut root = self.lock();
        let mut parent = &mut *root;
        for segment in segments {
            parent = parent
                .children
                .get_mut(&segment)
                .ok_or_else(|| not_found(path))?;
        }

        parent
            .children
            .remove(&name)
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }

    /// Makes `stat` and `list` on this exact path fail with `PermissionDenied`.
    pub fn set_unreadable(&self, path: impl AsRef<Path>, unreadable: bool) -> io::Result<()> {
        let mut root = self.lock();
        resolve_mut(&mut root, path.as_ref())?.unreadable = unreadable;
        Ok(())
    }
}

impl Filesystem for MemoryFilesystem {
    fn stat(&self, path: &Path) -> io::Result<EntryMetadata> {
        let root = self.lock();
        let entry = resolve(&root, path)?;
        if entry.unreadable {
            return Err(denied(path));
        }
        Ok(entry.metadata())
    }

    fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let root = self.lock();
        let entry = resolve(&root, path)?;
        if entry.unreadable {
            return Err(denied(path));
        }
        if entry.kind != EntryKind::Directory {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", path.display()),
            ));
        }

        Ok(entry
            .children
            .iter()
            .map(|(name, child)| DirEntry {
                name: name.clone(),
                metadata: child.metadata(),
            })
            .collect())
    }
}
