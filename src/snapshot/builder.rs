use std::ffi::OsStr;
use std::io;
use std::path::Path;

use tracing::{debug, warn};

use super::{Node, NodeId, NodeKind, Snapshot};
use crate::filesystem::{EntryKind, EntryMetadata, Filesystem, FilesystemError, classify};

impl Snapshot {
    /// Walks the tree under `root` and captures it.
    ///
    /// Capturing is all or nothing: the first directory that cannot be listed
    /// aborts the walk, and no partially populated snapshot is returned.
    pub fn capture<F>(filesystem: &F, root: impl AsRef<Path>) -> Result<Snapshot, FilesystemError>
    where
        F: Filesystem + ?Sized,
    {
        let root = root.as_ref();
        let metadata = stat_root(filesystem, root)?;

        let root_name = root
            .file_name()
            .unwrap_or(root.as_os_str())
            .to_os_string();

        let mut builder = SnapshotBuilder {
            filesystem,
            nodes: vec![Node::new(root_name, NodeKind::Directory, metadata.modified)],
        };
        builder.capture_children(root, NodeId::ROOT)?;

        debug!(
            "Captured {} entries under {}",
            builder.nodes.len() - 1,
            root.display()
        );

        Ok(Snapshot {
            root_path: root.to_path_buf(),
            nodes: builder.nodes,
        })
    }
}

/// Stats `root` and checks that it is a directory that can be captured.
pub(crate) fn stat_root<F>(filesystem: &F, root: &Path) -> Result<EntryMetadata, FilesystemError>
where
    F: Filesystem + ?Sized,
{
    let metadata = filesystem.stat(root).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => FilesystemError::RootNotFound {
            path: root.to_path_buf(),
        },
        _ => classify(root, source),
    })?;

    if metadata.kind != EntryKind::Directory {
        return Err(FilesystemError::RootNotDirectory {
            path: root.to_path_buf(),
        });
    }
    Ok(metadata)
}

fn is_malformed(name: &OsStr) -> bool {
    name.is_empty() || name == "." || name == ".." || name.as_encoded_bytes().contains(&b'/')
}

struct SnapshotBuilder<'a, F: ?Sized> {
    filesystem: &'a F,
    nodes: Vec<Node>,
}

impl<F: Filesystem + ?Sized> SnapshotBuilder<'_, F> {
    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    fn capture_children(&mut self, dir_path: &Path, parent: NodeId) -> Result<(), FilesystemError> {
        let entries = self
            .filesystem
            .list(dir_path)
            .map_err(|source| classify(dir_path, source))?;
        debug!("Listed {} entries in {}", entries.len(), dir_path.display());

        for entry in entries {
            if is_malformed(&entry.name) {
                warn!(
                    "Skipping malformed entry name {:?} in {}",
                    entry.name,
                    dir_path.display()
                );
                continue;
            }
            if self.nodes[parent.index()].children.contains_key(&entry.name) {
                warn!(
                    "Skipping duplicate entry {:?} in {}",
                    entry.name,
                    dir_path.display()
                );
                continue;
            }

            let id = self.push(Node::new(
                entry.name.clone(),
                entry.metadata.kind.into(),
                entry.metadata.modified,
            ));
            if entry.metadata.is_dir() {
                self.capture_children(&dir_path.join(&entry.name), id)?;
            }

            self.nodes[parent.index()].children.insert(entry.name, id);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::{DirEntry, MemoryFilesystem, OsFilesystem};
    use crate::snapshot::tests::at;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn filled() -> MemoryFilesystem {
        let fs = MemoryFilesystem::new(at(1));
        fs.add_file("file1", at(10)).unwrap();
        fs.add_file("file2", at(11)).unwrap();
        fs.add_dir("subfolder", at(12)).unwrap();
        fs.add_file("subfolder/file3", at(13)).unwrap();
        fs
    }

    #[test]
    fn captures_names_kinds_and_times() {
        let fs = filled();

        let snapshot = Snapshot::capture(&fs, "/").unwrap();

        assert_eq!(snapshot.len(), 5);
        assert_eq!(snapshot.root_path(), Path::new("/"));
        let file3 = snapshot.find("subfolder/file3").unwrap();
        assert!(!file3.is_dir());
        assert_eq!(file3.modified(), at(13));
        let subfolder = snapshot.find("subfolder").unwrap();
        assert!(subfolder.is_dir());
        assert_eq!(subfolder.modified(), at(12));
        assert!(snapshot.find("file2").is_some());
    }

    #[test]
    fn ids_are_assigned_in_pre_order() {
        let fs = filled();
        fs.add_dir("subfolder/deeper", at(14)).unwrap();
        fs.add_file("subfolder/deeper/leaf", at(15)).unwrap();

        let snapshot = Snapshot::capture(&fs, "/").unwrap();
        let (root_path, nodes) = snapshot.clone().into_parts();

        assert_eq!(Snapshot::from_parts(root_path, nodes).unwrap(), snapshot);
    }

    #[test]
    fn empty_root_captures_only_the_root() {
        let fs = MemoryFilesystem::new(at(1));

        let snapshot = Snapshot::capture(&fs, "/").unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.children(NodeId::ROOT).count(), 0);
    }

    #[test]
    fn missing_root_is_reported() {
        let fs = filled();

        let error = Snapshot::capture(&fs, "/nope").unwrap_err();

        assert!(matches!(error, FilesystemError::RootNotFound { .. }));
    }

    #[test]
    fn file_root_is_reported() {
        let fs = filled();

        let error = Snapshot::capture(&fs, "/file1").unwrap_err();

        assert!(matches!(error, FilesystemError::RootNotDirectory { .. }));
    }

    #[test]
    fn unreadable_subdirectory_aborts_the_capture() {
        let fs = filled();
        fs.set_unreadable("subfolder", true).unwrap();

        let error = Snapshot::capture(&fs, "/").unwrap_err();

        match error {
            FilesystemError::PermissionDenied { path, .. } => {
                assert_eq!(path, PathBuf::from("/subfolder"));
            }
            other => panic!("Expected PermissionDenied, got {other:?}"),
        }
    }

    struct DuplicatingFilesystem;

    impl Filesystem for DuplicatingFilesystem {
        fn stat(&self, _path: &Path) -> io::Result<EntryMetadata> {
            Ok(EntryMetadata {
                kind: EntryKind::Directory,
                modified: at(1),
            })
        }

        fn list(&self, _path: &Path) -> io::Result<Vec<DirEntry>> {
            let file = |name: &str| DirEntry {
                name: name.into(),
                metadata: EntryMetadata {
                    kind: EntryKind::File,
                    modified: at(2),
                },
            };
            Ok(vec![file("twice"), file("twice"), file(".."), file("a/b")])
        }
    }

    #[test]
    fn duplicate_and_malformed_names_are_skipped() {
        let snapshot = Snapshot::capture(&DuplicatingFilesystem, "/").unwrap();

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.find("twice").is_some());
    }

    #[test]
    fn captures_a_real_directory() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        std::fs::write(dir.path().join("file1"), b"one").expect("Failed to write file1");
        std::fs::create_dir_all(dir.path().join("a/b")).expect("Failed to create a/b");
        std::fs::write(dir.path().join("a/b/c"), b"c").expect("Failed to write a/b/c");

        let snapshot = Snapshot::capture(&OsFilesystem::new(), dir.path()).unwrap();

        assert_eq!(snapshot.len(), 5);
        assert!(snapshot.find("a/b").unwrap().is_dir());
        assert!(!snapshot.find("a/b/c").unwrap().is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_names_are_captured_exactly() {
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new().expect("Failed to create temp directory");
        let cafe = OsStr::from_bytes(b"caf\xe9");
        std::fs::create_dir(dir.path().join(cafe)).expect("Failed to create non-UTF-8 dir");
        std::fs::write(dir.path().join(cafe).join("inner"), b"in").expect("Failed to write inner");
        std::fs::write(dir.path().join(OsStr::from_bytes(b"a\xfe")), b"fe")
            .expect("Failed to write a\\xfe");
        std::fs::write(dir.path().join(OsStr::from_bytes(b"a\xff")), b"ff")
            .expect("Failed to write a\\xff");

        let snapshot = Snapshot::capture(&OsFilesystem::new(), dir.path()).unwrap();

        assert_eq!(snapshot.len(), 5);
        assert!(snapshot.find(Path::new(cafe).join("inner")).is_some());
        assert!(snapshot.find(Path::new(OsStr::from_bytes(b"a\xfe"))).is_some());
        assert!(snapshot.find(Path::new(OsStr::from_bytes(b"a\xff"))).is_some());
    }
}
