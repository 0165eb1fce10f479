//! Immutable, in-memory captures of a directory tree.
//!
//! A [`Snapshot`] stores its nodes in an arena addressed by [`NodeId`]. Ids are
//! handed out in pre-order while capturing, so a child always has a larger id
//! than its parent and the arena cannot describe a cycle.

mod builder;

pub(crate) use builder::stat_root;

use std::collections::{BTreeMap, HashSet};
use std::ffi::{OsStr, OsString};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use bincode::de::Decoder;
use bincode::enc::Encoder;
use bincode::error::{DecodeError, EncodeError};
use bincode::{Decode, Encode, impl_borrow_decode};
use derive_more::Display;
use snafu::{Snafu, ensure};

use crate::filesystem::EntryKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Encode, Decode)]
#[display("#{_0}")]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum NodeKind {
    File,
    Directory,
}

impl From<EntryKind> for NodeKind {
    fn from(kind: EntryKind) -> Self {
        match kind {
            EntryKind::File => NodeKind::File,
            EntryKind::Directory => NodeKind::Directory,
        }
    }
}

/// One filesystem entry as it was when the snapshot was captured.
///
/// Names are kept as the filesystem reported them, so an entry whose name is
/// not valid UTF-8 can still be found again on the next capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    name: OsString,
    kind: NodeKind,
    modified: SystemTime,
    children: BTreeMap<OsString, NodeId>,
}

impl Node {
    fn new(name: OsString, kind: NodeKind, modified: SystemTime) -> Self {
        Self {
            name,
            kind,
            modified,
            children: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &OsStr {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    pub fn child(&self, name: impl AsRef<OsStr>) -> Option<NodeId> {
        self.children.get(name.as_ref()).copied()
    }
}

// Names go to disk as their raw bytes, children as (name, id) pairs.
impl Encode for Node {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        self.name.as_encoded_bytes().encode(encoder)?;
        self.kind.encode(encoder)?;
        self.modified.encode(encoder)?;

        let children: Vec<(&[u8], NodeId)> = self
            .children
            .iter()
            .map(|(name, id)| (name.as_encoded_bytes(), *id))
            .collect();
        children.encode(encoder)
    }
}

impl<Context> Decode<Context> for Node {
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, DecodeError> {
        let name = name_from_bytes(Vec::<u8>::decode(decoder)?)?;
        let kind = NodeKind::decode(decoder)?;
        let modified = SystemTime::decode(decoder)?;

        let mut children = BTreeMap::new();
        for (child_name, id) in Vec::<(Vec<u8>, NodeId)>::decode(decoder)? {
            children.insert(name_from_bytes(child_name)?, id);
        }

        Ok(Self {
            name,
            kind,
            modified,
            children,
        })
    }
}

impl_borrow_decode!(Node);

#[cfg(unix)]
pub(crate) fn name_from_bytes(bytes: Vec<u8>) -> Result<OsString, DecodeError> {
    use std::os::unix::ffi::OsStringExt;

    Ok(OsString::from_vec(bytes))
}

#[cfg(not(unix))]
pub(crate) fn name_from_bytes(bytes: Vec<u8>) -> Result<OsString, DecodeError> {
    String::from_utf8(bytes)
        .map(OsString::from)
        .map_err(|error| DecodeError::Utf8 {
            inner: error.utf8_error(),
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    root_path: PathBuf,
    nodes: Vec<Node>,
}

impl Snapshot {
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn root(&self) -> &Node {
        self.node(NodeId::ROOT)
    }

    /// Panics if `id` did not come from this snapshot.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = (&OsStr, NodeId)> {
        self.node(id)
            .children
            .iter()
            .map(|(name, child)| (name.as_os_str(), *child))
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false for a captured snapshot, which at least holds its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Looks a node up by its path relative to the snapshot root.
    pub fn find(&self, relative: impl AsRef<Path>) -> Option<&Node> {
        let mut current = NodeId::ROOT;
        for component in relative.as_ref().components() {
            match component {
                Component::Normal(name) => {
                    current = self.node(current).child(name)?;
                }
                Component::CurDir | Component::RootDir => {}
                Component::ParentDir | Component::Prefix(_) => return None,
            }
        }
        Some(self.node(current))
    }

    /// Two snapshots can only be diffed when they observe the same root.
    pub fn is_comparable_with(&self, other: &Snapshot) -> bool {
        self.root_path == other.root_path
    }

    /// Reassembles a snapshot from parts that were stored elsewhere, checking
    /// that they still describe a tree: every node except the root is the
    /// child of exactly one earlier node.
    pub fn from_parts(root_path: PathBuf, nodes: Vec<Node>) -> Result<Self, InvalidSnapshotError> {
        ensure!(!nodes.is_empty(), EmptySnafu);
        ensure!(nodes[0].is_dir(), RootNotDirectorySnafu);

        let mut seen = HashSet::new();
        for (index, node) in nodes.iter().enumerate() {
            ensure!(
                node.is_dir() || node.children.is_empty(),
                FileWithChildrenSnafu {
                    name: node.name.to_string_lossy()
                }
            );

            for (child_name, child) in &node.children {
                let name = child_name.to_string_lossy();
                let child_index = child.index();
                ensure!(
                    child_index > index && child_index < nodes.len(),
                    DanglingChildSnafu { name: name.clone() }
                );
                ensure!(
                    seen.insert(child_index),
                    SharedChildSnafu { name: name.clone() }
                );
                ensure!(
                    nodes[child_index].name == *child_name,
                    NameMismatchSnafu { name: name.clone() }
                );
            }
        }

        let unreachable = nodes.len() - 1 - seen.len();
        ensure!(unreachable == 0, UnreachableNodesSnafu { count: unreachable });

        Ok(Self { root_path, nodes })
    }

    pub fn into_parts(self) -> (PathBuf, Vec<Node>) {
        (self.root_path, self.nodes)
    }
}

#[derive(Debug, Snafu)]
pub enum InvalidSnapshotError {
    #[snafu(display("Snapshot holds no nodes"))]
    Empty,
    #[snafu(display("Snapshot root is not a directory"))]
    RootNotDirectory,
    #[snafu(display("File '{}' has children", name))]
    FileWithChildren { name: String },
    #[snafu(display("Child '{}' points outside of the snapshot or backwards", name))]
    DanglingChild { name: String },
    #[snafu(display("Child '{}' is referenced by more than one parent", name))]
    SharedChild { name: String },
    #[snafu(display("Child '{}' does not match the name of the node it points to", name))]
    NameMismatch { name: String },
    #[snafu(display("{} nodes are not reachable from the root", count))]
    UnreachableNodes { count: usize },
}
