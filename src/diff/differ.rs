use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{DiffEvent, DiffKind};
use crate::snapshot::{NodeId, Snapshot};

/// Compares `old` against `new` and collects the changes.
///
/// See [`diff_with`] for the ordering guarantees.
pub fn diff(old: Option<&Snapshot>, new: &Snapshot) -> Vec<DiffEvent> {
    let mut events = Vec::new();
    diff_with(old, new, |event| events.push(event));
    events
}

/// Compares `old` against `new`, handing every change to `sink` as soon as it
/// is found.
///
/// Within one changed subtree, `Created` events come ancestor first and
/// `Deleted` events come descendant first. A path whose type flipped between
/// file and directory yields the `Deleted` events of the old subtree followed
/// by the `Created` events of the new one. Files are `Modified` only when
/// their modification time moved forward; directories are never `Modified`.
/// Sibling order is unspecified.
///
/// Without an `old` snapshot every entry of `new` is `Created`. The roots
/// themselves are never reported.
pub fn diff_with(old: Option<&Snapshot>, new: &Snapshot, sink: impl FnMut(DiffEvent)) {
    let mut differ = Differ { new, sink };

    match old {
        None => {
            for (name, child) in new.children(NodeId::ROOT) {
                differ.emit_created(child, &PathBuf::from(name));
            }
        }
        Some(old) => {
            if !old.is_comparable_with(new) {
                warn!(
                    "Diffing snapshots of different roots: {} and {}",
                    old.root_path().display(),
                    new.root_path().display()
                );
            }
            differ.compare_dirs(old, NodeId::ROOT, NodeId::ROOT, Path::new(""));
        }
    }
}

struct Differ<'a, S> {
    new: &'a Snapshot,
    sink: S,
}

impl<S: FnMut(DiffEvent)> Differ<'_, S> {
    fn emit(&mut self, path: &Path, kind: DiffKind) {
        (self.sink)(DiffEvent::new(path, kind));
    }

    fn compare_dirs(&mut self, old: &Snapshot, old_dir: NodeId, new_dir: NodeId, path: &Path) {
        let new = self.new;

        for (name, old_child) in old.children(old_dir) {
            if new.node(new_dir).child(name).is_none() {
                emit_deleted(old, old_child, &path.join(name), &mut self.sink);
            }
        }

        for (name, new_child) in new.children(new_dir) {
            let child_path = path.join(name);
            let Some(old_child) = old.node(old_dir).child(name) else {
                self.emit_created(new_child, &child_path);
                continue;
            };

            let before = old.node(old_child);
            let after = new.node(new_child);

            if before.kind() != after.kind() {
                debug!("{} changed type", child_path.display());
                emit_deleted(old, old_child, &child_path, &mut self.sink);
                self.emit_created(new_child, &child_path);
            } else if after.is_dir() {
                self.compare_dirs(old, old_child, new_child, &child_path);
            } else if after.modified() > before.modified() {
                self.emit(&child_path, DiffKind::Modified);
            }
        }
    }

    fn emit_created(&mut self, id: NodeId, path: &Path) {
        let new = self.new;
        self.emit(path, DiffKind::Created);
        for (name, child) in new.children(id) {
            self.emit_created(child, &path.join(name));
        }
    }
}

fn emit_deleted(old: &Snapshot, id: NodeId, path: &Path, sink: &mut impl FnMut(DiffEvent)) {
    for (name, child) in old.children(id) {
        emit_deleted(old, child, &path.join(name), sink);
    }
    sink(DiffEvent::new(path, DiffKind::Deleted));
}
