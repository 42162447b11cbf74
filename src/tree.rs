use indextree::{Arena, NodeId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// How an entry decomposes in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Plain file or link. Never has children.
    File,
    /// Ordinary directory. Children are present (possibly empty).
    Directory,
    /// Opaque directory (e.g. an application bundle). Sized like a
    /// directory, but its contents are never exposed.
    AtomicUnit,
    /// Directory whose contents could not be listed. Leaf of size 0.
    Unreadable,
}

/// Represents a node in the directory tree
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub path: PathBuf,
    pub name: String,
    /// Own size for leaves, sum of all descendants for directories
    pub size: u64,
    pub kind: EntryKind,
    /// Share of the parent's size, 0..=100. The root reports 100.
    pub percentage_of_parent: f64,
    /// True while this subtree is still being walked
    pub is_pending: bool,
}

impl Entry {
    fn new(path: PathBuf, size: u64, kind: EntryKind, is_pending: bool) -> Self {
        let name = display_name(&path);
        Self {
            path,
            name,
            size,
            kind,
            percentage_of_parent: 0.0,
            is_pending,
        }
    }

    pub fn file(path: PathBuf, size: u64) -> Self {
        Self::new(path, size, EntryKind::File, false)
    }

    pub fn atomic_unit(path: PathBuf, size: u64) -> Self {
        Self::new(path, size, EntryKind::AtomicUnit, false)
    }

    /// Directory not walked yet: size 0, no children, pending.
    pub fn placeholder(path: PathBuf) -> Self {
        Self::new(path, 0, EntryKind::Directory, true)
    }

    pub fn has_children(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_atomic_unit(&self) -> bool {
        self.kind == EntryKind::AtomicUnit
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Hierarchical tree of scan results stored in an arena.
///
/// Cloning is how snapshots are taken: the walker keeps mutating its own
/// copy while consumers hold an immutable one.
#[derive(Debug, Clone)]
pub struct DirectoryTree {
    arena: Arena<Entry>,
    root: NodeId,
    path_to_node: HashMap<PathBuf, NodeId>,
}

impl DirectoryTree {
    pub fn new(root_entry: Entry) -> Self {
        let mut arena = Arena::new();
        let root_path = root_entry.path.clone();
        let root = arena.new_node(root_entry);
        let mut path_to_node = HashMap::new();
        path_to_node.insert(root_path, root);

        Self {
            arena,
            root,
            path_to_node,
        }
    }

    /// Append `entry` under `parent`.
    ///
    /// Returns `None` when the parent cannot hold children (files,
    /// atomic units, unreadable directories).
    pub fn add_child(&mut self, parent: NodeId, entry: Entry) -> Option<NodeId> {
        if !self.get(parent)?.has_children() {
            return None;
        }

        let path = entry.path.clone();
        let node_id = self.arena.new_node(entry);
        parent.append(node_id, &mut self.arena);
        self.path_to_node.insert(path, node_id);
        Some(node_id)
    }

    pub fn get_root(&self) -> NodeId {
        self.root
    }

    pub fn root_entry(&self) -> &Entry {
        self.arena[self.root].get()
    }

    pub fn root_path(&self) -> &Path {
        &self.root_entry().path
    }

    pub fn get(&self, id: NodeId) -> Option<&Entry> {
        self.arena.get(id).map(|node| node.get())
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Entry> {
        self.arena.get_mut(id).map(|node| node.get_mut())
    }

    pub fn get_node(&self, path: &Path) -> Option<NodeId> {
        self.path_to_node.get(path).copied()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        id.parent(&self.arena)
    }

    /// Child ids in current order, or `None` for leaves.
    pub fn children(&self, id: NodeId) -> Option<Vec<NodeId>> {
        let entry = self.get(id)?;
        if !entry.has_children() {
            return None;
        }
        Some(id.children(&self.arena).collect())
    }

    /// Child entries in current order; empty for leaves.
    pub fn child_entries(&self, id: NodeId) -> Vec<(NodeId, &Entry)> {
        self.children(id)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|child| self.get(child).map(|entry| (child, entry)))
            .collect()
    }

    /// Every node id, parents before children.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.root.descendants(&self.arena).collect()
    }

    pub fn len(&self) -> usize {
        self.path_to_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.path_to_node.is_empty()
    }

    /// Get total size of the tree
    pub fn total_size(&self) -> u64 {
        self.root_entry().size
    }

    /// Stable-sort every node's children by descending size.
    pub fn sort_descending_by_size(&mut self) {
        for node_id in self.node_ids() {
            let mut children: Vec<NodeId> = node_id.children(&self.arena).collect();
            let in_order = children
                .windows(2)
                .all(|pair| self.arena[pair[0]].get().size >= self.arena[pair[1]].get().size);
            if in_order {
                continue;
            }

            children.sort_by(|a, b| {
                let size_a = self.arena[*a].get().size;
                let size_b = self.arena[*b].get().size;
                size_b.cmp(&size_a)
            });

            for child in &children {
                child.detach(&mut self.arena);
            }
            for child in children {
                node_id.append(child, &mut self.arena);
            }
        }
    }

    /// Recompute `percentage_of_parent` top-down from the root.
    pub fn recompute_percentages(&mut self) {
        for node_id in self.node_ids() {
            let percentage = match node_id.parent(&self.arena) {
                None => 100.0,
                Some(parent_id) => {
                    let parent_size = self.arena[parent_id].get().size;
                    let size = self.arena[node_id].get().size;
                    if parent_size == 0 {
                        0.0
                    } else {
                        100.0 * size as f64 / parent_size as f64
                    }
                }
            };
            self.arena[node_id].get_mut().percentage_of_parent = percentage;
        }
    }

    pub fn clear_pending(&mut self) {
        for node_id in self.node_ids() {
            self.arena[node_id].get_mut().is_pending = false;
        }
    }

    /// Sum of the sizes of a node's known children.
    pub fn known_children_size(&self, id: NodeId) -> u64 {
        self.child_entries(id).iter().map(|(_, entry)| entry.size).sum()
    }
}
