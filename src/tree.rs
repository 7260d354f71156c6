//! Rebuilding a browsable trash tree from the flat ledger.
//!
//! The ledger only knows the items that were deleted. Directories above them
//! that were never deleted themselves show up as virtual directories, found
//! by prefix scans over an ordered index of original locations.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::db::{FolderId, TrashRecord};
use crate::path;

/// Where a folder's trash lives and how it is presented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderTrash {
    pub folder_id: FolderId,
    pub mount_point: String,
    /// Trash-area root in the trash storage.
    pub trash_root: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeInfo {
    pub is_dir: bool,
    pub size: u64,
}

/// Physical lookups inside one folder's trash area. Paths are relative to the trash root.
pub trait NodeSource {
    fn describe(&self, node_path: &str) -> Option<NodeInfo>;

    fn children(&self, node_path: &str) -> Vec<String>;
}

/// A trashed node: a ledger record's own node, or something inside a trashed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafTrashEntry {
    pub folder_id: FolderId,
    pub mount_point: String,
    pub trash_root: String,
    pub record: TrashRecord,
    /// Path below the record's node; empty for the record itself.
    pub sub_path: String,
    pub is_dir: bool,
    pub size: u64,
}

impl LeafTrashEntry {
    pub fn name(&self) -> String {
        if self.sub_path.is_empty() {
            self.record.name.clone()
        } else {
            path::basename(&self.sub_path).to_string()
        }
    }

    pub fn original_location(&self) -> String {
        path::join(&self.record.original_location, &self.sub_path)
    }

    pub fn is_record_root(&self) -> bool {
        self.sub_path.is_empty()
    }

    /// Node location relative to the trash root.
    pub fn node_path(&self) -> String {
        path::join(&self.record.node_path(), &self.sub_path)
    }

    /// Node location in the trash storage.
    pub fn trash_path(&self) -> String {
        path::join(&self.trash_root, &self.node_path())
    }
}

/// A directory that only exists because trashed items used to live below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualTrashDirectory {
    pub folder_id: FolderId,
    pub mount_point: String,
    pub trash_root: String,
    pub name: String,
    /// Full folder-relative path of the directory.
    pub location: String,
    /// Latest deletion below the directory.
    pub deleted_time: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrashEntry {
    Leaf(LeafTrashEntry),
    Virtual(VirtualTrashDirectory),
}

impl TrashEntry {
    pub fn name(&self) -> String {
        match self {
            TrashEntry::Leaf(leaf) => leaf.name(),
            TrashEntry::Virtual(dir) => dir.name.clone(),
        }
    }

    pub fn folder_id(&self) -> FolderId {
        match self {
            TrashEntry::Leaf(leaf) => leaf.folder_id,
            TrashEntry::Virtual(dir) => dir.folder_id,
        }
    }

    pub fn mount_point(&self) -> &str {
        match self {
            TrashEntry::Leaf(leaf) => &leaf.mount_point,
            TrashEntry::Virtual(dir) => &dir.mount_point,
        }
    }

    pub fn trash_root(&self) -> &str {
        match self {
            TrashEntry::Leaf(leaf) => &leaf.trash_root,
            TrashEntry::Virtual(dir) => &dir.trash_root,
        }
    }

    pub fn deleted_time(&self) -> Option<i64> {
        match self {
            TrashEntry::Leaf(leaf) => Some(leaf.record.deleted_time),
            TrashEntry::Virtual(dir) => dir.deleted_time,
        }
    }

    pub fn original_location(&self) -> String {
        match self {
            TrashEntry::Leaf(leaf) => leaf.original_location(),
            TrashEntry::Virtual(dir) => dir.location.clone(),
        }
    }

    pub fn is_dir(&self) -> bool {
        match self {
            TrashEntry::Leaf(leaf) => leaf.is_dir,
            TrashEntry::Virtual(_) => true,
        }
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, TrashEntry::Virtual(_))
    }

    fn tie_breaker(&self) -> (i64, &str) {
        match self {
            TrashEntry::Leaf(leaf) => (leaf.record.record_id, leaf.sub_path.as_str()),
            TrashEntry::Virtual(_) => (0, ""),
        }
    }
}

/// Ledger rows of one folder ordered by original location.
#[derive(Debug, Default)]
pub struct LedgerIndex {
    by_location: BTreeMap<String, Vec<TrashRecord>>,
}

impl LedgerIndex {
    pub fn new(records: impl IntoIterator<Item = TrashRecord>) -> Self {
        let mut by_location: BTreeMap<String, Vec<TrashRecord>> = BTreeMap::new();
        for record in records {
            by_location
                .entry(record.original_location.clone())
                .or_default()
                .push(record);
        }
        Self { by_location }
    }

    pub fn is_empty(&self) -> bool {
        self.by_location.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &TrashRecord> {
        self.by_location.values().flatten()
    }

    /// Records deleted exactly at `location`.
    pub fn exact(&self, location: &str) -> &[TrashRecord] {
        self.by_location
            .get(location)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Records strictly below `location`.
    pub fn below<'a>(&'a self, location: &str) -> Box<dyn Iterator<Item = &'a TrashRecord> + 'a> {
        if location.is_empty() {
            return Box::new(self.records());
        }
        // Every key starting with "location/" sorts before "location0".
        let start = format!("{location}/");
        let end = format!("{location}0");
        Box::new(self.by_location.range(start..end).flat_map(|(_, rows)| rows))
    }

    pub fn at_or_under<'a>(&'a self, location: &str) -> impl Iterator<Item = &'a TrashRecord> + 'a {
        let exact = if location.is_empty() { &[][..] } else { self.exact(location) };
        exact.iter().chain(self.below(location))
    }

    pub fn latest_deletion_time_at_or_under(&self, location: &str) -> Option<i64> {
        self.at_or_under(location).map(|r| r.deleted_time).max()
    }

    /// Records deleted at `location` or at one of its ancestors, each with the
    /// part of `location` that lies inside the record's node.
    pub fn covering<'a>(&'a self, location: &'a str) -> Vec<(&'a TrashRecord, &'a str)> {
        let mut found = Vec::new();
        let mut prefix = String::new();
        for segment in path::segments(location) {
            prefix = path::join(&prefix, segment);
            let Some(rest) = path::relative_to(location, &prefix) else {
                continue;
            };
            for record in self.exact(&prefix) {
                found.push((record, rest));
            }
        }
        found
    }
}

/// List the trash of one folder at `location` (empty for the folder's trash root).
pub fn reconstruct(
    index: &LedgerIndex,
    folder: &FolderTrash,
    location: &str,
    nodes: &dyn NodeSource,
) -> Vec<TrashEntry> {
    let location = path::normalize(location);
    let depth = path::depth(&location);
    let mut leaves = Vec::new();

    // Records deleted directly inside `location`.
    for record in index.below(&location) {
        if path::parent(&record.original_location) != location {
            continue;
        }
        match nodes.describe(&record.node_path()) {
            Some(info) => leaves.push(leaf(folder, record, String::new(), info)),
            None => log::warn!(
                "Trash node missing for {} (folder {}, deleted {})",
                record.original_location,
                record.folder_id,
                record.deleted_time
            ),
        }
    }

    // Contents of trashed directories that cover `location`.
    for (record, rest) in index.covering(&location) {
        let dir = path::join(&record.node_path(), rest);
        if !matches!(nodes.describe(&dir), Some(info) if info.is_dir) {
            continue;
        }
        for child in nodes.children(&dir) {
            if let Some(info) = nodes.describe(&path::join(&dir, &child)) {
                leaves.push(leaf(folder, record, path::join(rest, &child), info));
            }
        }
    }

    let covered: HashSet<String> = leaves.iter().map(LeafTrashEntry::name).collect();
    let segments: BTreeSet<&str> = index
        .below(&location)
        .filter_map(|record| {
            let mut parts = path::segments(&record.original_location).skip(depth);
            let segment = parts.next()?;
            // Only records at least two levels further down imply a directory.
            parts.next().map(|_| segment)
        })
        .collect();

    let mut entries: Vec<TrashEntry> = leaves.into_iter().map(TrashEntry::Leaf).collect();
    for segment in segments {
        if covered.contains(segment) {
            continue;
        }
        let dir_location = path::join(&location, segment);
        entries.push(TrashEntry::Virtual(VirtualTrashDirectory {
            folder_id: folder.folder_id,
            mount_point: folder.mount_point.clone(),
            trash_root: folder.trash_root.clone(),
            name: segment.to_string(),
            deleted_time: index.latest_deletion_time_at_or_under(&dir_location),
            location: dir_location,
        }));
    }

    sort_entries(&mut entries);
    entries
}

/// Contents of one trashed directory node, as entries of that node's record.
/// Other records deleted at the same location are not merged in.
pub fn node_children(dir: &LeafTrashEntry, nodes: &dyn NodeSource) -> Vec<TrashEntry> {
    let folder = FolderTrash {
        folder_id: dir.folder_id,
        mount_point: dir.mount_point.clone(),
        trash_root: dir.trash_root.clone(),
    };
    let node = dir.node_path();
    let mut entries: Vec<TrashEntry> = nodes
        .children(&node)
        .into_iter()
        .filter_map(|child| {
            let info = nodes.describe(&path::join(&node, &child))?;
            let sub_path = path::join(&dir.sub_path, &child);
            Some(TrashEntry::Leaf(leaf(&folder, &dir.record, sub_path, info)))
        })
        .collect();
    sort_entries(&mut entries);
    entries
}

/// Most recent deletion first, then by name.
pub fn sort_entries(entries: &mut [TrashEntry]) {
    entries.sort_by(|a, b| {
        b.deleted_time()
            .cmp(&a.deleted_time())
            .then_with(|| a.name().cmp(&b.name()))
            .then_with(|| a.tie_breaker().cmp(&b.tie_breaker()))
    });
}

fn leaf(folder: &FolderTrash, record: &TrashRecord, sub_path: String, info: NodeInfo) -> LeafTrashEntry {
    LeafTrashEntry {
        folder_id: folder.folder_id,
        mount_point: folder.mount_point.clone(),
        trash_root: folder.trash_root.clone(),
        record: record.clone(),
        sub_path,
        is_dir: info.is_dir,
        size: info.size,
    }
}
