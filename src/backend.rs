//! Trash backend for shared folders: placing items in a folder's trash area,
//! browsing it, restoring and purging.

use std::sync::Arc;

use chrono::Utc;

use crate::acl::{AccessGate, AccessOracle, Permissions};
use crate::config::TrashSettings;
use crate::db::{Database, FileId, FolderId, TrashRecord};
use crate::error::{TrashError, TrashResult};
use crate::folders::{FolderMount, FolderRegistry, VersionStore};
use crate::path;
use crate::storage::{unwrap_storage, GroupFolderStorage, Jail, LocalStorage, Storage};
use crate::tree::{self, FolderTrash, LeafTrashEntry, LedgerIndex, NodeInfo, NodeSource, TrashEntry, VirtualTrashDirectory};

/// A trash node resolved from a metadata-index id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrashNode {
    pub file_id: FileId,
    pub entry: LeafTrashEntry,
}

pub struct TrashBackend {
    db: Arc<Database>,
    storage: Arc<LocalStorage>,
    registry: Arc<dyn FolderRegistry>,
    gate: AccessGate,
    versions: Option<Arc<dyn VersionStore>>,
    settings: TrashSettings,
}

/// Physical view of one folder's trash area.
struct TrashArea<'a> {
    storage: &'a LocalStorage,
    root: &'a str,
}

impl NodeSource for TrashArea<'_> {
    fn describe(&self, node_path: &str) -> Option<NodeInfo> {
        let full = path::join(self.root, node_path);
        if !self.storage.exists(&full) {
            return None;
        }
        Some(NodeInfo {
            is_dir: self.storage.is_dir(&full),
            size: self.storage.size(&full).unwrap_or(0),
        })
    }

    fn children(&self, node_path: &str) -> Vec<String> {
        self.storage
            .list_dir(&path::join(self.root, node_path))
            .unwrap_or_default()
    }
}

impl TrashBackend {
    pub fn new(
        db: Arc<Database>,
        storage: Arc<LocalStorage>,
        registry: Arc<dyn FolderRegistry>,
        oracle: Arc<dyn AccessOracle>,
        settings: TrashSettings,
    ) -> Self {
        let gate = AccessGate::new(oracle, Arc::clone(&registry));
        Self {
            db,
            storage,
            registry,
            gate,
            versions: None,
            settings,
        }
    }

    pub fn set_versions_backend(&mut self, versions: Arc<dyn VersionStore>) {
        self.versions = Some(versions);
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn storage(&self) -> &Arc<LocalStorage> {
        &self.storage
    }

    pub(crate) fn registry(&self) -> &Arc<dyn FolderRegistry> {
        &self.registry
    }

    /// Where a folder's contents live in the app storage.
    pub fn folder_root(&self, folder_id: FolderId) -> String {
        path::join(&path::normalize(&self.settings.groupfolders_dir), &folder_id.to_string())
    }

    /// Where a folder's trashed items live in the app storage.
    pub fn trash_root(&self, folder_id: FolderId) -> String {
        path::join(
            &path::normalize(&self.settings.groupfolders_dir),
            &format!("trash/{folder_id}"),
        )
    }

    /// Storage view of a shared folder, rooted at the folder root.
    pub fn folder_storage(&self, folder_id: FolderId) -> Arc<dyn Storage> {
        let root: Arc<dyn Storage> = Arc::new(Jail::new(self.storage.clone(), &self.folder_root(folder_id)));
        Arc::new(GroupFolderStorage::new(root, folder_id))
    }

    // ── Listing ─────────────────────────────────────────────

    /// Top level of the trash of every folder the user can see.
    pub fn list_trash_root(&self, user: &str) -> TrashResult<Vec<TrashEntry>> {
        let mut entries = Vec::new();
        for mount in self.registry.folders_for_user(user) {
            entries.extend(self.folder_listing(user, &mount, "")?);
        }
        tree::sort_entries(&mut entries);
        Ok(entries)
    }

    /// Trash of one folder at `location` (empty for the folder's trash root).
    pub fn list_trash_folder(&self, user: &str, folder_id: FolderId, location: &str) -> TrashResult<Vec<TrashEntry>> {
        let mount = self.visible_mount(user, folder_id)?;
        self.folder_listing(user, &mount, location)
    }

    /// Browse into a directory entry. A trashed directory lists its own node;
    /// a virtual directory lists everything deleted below its location.
    pub fn list_entry(&self, user: &str, entry: &TrashEntry) -> TrashResult<Vec<TrashEntry>> {
        self.check_trash_area(entry)?;
        match entry {
            TrashEntry::Leaf(leaf) if !leaf.is_dir => Err(TrashError::InvalidOperation(format!(
                "{} is not a directory",
                leaf.original_location()
            ))),
            TrashEntry::Leaf(leaf) => {
                self.visible_mount(user, leaf.folder_id)?;
                let area = TrashArea {
                    storage: &self.storage,
                    root: &leaf.trash_root,
                };
                let mut entries = tree::node_children(leaf, &area);
                entries.retain(|e| self.gate.can_read(user, leaf.folder_id, &e.original_location()));
                Ok(entries)
            }
            TrashEntry::Virtual(dir) => self.list_trash_folder(user, dir.folder_id, &dir.location),
        }
    }

    fn folder_listing(&self, user: &str, mount: &FolderMount, location: &str) -> TrashResult<Vec<TrashEntry>> {
        let folder_id = mount.folder_id;
        let index = LedgerIndex::new(
            self.db
                .list_records(&[folder_id])?
                .into_iter()
                .filter(|r| self.gate.can_read(user, folder_id, &r.original_location)),
        );
        if index.is_empty() {
            return Ok(Vec::new());
        }

        let folder = FolderTrash {
            folder_id,
            mount_point: mount.mount_point.clone(),
            trash_root: self.trash_root(folder_id),
        };
        let area = TrashArea {
            storage: &self.storage,
            root: &folder.trash_root,
        };
        let mut entries = tree::reconstruct(&index, &folder, location, &area);
        entries.retain(|e| self.gate.can_read(user, folder_id, &e.original_location()));
        Ok(entries)
    }

    fn visible_mount(&self, user: &str, folder_id: FolderId) -> TrashResult<FolderMount> {
        self.gate
            .visible_mount(user, folder_id)
            .ok_or_else(|| TrashError::Permission(format!("{user} cannot access folder {folder_id}")))
    }

    fn check_trash_area(&self, entry: &TrashEntry) -> TrashResult<()> {
        let expected = self.trash_root(entry.folder_id());
        if entry.trash_root() != expected {
            return Err(TrashError::InvalidOperation(format!(
                "entry {} belongs to trash area {}, not {}",
                entry.name(),
                entry.trash_root(),
                expected
            )));
        }
        Ok(())
    }

    // ── Placement ───────────────────────────────────────────

    /// Move `internal_path` of a shared-folder storage view into the folder's
    /// trash. Returns false when the storage is not part of a shared folder or
    /// the item cannot be deleted through it.
    pub fn move_to_trash(&self, storage: &Arc<dyn Storage>, internal_path: &str) -> TrashResult<bool> {
        self.move_to_trash_at(storage, internal_path, Utc::now().timestamp())
    }

    pub fn move_to_trash_at(&self, storage: &Arc<dyn Storage>, internal_path: &str, deleted_time: i64) -> TrashResult<bool> {
        let internal_path = path::normalize(internal_path);
        let Some(folder_id) = storage.folder_id() else {
            return Ok(false);
        };
        if !storage.is_deletable(&internal_path) {
            return Ok(false);
        }

        let trash_root = self.trash_root(folder_id);
        self.storage.mkdir_all(&trash_root)?;

        let unwrapped = unwrap_storage(storage, &internal_path);
        let folder_path = unwrapped.folder_path.clone().unwrap_or_else(|| internal_path.clone());
        if folder_path.is_empty() {
            return Ok(false);
        }
        let name = path::basename(&folder_path).to_string();

        let mut deleted_time = deleted_time;
        while self.slot_taken(folder_id, &trash_root, &folder_path, &name, deleted_time)? {
            deleted_time += 1;
        }
        let node_path = path::record_node_path(&folder_path, deleted_time);

        let mut created = Vec::new();
        let mut current = trash_root.clone();
        for segment in path::segments(path::parent(&node_path)) {
            current = path::join(&current, segment);
            if !self.storage.is_dir(&current) {
                self.storage.mkdir(&current)?;
                self.storage.ensure_indexed(&current)?;
                log::debug!("Created trash placeholder {}", current);
                created.push(current.clone());
            }
        }

        let target = path::join(&trash_root, &node_path);
        if let Err(e) = self
            .storage
            .move_from(unwrapped.storage.as_ref(), &unwrapped.path, &target)
        {
            for dir in created.iter().rev() {
                if !self.storage.list_dir(dir).is_ok_and(|children| children.is_empty()) {
                    log::warn!("Keeping trash placeholder {}: not empty after failed move", dir);
                    break;
                }
                if let Err(cleanup) = self.storage.unlink(dir).map_err(TrashError::from).and_then(|_| self.forget(dir)) {
                    log::warn!("Failed to remove trash placeholder {}: {}", dir, cleanup);
                }
            }
            return Err(TrashError::TrashOperation(format!(
                "moving {} to {}: {}",
                unwrapped.path, target, e
            )));
        }

        let file_id = self.storage.ensure_indexed(&target)?;
        self.db
            .add_record(folder_id, &name, deleted_time, &folder_path, Some(file_id))?;
        log::info!("Trashed {} from folder {} as {}", folder_path, folder_id, node_path);
        Ok(true)
    }

    fn slot_taken(&self, folder_id: FolderId, trash_root: &str, folder_path: &str, name: &str, deleted_time: i64) -> TrashResult<bool> {
        let node = path::record_node_path(folder_path, deleted_time);
        if self.storage.exists(&path::join(trash_root, &node)) {
            return Ok(true);
        }
        // Nodes of the same second share placeholders but never nest.
        Ok(self
            .db
            .records_deleted_at(folder_id, deleted_time)?
            .iter()
            .any(|r| {
                let owned = r.node_path();
                r.name == name || path::is_at_or_under(&node, &owned) || path::is_at_or_under(&owned, &node)
            }))
    }

    // ── Restore ─────────────────────────────────────────────

    pub fn restore(&self, user: &str, entry: &TrashEntry) -> TrashResult<()> {
        self.check_trash_area(entry)?;
        match entry {
            TrashEntry::Leaf(leaf) => self.restore_leaf(user, leaf).map(|_| ()),
            TrashEntry::Virtual(dir) => {
                for leaf in self.virtual_batch(user, dir)? {
                    self.restore_leaf(user, &leaf)?;
                }
                Ok(())
            }
        }
    }

    /// Returns the folder-relative location the item was restored to.
    fn restore_leaf(&self, user: &str, leaf: &LeafTrashEntry) -> TrashResult<String> {
        let folder_id = leaf.folder_id;
        let original = leaf.original_location();
        self.gate.require(user, folder_id, &original, Permissions::UPDATE)?;

        let source = leaf.trash_path();
        if !self.storage.exists(&source) {
            return Err(TrashError::NotFound(format!("trash node {source}")));
        }

        let folder_root = self.folder_root(folder_id);
        self.storage.mkdir_all(&folder_root)?;
        let parent = path::parent(&original);
        let target_parent = if parent.is_empty() || self.storage.is_dir(&path::join(&folder_root, parent)) {
            parent
        } else if self.settings.restore_recreates_parents {
            log::debug!("Recreating {} in folder {} for restore", parent, folder_id);
            self.storage.mkdir_all(&path::join(&folder_root, parent))?;
            parent
        } else {
            log::debug!("{} is gone from folder {}, restoring to the folder root", parent, folder_id);
            ""
        };

        let wanted = path::join(target_parent, path::basename(&original));
        let restored = path::first_free_name(&wanted, |candidate| {
            self.storage.exists(&path::join(&folder_root, candidate))
        });
        let target = path::join(&folder_root, &restored);
        self.storage
            .move_from(self.storage.as_ref(), &source, &target)
            .map_err(|e| TrashError::TrashOperation(format!("restoring {source} to {target}: {e}")))?;

        if leaf.is_record_root() {
            self.db
                .remove_record(folder_id, &leaf.record.name, leaf.record.deleted_time)?;
            self.prune_placeholders(&leaf.trash_root, &leaf.record.node_path())?;
        }
        log::info!("Restored {} in folder {} to {}", original, folder_id, restored);
        Ok(restored)
    }

    // ── Removal ─────────────────────────────────────────────

    pub fn remove(&self, user: &str, entry: &TrashEntry) -> TrashResult<()> {
        self.check_trash_area(entry)?;
        match entry {
            TrashEntry::Leaf(leaf) => self.remove_leaf(user, leaf),
            TrashEntry::Virtual(dir) => {
                for leaf in self.virtual_batch(user, dir)? {
                    self.remove_leaf(user, &leaf)?;
                }
                Ok(())
            }
        }
    }

    fn remove_leaf(&self, user: &str, leaf: &LeafTrashEntry) -> TrashResult<()> {
        let original = leaf.original_location();
        self.gate
            .require(user, leaf.folder_id, &original, Permissions::DELETE)?;
        if !self.storage.exists(&leaf.trash_path()) {
            return Err(TrashError::NotFound(format!("trash node {}", leaf.trash_path())));
        }
        self.purge_node(&leaf.record, &leaf.sub_path)?;
        log::info!("Purged {} from the trash of folder {}", original, leaf.folder_id);
        Ok(())
    }

    /// Unlink a trash node and everything tied to it. Returns the bytes freed.
    pub(crate) fn purge_node(&self, record: &TrashRecord, sub_path: &str) -> TrashResult<u64> {
        let trash_root = self.trash_root(record.folder_id);
        let full = path::join(&trash_root, &path::join(&record.node_path(), sub_path));
        let size = self.storage.size(&full).unwrap_or(0);
        let file_id = match record.backing_file_id.filter(|_| sub_path.is_empty()) {
            Some(id) => Some(id),
            None => self.file_id_at(&full)?,
        };

        self.storage
            .unlink(&full)
            .map_err(|e| TrashError::TrashOperation(format!("removing {full}: {e}")))?;
        self.forget(&full)?;
        if sub_path.is_empty() {
            self.db
                .remove_record(record.folder_id, &record.name, record.deleted_time)?;
            self.prune_placeholders(&trash_root, &record.node_path())?;
        }
        if let (Some(versions), Some(file_id)) = (&self.versions, file_id) {
            versions.delete_all_versions(record.folder_id, file_id)?;
        }
        Ok(size)
    }

    /// Readable records at or under a virtual directory, shallowest first, then oldest first.
    fn virtual_batch(&self, user: &str, dir: &VirtualTrashDirectory) -> TrashResult<Vec<LeafTrashEntry>> {
        let mut records: Vec<TrashRecord> = self
            .db
            .list_records(&[dir.folder_id])?
            .into_iter()
            .filter(|r| path::is_at_or_under(&r.original_location, &dir.location))
            .filter(|r| self.gate.can_read(user, dir.folder_id, &r.original_location))
            .collect();
        if records.is_empty() {
            return Err(TrashError::NotFound(format!(
                "nothing left under {} in folder {}",
                dir.location, dir.folder_id
            )));
        }
        records.sort_by_key(|r| (path::depth(&r.original_location), r.deleted_time, r.record_id));
        Ok(records
            .into_iter()
            .map(|record| self.record_leaf(&dir.mount_point, record, String::new()))
            .collect())
    }

    fn record_leaf(&self, mount_point: &str, record: TrashRecord, sub_path: String) -> LeafTrashEntry {
        let trash_root = self.trash_root(record.folder_id);
        let full = path::join(&trash_root, &path::join(&record.node_path(), &sub_path));
        LeafTrashEntry {
            folder_id: record.folder_id,
            mount_point: mount_point.to_string(),
            is_dir: self.storage.is_dir(&full),
            size: self.storage.size(&full).unwrap_or(0),
            trash_root,
            record,
            sub_path,
        }
    }

    /// Empty a folder's trash: every node, index entry and ledger row.
    pub fn clean_trash_folder(&self, folder_id: FolderId) -> TrashResult<()> {
        let trash_root = self.trash_root(folder_id);
        if self.storage.exists(&trash_root) {
            for child in self.storage.list_dir(&trash_root)? {
                let node = path::join(&trash_root, &child);
                self.storage
                    .unlink(&node)
                    .map_err(|e| TrashError::TrashOperation(format!("removing {node}: {e}")))?;
                self.forget(&node)?;
            }
        }
        let purged = self.db.purge_all_for_folder(folder_id)?;
        log::info!("Cleaned trash of folder {} ({} records)", folder_id, purged);
        Ok(())
    }

    // ── Lookup ──────────────────────────────────────────────

    /// Resolve a metadata-index id to a trash node the user may read.
    pub fn lookup_trash_node_by_backing_id(&self, user: &str, file_id: FileId) -> TrashResult<Option<TrashNode>> {
        let Some(cache) = self.storage.cache() else {
            return Ok(None);
        };
        let Some(full) = cache.path_by_id(file_id)? else {
            return Ok(None);
        };
        let trash_base = path::join(&path::normalize(&self.settings.groupfolders_dir), "trash");
        let Some(relative) = path::relative_to(&full, &trash_base) else {
            return Ok(None);
        };
        let (folder_part, node_path) = path::split_first(relative);
        let Ok(folder_id) = folder_part.parse::<FolderId>() else {
            return Ok(None);
        };
        if node_path.is_empty() {
            return Ok(None);
        }

        let record = match self.db.record_by_backing_file_id(file_id)? {
            Some(r) if r.folder_id == folder_id && path::is_at_or_under(node_path, &r.node_path()) => Some(r),
            _ => self.owning_record(folder_id, node_path)?,
        };
        let Some(record) = record else {
            return Ok(None);
        };
        let Some(mount) = self.gate.visible_mount(user, folder_id) else {
            return Ok(None);
        };
        let sub_path = path::relative_to(node_path, &record.node_path())
            .unwrap_or_default()
            .to_string();
        let entry = self.record_leaf(&mount.mount_point, record, sub_path);
        if !self.gate.can_read(user, folder_id, &entry.original_location()) {
            return Ok(None);
        }
        Ok(Some(TrashNode { file_id, entry }))
    }

    /// The record whose node contains `node_path`, deepest first. Placeholders have none.
    fn owning_record(&self, folder_id: FolderId, node_path: &str) -> TrashResult<Option<TrashRecord>> {
        let (first, _) = path::split_first(node_path);
        let Some((first_name, deleted_time)) = path::parse_trash_entry_name(first) else {
            return Ok(None);
        };
        Ok(self
            .db
            .list_records(&[folder_id])?
            .into_iter()
            .filter(|r| r.deleted_time == deleted_time)
            .filter(|r| path::split_first(&r.original_location).0 == first_name)
            .filter(|r| path::is_at_or_under(node_path, &r.node_path()))
            .max_by_key(|r| path::depth(&r.original_location)))
    }

    // ── Housekeeping ────────────────────────────────────────

    /// Split records into those whose node still exists and drop the rest from the ledger.
    pub(crate) fn drop_stale_records(&self, folder_id: FolderId, records: Vec<TrashRecord>) -> TrashResult<(Vec<TrashRecord>, usize)> {
        let trash_root = self.trash_root(folder_id);
        let mut live = Vec::with_capacity(records.len());
        let mut dropped = 0;
        for record in records {
            if self.storage.exists(&path::join(&trash_root, &record.node_path())) {
                live.push(record);
                continue;
            }
            log::warn!(
                "Dropping ledger row for {} in folder {}: trash node is gone",
                record.original_location,
                folder_id
            );
            self.db
                .remove_record(folder_id, &record.name, record.deleted_time)?;
            dropped += 1;
        }
        Ok((live, dropped))
    }

    /// Remove now-empty placeholder directories above a record's node.
    fn prune_placeholders(&self, trash_root: &str, node_path: &str) -> TrashResult<()> {
        let mut dir = path::parent(node_path).to_string();
        while !dir.is_empty() {
            let full = path::join(trash_root, &dir);
            match self.storage.list_dir(&full) {
                Ok(children) if children.is_empty() => {
                    self.storage.unlink(&full)?;
                    self.forget(&full)?;
                    log::debug!("Pruned trash placeholder {}", full);
                }
                _ => break,
            }
            dir = path::parent(&dir).to_string();
        }
        Ok(())
    }

    fn forget(&self, at: &str) -> TrashResult<()> {
        if let Some(cache) = self.storage.cache() {
            cache.remove_entry(at)?;
        }
        Ok(())
    }

    fn file_id_at(&self, at: &str) -> TrashResult<Option<FileId>> {
        match self.storage.cache() {
            Some(cache) => Ok(cache.id_for_path(at)?),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PermissionMask;
    use crate::testing::Fixture;

    #[test]
    fn test_move_to_trash_and_restore_round_trip() {
        let fx = Fixture::new();
        let file_id = fx.write(1, "docs/report.txt", b"quarterly");

        assert!(fx.trash(1, "docs/report.txt", 1000));
        assert!(!fx.exists(1, "docs/report.txt"));

        let records = fx.db.list_records(&[1]).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "report.txt");
        assert_eq!(records[0].original_location, "docs/report.txt");
        assert_eq!(records[0].backing_file_id, Some(file_id));
        assert!(fx.storage.exists("__groupfolders/trash/1/docs.d1000/report.txt"));

        let root = fx.backend.list_trash_root("alice").unwrap();
        assert_eq!(root.len(), 1);
        assert!(root[0].is_virtual());
        let inside = fx.backend.list_entry("alice", &root[0]).unwrap();
        assert_eq!(inside.len(), 1);
        assert_eq!(inside[0].name(), "report.txt");

        fx.backend.restore("alice", &inside[0]).unwrap();
        assert_eq!(fx.read(1, "docs/report.txt"), b"quarterly");
        assert!(fx.db.list_records(&[1]).unwrap().is_empty());
        assert!(!fx.storage.exists("__groupfolders/trash/1/docs.d1000"));
        // The file keeps its identity through trash and back.
        let cache = fx.storage.cache().unwrap();
        assert_eq!(
            cache.path_by_id(file_id).unwrap().as_deref(),
            Some("__groupfolders/1/docs/report.txt")
        );
    }

    #[test]
    fn test_move_to_trash_not_applicable() {
        let fx = Fixture::new();
        fx.write(1, "a.txt", b"a");
        let plain: Arc<dyn Storage> = fx.storage.clone();
        assert!(!fx.backend.move_to_trash(&plain, "__groupfolders/1/a.txt").unwrap());

        let folder = fx.backend.folder_storage(1);
        assert!(!fx.backend.move_to_trash(&folder, "missing.txt").unwrap());
        assert!(!fx.backend.move_to_trash(&folder, "").unwrap());

        let read_only: Arc<dyn Storage> = Arc::new(PermissionMask::new(folder, Permissions::READ));
        assert!(!fx.backend.move_to_trash(&read_only, "a.txt").unwrap());
        assert!(fx.exists(1, "a.txt"));
        assert!(fx.db.list_records(&[1]).unwrap().is_empty());
    }

    #[test]
    fn test_move_to_trash_through_jail_records_folder_path() {
        let fx = Fixture::new();
        fx.write(1, "projects/q1/plan.md", b"plan");
        let projects: Arc<dyn Storage> = Arc::new(Jail::new(fx.backend.folder_storage(1), "projects"));

        assert!(fx.backend.move_to_trash_at(&projects, "q1/plan.md", 50).unwrap());
        let records = fx.db.list_records(&[1]).unwrap();
        assert_eq!(records[0].original_location, "projects/q1/plan.md");
        assert!(fx.storage.exists("__groupfolders/trash/1/projects.d50/q1/plan.md"));
    }

    #[test]
    fn test_same_second_deletions_get_distinct_slots() {
        let fx = Fixture::new();
        fx.write(1, "a.txt", b"1");
        assert!(fx.trash(1, "a.txt", 10));
        fx.write(1, "a.txt", b"2");
        assert!(fx.trash(1, "a.txt", 10));

        let times: Vec<i64> = fx.db.list_records(&[1]).unwrap().iter().map(|r| r.deleted_time).collect();
        assert_eq!(times, vec![10, 11]);
    }

    #[test]
    fn test_nested_deletion_does_not_land_in_trashed_directory() {
        let fx = Fixture::new();
        fx.write(1, "a/keep.txt", b"k");
        assert!(fx.trash(1, "a", 10));
        fx.write(1, "a/b.txt", b"b");
        assert!(fx.trash(1, "a/b.txt", 10));

        let records = fx.db.list_records(&[1]).unwrap();
        assert_eq!(records[1].original_location, "a/b.txt");
        assert_eq!(records[1].deleted_time, 11);
        assert!(!fx.storage.exists("__groupfolders/trash/1/a.d10/b.txt"));
    }

    #[test]
    fn test_same_second_deletion_below_trashed_subdirectory() {
        let fx = Fixture::new();
        fx.write(1, "a/b/keep.txt", b"k");
        assert!(fx.trash(1, "a/b", 10));
        fx.write(1, "a/b/x.txt", b"x");
        assert!(fx.trash(1, "a/b/x.txt", 10));

        let records = fx.db.list_records(&[1]).unwrap();
        assert_eq!(records[1].original_location, "a/b/x.txt");
        assert_eq!(records[1].deleted_time, 11);
        assert!(!fx.storage.exists("__groupfolders/trash/1/a.d10/b/x.txt"));

        let listed: Vec<String> = fx
            .backend
            .list_trash_folder("alice", 1, "a/b")
            .unwrap()
            .iter()
            .map(TrashEntry::name)
            .collect();
        assert_eq!(listed, vec!["x.txt", "keep.txt"]);

        fx.backend.restore("alice", &fx.leaf_at(1, "a/b")).unwrap();
        let left = fx.db.list_records(&[1]).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].original_location, "a/b/x.txt");
        assert!(fx.storage.exists("__groupfolders/trash/1/a.d11/b/x.txt"));
    }

    #[test]
    fn test_failed_move_leaves_source_and_ledger_untouched() {
        let fx = Fixture::new();
        fx.write(1, "a/b/c.txt", b"c");
        fx.fail_index_moves();

        let view = fx.backend.folder_storage(1);
        assert!(matches!(
            fx.backend.move_to_trash_at(&view, "a/b/c.txt", 10),
            Err(TrashError::TrashOperation(_))
        ));
        assert_eq!(fx.read(1, "a/b/c.txt"), b"c");
        assert!(fx.db.list_records(&[1]).unwrap().is_empty());
        assert!(fx.storage.list_dir("__groupfolders/trash/1").unwrap().is_empty());
    }

    #[test]
    fn test_restore_collisions_are_numbered() {
        let fx = Fixture::new();
        for (i, contents) in [b"one", b"two"].iter().enumerate() {
            fx.write(1, "doc.txt", *contents);
            assert!(fx.trash(1, "doc.txt", 100 + i as i64));
        }
        fx.write(1, "doc.txt", b"current");

        for entry in fx.backend.list_trash_root("alice").unwrap() {
            fx.backend.restore("alice", &entry).unwrap();
        }
        assert_eq!(fx.read(1, "doc.txt"), b"current");
        assert_eq!(fx.read(1, "doc (1).txt"), b"two");
        assert_eq!(fx.read(1, "doc (2).txt"), b"one");
    }

    #[test]
    fn test_restore_falls_back_to_folder_root() {
        let fx = Fixture::new();
        fx.write(1, "gone/deeper/a.txt", b"a");
        assert!(fx.trash(1, "gone/deeper/a.txt", 5));
        fx.storage.unlink("__groupfolders/1/gone").unwrap();

        let leaf = fx.leaf_at(1, "gone/deeper/a.txt");
        fx.backend.restore("alice", &leaf).unwrap();
        assert_eq!(fx.read(1, "a.txt"), b"a");
    }

    #[test]
    fn test_restore_recreates_parents_when_configured() {
        let settings = TrashSettings {
            restore_recreates_parents: true,
            ..TrashSettings::default()
        };
        let fx = Fixture::with_settings(settings);
        fx.write(1, "gone/deeper/a.txt", b"a");
        assert!(fx.trash(1, "gone/deeper/a.txt", 5));
        fx.storage.unlink("__groupfolders/1/gone").unwrap();

        let leaf = fx.leaf_at(1, "gone/deeper/a.txt");
        fx.backend.restore("alice", &leaf).unwrap();
        assert_eq!(fx.read(1, "gone/deeper/a.txt"), b"a");
        let cache = fx.storage.cache().unwrap();
        assert!(cache.get("__groupfolders/1/gone/deeper").unwrap().unwrap().is_dir());
    }

    #[test]
    fn test_failed_restore_keeps_record_and_node() {
        let fx = Fixture::new();
        fx.write(1, "a.txt", b"a");
        assert!(fx.trash(1, "a.txt", 10));
        let leaf = fx.leaf_at(1, "a.txt");
        fx.fail_index_moves();

        assert!(matches!(fx.backend.restore("alice", &leaf), Err(TrashError::TrashOperation(_))));
        assert!(!fx.exists(1, "a.txt"));
        assert!(fx.storage.exists("__groupfolders/trash/1/a.txt.d10"));
        assert_eq!(fx.db.list_records(&[1]).unwrap().len(), 1);
    }

    #[test]
    fn test_restore_into_blocked_parent_keeps_record() {
        let settings = TrashSettings {
            restore_recreates_parents: true,
            ..TrashSettings::default()
        };
        let fx = Fixture::with_settings(settings);
        fx.write(1, "gone/a.txt", b"a");
        assert!(fx.trash(1, "gone/a.txt", 5));
        fx.storage.unlink("__groupfolders/1/gone").unwrap();
        fx.write(1, "gone", b"now a file");

        let leaf = fx.leaf_at(1, "gone/a.txt");
        assert!(fx.backend.restore("alice", &leaf).is_err());
        assert_eq!(fx.read(1, "gone"), b"now a file");
        assert!(fx.storage.exists("__groupfolders/trash/1/gone.d5/a.txt"));
        assert_eq!(fx.db.list_records(&[1]).unwrap().len(), 1);
    }

    #[test]
    fn test_virtual_directory_disappears_after_batch_restore() {
        let fx = Fixture::new();
        fx.write(1, "docs/a.txt", b"a");
        fx.write(1, "docs/sub/b.txt", b"b");
        assert!(fx.trash(1, "docs/sub/b.txt", 100));
        assert!(fx.trash(1, "docs/a.txt", 200));

        let root = fx.backend.list_trash_root("alice").unwrap();
        assert_eq!(root.len(), 1);
        assert_eq!(root[0].name(), "docs");
        assert_eq!(root[0].deleted_time(), Some(200));

        fx.backend.restore("alice", &root[0]).unwrap();
        assert_eq!(fx.read(1, "docs/a.txt"), b"a");
        assert_eq!(fx.read(1, "docs/sub/b.txt"), b"b");
        assert!(fx.backend.list_trash_root("alice").unwrap().is_empty());
        assert!(fx.storage.list_dir("__groupfolders/trash/1").unwrap().is_empty());
    }

    #[test]
    fn test_batch_skips_unreadable_records() {
        let fx = Fixture::new();
        fx.directory.grant_folder("bob", 1, Permissions::all());
        fx.directory.grant_path("bob", 1, "docs/private", Permissions::empty());
        fx.write(1, "docs/public/a.txt", b"a");
        fx.write(1, "docs/private/b.txt", b"b");
        assert!(fx.trash(1, "docs/public/a.txt", 10));
        assert!(fx.trash(1, "docs/private/b.txt", 20));

        let root = fx.backend.list_trash_root("bob").unwrap();
        assert_eq!(root[0].deleted_time(), Some(10));
        fx.backend.remove("bob", &root[0]).unwrap();

        let left = fx.db.list_records(&[1]).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].original_location, "docs/private/b.txt");
    }

    #[test]
    fn test_browse_and_restore_inside_trashed_directory() {
        let fx = Fixture::new();
        fx.write(1, "album/one.jpg", b"1");
        fx.write(1, "album/two.jpg", b"22");
        assert!(fx.trash(1, "album", 30));

        let root = fx.backend.list_trash_root("alice").unwrap();
        assert!(!root[0].is_virtual());
        assert!(root[0].is_dir());
        let inside = fx.backend.list_entry("alice", &root[0]).unwrap();
        assert_eq!(inside.len(), 2);
        assert!(matches!(
            fx.backend.list_entry("alice", &inside[0]),
            Err(TrashError::InvalidOperation(_))
        ));

        let one = inside.iter().find(|e| e.name() == "one.jpg").unwrap();
        fx.backend.restore("alice", one).unwrap();
        // The album itself was not restored, so the photo lands at the folder root.
        assert_eq!(fx.read(1, "one.jpg"), b"1");
        assert_eq!(fx.db.list_records(&[1]).unwrap().len(), 1);

        let remaining = fx.backend.list_entry("alice", &root[0]).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name(), "two.jpg");
    }

    #[test]
    fn test_permission_denied_before_mutation() {
        let fx = Fixture::new();
        fx.directory.grant_folder("reader", 1, Permissions::READ);
        fx.write(1, "a.txt", b"a");
        assert!(fx.trash(1, "a.txt", 10));

        let root = fx.backend.list_trash_root("reader").unwrap();
        assert_eq!(root.len(), 1);
        assert!(matches!(fx.backend.restore("reader", &root[0]), Err(TrashError::Permission(_))));
        assert!(matches!(fx.backend.remove("reader", &root[0]), Err(TrashError::Permission(_))));
        assert!(fx.storage.exists("__groupfolders/trash/1/a.txt.d10"));
        assert_eq!(fx.db.list_records(&[1]).unwrap().len(), 1);

        assert!(fx.backend.list_trash_root("stranger").unwrap().is_empty());
        assert!(matches!(
            fx.backend.list_trash_folder("stranger", 1, ""),
            Err(TrashError::Permission(_))
        ));
    }

    #[test]
    fn test_entry_from_other_trash_area_is_rejected() {
        let fx = Fixture::new();
        fx.write(1, "a.txt", b"a");
        assert!(fx.trash(1, "a.txt", 10));
        let mut leaf = fx.leaf_at(1, "a.txt");
        if let TrashEntry::Leaf(inner) = &mut leaf {
            inner.trash_root = "__groupfolders/trash/2".to_string();
        }
        assert!(matches!(fx.backend.restore("alice", &leaf), Err(TrashError::InvalidOperation(_))));
    }

    #[test]
    fn test_remove_purges_node_record_and_versions() {
        let fx = Fixture::new();
        let file_id = fx.write(1, "docs/a.txt", b"abc");
        assert!(fx.trash(1, "docs/a.txt", 10));

        let leaf = fx.leaf_at(1, "docs/a.txt");
        fx.backend.remove("alice", &leaf).unwrap();
        assert!(fx.db.list_records(&[1]).unwrap().is_empty());
        assert!(fx.storage.list_dir("__groupfolders/trash/1").unwrap().is_empty());
        assert!(fx.storage.cache().unwrap().path_by_id(file_id).unwrap().is_none());
        assert_eq!(fx.versions.deleted(), vec![(1, file_id)]);

        assert!(matches!(fx.backend.remove("alice", &leaf), Err(TrashError::NotFound(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_unlink_keeps_ledger_row() {
        let fx = Fixture::new();
        fx.write(1, "docs/a.txt", b"a");
        assert!(fx.trash(1, "docs/a.txt", 10));
        let leaf = fx.leaf_at(1, "docs/a.txt");
        let Some(_frozen) = fx.read_only_dir("__groupfolders/trash/1/docs.d10") else {
            return;
        };

        assert!(matches!(fx.backend.remove("alice", &leaf), Err(TrashError::TrashOperation(_))));
        assert!(fx.storage.exists("__groupfolders/trash/1/docs.d10/a.txt"));
        assert_eq!(fx.db.list_records(&[1]).unwrap().len(), 1);
        assert!(fx.versions.deleted().is_empty());
    }

    #[test]
    fn test_browse_trashed_directory_shows_only_its_own_node() {
        let fx = Fixture::new();
        fx.write(1, "docs/old.txt", b"o");
        assert!(fx.trash(1, "docs", 300));
        fx.write(1, "docs/new.txt", b"n");
        assert!(fx.trash(1, "docs", 400));

        let root = fx.backend.list_trash_root("alice").unwrap();
        assert_eq!(root.len(), 2);
        let older = root.iter().find(|e| e.deleted_time() == Some(300)).unwrap();
        let inside = fx.backend.list_entry("alice", older).unwrap();
        assert_eq!(inside.len(), 1);
        assert_eq!(inside[0].name(), "old.txt");
        assert_eq!(inside[0].deleted_time(), Some(300));

        assert!(matches!(
            fx.backend.list_entry("stranger", older),
            Err(TrashError::Permission(_))
        ));
    }

    #[test]
    fn test_clean_trash_folder_leaves_nothing() {
        let fx = Fixture::new();
        fx.write(1, "a.txt", b"a");
        fx.write(1, "x/y/z.txt", b"z");
        assert!(fx.trash(1, "a.txt", 1));
        assert!(fx.trash(1, "x/y/z.txt", 2));

        fx.backend.clean_trash_folder(1).unwrap();
        assert!(fx.db.list_records(&[1]).unwrap().is_empty());
        assert!(fx.storage.list_dir("__groupfolders/trash/1").unwrap().is_empty());
        assert!(fx.backend.list_trash_root("alice").unwrap().is_empty());
    }

    #[test]
    fn test_lookup_by_backing_id() {
        let fx = Fixture::new();
        let track_id = fx.write(1, "music/album/track.mp3", b"mp3");
        let album_id = fx.storage.cache().unwrap().id_for_path("__groupfolders/1/music/album").unwrap().unwrap();
        assert!(fx.trash(1, "music/album", 40));

        let node = fx.backend.lookup_trash_node_by_backing_id("alice", album_id).unwrap().unwrap();
        assert!(node.entry.is_record_root());
        assert_eq!(node.entry.original_location(), "music/album");

        let track = fx.backend.lookup_trash_node_by_backing_id("alice", track_id).unwrap().unwrap();
        assert_eq!(track.entry.sub_path, "track.mp3");
        assert_eq!(track.entry.original_location(), "music/album/track.mp3");

        assert!(fx.backend.lookup_trash_node_by_backing_id("stranger", album_id).unwrap().is_none());
        assert!(fx.backend.lookup_trash_node_by_backing_id("alice", 987_654).unwrap().is_none());
        let placeholder = fx.storage.cache().unwrap().id_for_path("__groupfolders/trash/1/music.d40").unwrap().unwrap();
        assert!(fx.backend.lookup_trash_node_by_backing_id("alice", placeholder).unwrap().is_none());
    }
}
