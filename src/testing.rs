//! In-memory collaborators and a scratch backend for unit tests.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use crate::acl::{AccessOracle, Permissions};
use crate::backend::TrashBackend;
use crate::config::TrashSettings;
use crate::db::{Database, FileId, FolderId};
use crate::error::TrashResult;
use crate::folders::{FolderMount, FolderRegistry, FolderUsage, VersionStore};
use crate::path;
use crate::storage::{LocalStorage, Storage};
use crate::tree::TrashEntry;

#[derive(Default)]
struct DirectoryState {
    folders: Vec<(FolderMount, i64)>,
    usage: HashMap<FolderId, u64>,
    folder_grants: HashMap<(String, FolderId), Permissions>,
    path_grants: Vec<(String, FolderId, String, Permissions)>,
}

/// Folder registry and ACL oracle whose state tests mutate directly.
#[derive(Default)]
pub(crate) struct MemoryDirectory {
    state: Mutex<DirectoryState>,
}

impl MemoryDirectory {
    fn state(&self) -> std::sync::MutexGuard<'_, DirectoryState> {
        self.state.lock().unwrap()
    }

    pub fn add_folder(&self, folder_id: FolderId, mount_point: &str, quota: i64) {
        let mount = FolderMount {
            folder_id,
            mount_point: mount_point.to_string(),
        };
        self.state().folders.push((mount, quota));
    }

    pub fn grant_folder(&self, user: &str, folder_id: FolderId, permissions: Permissions) {
        self.state()
            .folder_grants
            .insert((user.to_string(), folder_id), permissions);
    }

    /// Override the folder grant for `path` and everything below it.
    pub fn grant_path(&self, user: &str, folder_id: FolderId, at: &str, permissions: Permissions) {
        self.state()
            .path_grants
            .push((user.to_string(), folder_id, at.to_string(), permissions));
    }

    pub fn set_usage(&self, folder_id: FolderId, size: u64) {
        self.state().usage.insert(folder_id, size);
    }
}

impl FolderRegistry for MemoryDirectory {
    fn folders_for_user(&self, user: &str) -> Vec<FolderMount> {
        let state = self.state();
        state
            .folders
            .iter()
            .filter(|(mount, _)| {
                state
                    .folder_grants
                    .get(&(user.to_string(), mount.folder_id))
                    .is_some_and(|p| !p.is_empty())
            })
            .map(|(mount, _)| mount.clone())
            .collect()
    }

    fn folder_permissions_for_user(&self, user: &str, folder_id: FolderId) -> Permissions {
        self.state()
            .folder_grants
            .get(&(user.to_string(), folder_id))
            .copied()
            .unwrap_or_else(Permissions::empty)
    }

    fn folders_with_usage(&self) -> Vec<FolderUsage> {
        let state = self.state();
        state
            .folders
            .iter()
            .map(|(mount, quota)| FolderUsage {
                folder_id: mount.folder_id,
                size: state.usage.get(&mount.folder_id).copied().unwrap_or(0),
                quota: *quota,
            })
            .collect()
    }
}

impl AccessOracle for MemoryDirectory {
    fn permissions_for_path(&self, user: &str, folder_id: FolderId, target: &str) -> Permissions {
        let folder = self.folder_permissions_for_user(user, folder_id);
        let state = self.state();
        state
            .path_grants
            .iter()
            .filter(|(u, f, at, _)| u == user && *f == folder_id && path::is_at_or_under(target, at))
            .max_by_key(|(_, _, at, _)| path::depth(at))
            .map(|(_, _, _, p)| *p)
            .unwrap_or(folder)
    }
}

/// Remembers every version purge it is asked for.
#[derive(Default)]
pub(crate) struct RecordingVersions {
    deleted: Mutex<Vec<(FolderId, FileId)>>,
}

impl RecordingVersions {
    pub fn deleted(&self) -> Vec<(FolderId, FileId)> {
        self.deleted.lock().unwrap().clone()
    }
}

impl VersionStore for RecordingVersions {
    fn delete_all_versions(&self, folder_id: FolderId, file_id: FileId) -> TrashResult<()> {
        self.deleted.lock().unwrap().push((folder_id, file_id));
        Ok(())
    }
}

/// A backend over a scratch directory with folder 1 ("Team"), fully granted to alice.
pub(crate) struct Fixture {
    pub _dir: TempDir,
    pub db: Arc<Database>,
    pub storage: Arc<LocalStorage>,
    pub directory: Arc<MemoryDirectory>,
    pub versions: Arc<RecordingVersions>,
    pub backend: TrashBackend,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_settings(TrashSettings::default())
    }

    pub fn with_settings(settings: TrashSettings) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let storage = Arc::new(LocalStorage::new(dir.path().join("files"), db.clone()).unwrap());
        let directory = Arc::new(MemoryDirectory::default());
        directory.add_folder(1, "Team", 0);
        directory.grant_folder("alice", 1, Permissions::all());
        let versions = Arc::new(RecordingVersions::default());

        let mut backend = TrashBackend::new(
            db.clone(),
            storage.clone(),
            directory.clone(),
            directory.clone(),
            settings,
        );
        backend.set_versions_backend(versions.clone());

        Self {
            _dir: dir,
            db,
            storage,
            directory,
            versions,
            backend,
        }
    }

    fn in_folder(&self, folder_id: FolderId, at: &str) -> String {
        path::join(&self.backend.folder_root(folder_id), at)
    }

    pub fn write(&self, folder_id: FolderId, at: &str, contents: &[u8]) -> FileId {
        self.storage.write_file(&self.in_folder(folder_id, at), contents).unwrap()
    }

    pub fn read(&self, folder_id: FolderId, at: &str) -> Vec<u8> {
        self.storage.read_file(&self.in_folder(folder_id, at)).unwrap()
    }

    pub fn exists(&self, folder_id: FolderId, at: &str) -> bool {
        self.storage.exists(&self.in_folder(folder_id, at))
    }

    /// Trash a folder item through the folder's storage view.
    pub fn trash(&self, folder_id: FolderId, at: &str, deleted_time: i64) -> bool {
        let view = self.backend.folder_storage(folder_id);
        self.backend.move_to_trash_at(&view, at, deleted_time).unwrap()
    }

    /// The listed entry whose original location is `location`, as seen by alice.
    pub fn leaf_at(&self, folder_id: FolderId, location: &str) -> TrashEntry {
        self.backend
            .list_trash_folder("alice", folder_id, path::parent(location))
            .unwrap()
            .into_iter()
            .find(|e| e.original_location() == location)
            .unwrap()
    }

    /// Make every metadata-index move fail from now on.
    pub fn fail_index_moves(&self) {
        self.db
            .conn()
            .execute_batch(
                "CREATE TRIGGER file_cache_frozen BEFORE UPDATE ON file_cache
                 BEGIN SELECT RAISE(ABORT, 'index unavailable'); END;",
            )
            .unwrap();
    }

    /// Make a storage directory read-only until the guard drops. None when
    /// the process ignores directory modes, as root does.
    #[cfg(unix)]
    pub fn read_only_dir(&self, at: &str) -> Option<ReadOnlyDir> {
        use std::os::unix::fs::PermissionsExt;

        let full = self.storage.local_path(at).unwrap();
        fs::set_permissions(&full, fs::Permissions::from_mode(0o555)).unwrap();
        let guard = ReadOnlyDir(full.clone());
        let check = full.join(".write-check");
        if fs::write(&check, b"").is_ok() {
            let _ = fs::remove_file(&check);
            return None;
        }
        Some(guard)
    }
}

pub(crate) struct ReadOnlyDir(PathBuf);

impl Drop for ReadOnlyDir {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&self.0, fs::Permissions::from_mode(0o755));
        }
    }
}
