//! Permission checks applied to every trash listing, restore and removal.

use std::sync::Arc;

use bitflags::bitflags;

use crate::db::FolderId;
use crate::error::{TrashError, TrashResult};
use crate::folders::{FolderMount, FolderRegistry};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
    pub struct Permissions: u32 {
        const READ = 0b0000_0001;
        const UPDATE = 0b0000_0010;
        const CREATE = 0b0000_0100;
        const DELETE = 0b0000_1000;
        const SHARE = 0b0001_0000;
    }
}

/// Per-path ACL lookups, scoped to a shared folder.
pub trait AccessOracle: Send + Sync {
    /// Effective permissions of `user` on the folder-relative `path`.
    fn permissions_for_path(&self, user: &str, folder_id: FolderId, path: &str) -> Permissions;
}

/// Combines the path ACL oracle with the folder-level permission bitmask.
#[derive(Clone)]
pub struct AccessGate {
    oracle: Arc<dyn AccessOracle>,
    registry: Arc<dyn FolderRegistry>,
}

impl AccessGate {
    pub fn new(oracle: Arc<dyn AccessOracle>, registry: Arc<dyn FolderRegistry>) -> Self {
        Self { oracle, registry }
    }

    /// The folder's mount as `user` sees it, if the folder is visible at all.
    pub fn visible_mount(&self, user: &str, folder_id: FolderId) -> Option<FolderMount> {
        self.registry
            .folders_for_user(user)
            .into_iter()
            .find(|f| f.folder_id == folder_id)
    }

    /// Path ACL only. Listings use this to filter entries.
    pub fn can_read(&self, user: &str, folder_id: FolderId, path: &str) -> bool {
        self.oracle
            .permissions_for_path(user, folder_id, path)
            .contains(Permissions::READ)
    }

    /// Both the path ACL and the folder bitmask must grant `wanted`.
    pub fn allows(&self, user: &str, folder_id: FolderId, path: &str, wanted: Permissions) -> bool {
        let on_path = self.oracle.permissions_for_path(user, folder_id, path);
        let on_folder = self.registry.folder_permissions_for_user(user, folder_id);
        on_path.contains(wanted) && on_folder.contains(wanted)
    }

    pub fn require(&self, user: &str, folder_id: FolderId, path: &str, wanted: Permissions) -> TrashResult<()> {
        if self.allows(user, folder_id, path, wanted) {
            Ok(())
        } else {
            Err(TrashError::Permission(format!(
                "{user} lacks {wanted:?} on {folder_id}/{path}"
            )))
        }
    }
}
