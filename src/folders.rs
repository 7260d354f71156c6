//! Shared-folder registry and the collaborators the trash engine consults.

use std::sync::Arc;

use crate::acl::{AccessOracle, Permissions};
use crate::config::SharedFolder;
use crate::db::{FileId, FolderId};
use crate::error::TrashResult;
use crate::path;
use crate::storage::Storage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderMount {
    pub folder_id: FolderId,
    /// Display path of the folder relative to a user's root.
    pub mount_point: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderUsage {
    pub folder_id: FolderId,
    pub size: u64,
    /// Bytes; 0 or negative means unlimited.
    pub quota: i64,
}

impl FolderUsage {
    /// Whether the folder plus `trash_size` bytes of trash exceeds a finite quota.
    pub fn is_over_quota(&self, trash_size: u64) -> bool {
        self.quota > 0 && self.size.saturating_add(trash_size) > self.quota as u64
    }
}

pub trait FolderRegistry: Send + Sync {
    fn folders_for_user(&self, user: &str) -> Vec<FolderMount>;

    fn folder_permissions_for_user(&self, user: &str, folder_id: FolderId) -> Permissions;

    fn folders_with_usage(&self) -> Vec<FolderUsage>;
}

/// Version history kept alongside files; purged together with trashed files.
pub trait VersionStore: Send + Sync {
    fn delete_all_versions(&self, folder_id: FolderId, file_id: FileId) -> TrashResult<()>;
}

/// Registry and ACL oracle driven by the `folders` section of the configuration.
pub struct ConfigRegistry {
    folders: Vec<SharedFolder>,
    storage: Arc<dyn Storage>,
    groupfolders_dir: String,
}

impl ConfigRegistry {
    pub fn new(folders: Vec<SharedFolder>, storage: Arc<dyn Storage>, groupfolders_dir: &str) -> Self {
        Self {
            folders,
            storage,
            groupfolders_dir: path::normalize(groupfolders_dir),
        }
    }

    fn folder(&self, folder_id: FolderId) -> Option<&SharedFolder> {
        self.folders.iter().find(|f| f.id == folder_id)
    }

    fn member_permissions(folder: &SharedFolder, user: &str) -> Permissions {
        folder
            .members
            .iter()
            .filter(|m| m.user == user)
            .fold(Permissions::empty(), |acc, m| acc | m.permissions)
    }
}

impl FolderRegistry for ConfigRegistry {
    fn folders_for_user(&self, user: &str) -> Vec<FolderMount> {
        self.folders
            .iter()
            .filter(|f| !Self::member_permissions(f, user).is_empty())
            .map(|f| FolderMount {
                folder_id: f.id,
                mount_point: f.mount_point.clone(),
            })
            .collect()
    }

    fn folder_permissions_for_user(&self, user: &str, folder_id: FolderId) -> Permissions {
        self.folder(folder_id)
            .map(|f| Self::member_permissions(f, user))
            .unwrap_or_else(Permissions::empty)
    }

    fn folders_with_usage(&self) -> Vec<FolderUsage> {
        self.folders
            .iter()
            .map(|f| {
                let root = path::join(&self.groupfolders_dir, &f.id.to_string());
                FolderUsage {
                    folder_id: f.id,
                    size: self.storage.size(&root).unwrap_or(0),
                    quota: f.quota,
                }
            })
            .collect()
    }
}

impl AccessOracle for ConfigRegistry {
    /// The most specific ACL rule of the user wins; without one, the folder grant applies.
    fn permissions_for_path(&self, user: &str, folder_id: FolderId, target: &str) -> Permissions {
        let Some(folder) = self.folder(folder_id) else {
            return Permissions::empty();
        };
        let target = path::normalize(target);
        folder
            .acl
            .iter()
            .filter(|rule| rule.user == user)
            .filter(|rule| path::is_at_or_under(&target, &path::normalize(&rule.path)))
            .max_by_key(|rule| path::depth(&rule.path))
            .map(|rule| rule.permissions)
            .unwrap_or_else(|| Self::member_permissions(folder, user))
    }
}
