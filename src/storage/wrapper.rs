use std::path::PathBuf;
use std::sync::Arc;

use super::{PathRewrite, Storage};
use crate::acl::Permissions;
use crate::db::FolderId;
use crate::error::{StorageError, StorageResult};
use crate::path;

/// A view of another storage re-rooted at one of its directories.
pub struct Jail {
    inner: Arc<dyn Storage>,
    root: String,
}

impl Jail {
    pub fn new(inner: Arc<dyn Storage>, root: &str) -> Self {
        Self {
            inner,
            root: path::normalize(root),
        }
    }

    fn jailed(&self, p: &str) -> String {
        path::join(&self.root, &path::normalize(p))
    }
}

impl Storage for Jail {
    fn id(&self) -> String {
        format!("jail::{}::{}", self.inner.id(), self.root)
    }

    fn exists(&self, p: &str) -> bool {
        self.inner.exists(&self.jailed(p))
    }

    fn is_dir(&self, p: &str) -> bool {
        self.inner.is_dir(&self.jailed(p))
    }

    fn is_deletable(&self, p: &str) -> bool {
        // The jail root itself is never deletable through the jail.
        !path::normalize(p).is_empty() && self.inner.is_deletable(&self.jailed(p))
    }

    fn mkdir(&self, p: &str) -> StorageResult<()> {
        self.inner.mkdir(&self.jailed(p))
    }

    fn unlink(&self, p: &str) -> StorageResult<()> {
        self.inner.unlink(&self.jailed(p))
    }

    fn size(&self, p: &str) -> StorageResult<u64> {
        self.inner.size(&self.jailed(p))
    }

    fn list_dir(&self, p: &str) -> StorageResult<Vec<String>> {
        self.inner.list_dir(&self.jailed(p))
    }

    fn move_from(&self, source: &dyn Storage, source_path: &str, target_path: &str) -> StorageResult<()> {
        self.inner.move_from(source, source_path, &self.jailed(target_path))
    }

    fn local_path(&self, p: &str) -> Option<PathBuf> {
        self.inner.local_path(&self.jailed(p))
    }

    fn folder_id(&self) -> Option<FolderId> {
        self.inner.folder_id()
    }

    fn wrapped(&self) -> Option<(Arc<dyn Storage>, PathRewrite)> {
        Some((Arc::clone(&self.inner), PathRewrite::Rebase(self.root.clone())))
    }
}

/// Marks the root of a shared folder. Paths pass through unchanged.
pub struct GroupFolderStorage {
    inner: Arc<dyn Storage>,
    folder_id: FolderId,
}

impl GroupFolderStorage {
    pub fn new(inner: Arc<dyn Storage>, folder_id: FolderId) -> Self {
        Self { inner, folder_id }
    }
}

impl Storage for GroupFolderStorage {
    fn id(&self) -> String {
        format!("groupfolder::{}", self.folder_id)
    }

    fn exists(&self, p: &str) -> bool {
        self.inner.exists(p)
    }

    fn is_dir(&self, p: &str) -> bool {
        self.inner.is_dir(p)
    }

    fn is_deletable(&self, p: &str) -> bool {
        self.inner.is_deletable(p)
    }

    fn mkdir(&self, p: &str) -> StorageResult<()> {
        self.inner.mkdir(p)
    }

    fn unlink(&self, p: &str) -> StorageResult<()> {
        self.inner.unlink(p)
    }

    fn size(&self, p: &str) -> StorageResult<u64> {
        self.inner.size(p)
    }

    fn list_dir(&self, p: &str) -> StorageResult<Vec<String>> {
        self.inner.list_dir(p)
    }

    fn move_from(&self, source: &dyn Storage, source_path: &str, target_path: &str) -> StorageResult<()> {
        self.inner.move_from(source, source_path, target_path)
    }

    fn local_path(&self, p: &str) -> Option<PathBuf> {
        self.inner.local_path(p)
    }

    fn folder_id(&self) -> Option<FolderId> {
        Some(self.folder_id)
    }

    fn is_folder_root(&self) -> bool {
        true
    }

    fn wrapped(&self) -> Option<(Arc<dyn Storage>, PathRewrite)> {
        Some((Arc::clone(&self.inner), PathRewrite::Identity))
    }
}

/// Restricts what can be done through a storage, e.g. for a read-only share.
pub struct PermissionMask {
    inner: Arc<dyn Storage>,
    mask: Permissions,
}

impl PermissionMask {
    pub fn new(inner: Arc<dyn Storage>, mask: Permissions) -> Self {
        Self { inner, mask }
    }

    fn check(&self, wanted: Permissions, p: &str) -> StorageResult<()> {
        if self.mask.contains(wanted) {
            Ok(())
        } else {
            Err(StorageError::Denied(format!("{wanted:?} on {p}")))
        }
    }
}

impl Storage for PermissionMask {
    fn id(&self) -> String {
        format!("mask::{}::{}", self.inner.id(), self.mask.bits())
    }

    fn exists(&self, p: &str) -> bool {
        self.inner.exists(p)
    }

    fn is_dir(&self, p: &str) -> bool {
        self.inner.is_dir(p)
    }

    fn is_deletable(&self, p: &str) -> bool {
        self.mask.contains(Permissions::DELETE) && self.inner.is_deletable(p)
    }

    fn mkdir(&self, p: &str) -> StorageResult<()> {
        self.check(Permissions::CREATE, p)?;
        self.inner.mkdir(p)
    }

    fn unlink(&self, p: &str) -> StorageResult<()> {
        self.check(Permissions::DELETE, p)?;
        self.inner.unlink(p)
    }

    fn size(&self, p: &str) -> StorageResult<u64> {
        self.inner.size(p)
    }

    fn list_dir(&self, p: &str) -> StorageResult<Vec<String>> {
        self.inner.list_dir(p)
    }

    fn move_from(&self, source: &dyn Storage, source_path: &str, target_path: &str) -> StorageResult<()> {
        self.check(Permissions::CREATE, target_path)?;
        self.inner.move_from(source, source_path, target_path)
    }

    fn local_path(&self, p: &str) -> Option<PathBuf> {
        self.inner.local_path(p)
    }

    fn folder_id(&self) -> Option<FolderId> {
        self.inner.folder_id()
    }

    fn wrapped(&self) -> Option<(Arc<dyn Storage>, PathRewrite)> {
        Some((Arc::clone(&self.inner), PathRewrite::Identity))
    }
}
