use std::sync::Arc;

use crate::acl::Permissions;
use crate::db::{CacheEntry, Database, FileId, DIRECTORY_MIMETYPE};
use crate::error::StorageResult;

/// Metadata recorded for an index entry.
#[derive(Debug, Clone)]
pub struct EntryData {
    pub size: u64,
    pub mtime: i64,
    pub mimetype: String,
    pub permissions: Permissions,
}

impl EntryData {
    pub fn directory(mtime: i64) -> Self {
        Self {
            size: 0,
            mtime,
            mimetype: DIRECTORY_MIMETYPE.to_string(),
            permissions: Permissions::all(),
        }
    }

    pub fn file(size: u64, mtime: i64) -> Self {
        Self {
            size,
            mtime,
            mimetype: "application/octet-stream".to_string(),
            permissions: Permissions::all(),
        }
    }
}

/// The metadata index of one storage, keyed by numeric file id.
#[derive(Clone)]
pub struct FileCache {
    db: Arc<Database>,
    storage_id: String,
}

impl FileCache {
    pub fn new(db: Arc<Database>, storage_id: impl Into<String>) -> Self {
        Self {
            db,
            storage_id: storage_id.into(),
        }
    }

    pub fn insert_entry(&self, path: &str, data: &EntryData) -> StorageResult<FileId> {
        Ok(self.db.cache_insert(
            &self.storage_id,
            path,
            data.size,
            data.mtime,
            &data.mimetype,
            data.permissions.bits(),
        )?)
    }

    /// Drop `path` and everything below it.
    pub fn remove_entry(&self, path: &str) -> StorageResult<()> {
        self.db.cache_remove(&self.storage_id, path)?;
        Ok(())
    }

    /// Take over the entries of `source_path` in `source`, keeping their ids.
    pub fn move_from(&self, source: &FileCache, source_path: &str, target_path: &str) -> StorageResult<()> {
        self.db
            .cache_move(&source.storage_id, source_path, &self.storage_id, target_path)?;
        Ok(())
    }

    pub fn get(&self, path: &str) -> StorageResult<Option<CacheEntry>> {
        Ok(self.db.cache_get(&self.storage_id, path)?)
    }

    pub fn id_for_path(&self, path: &str) -> StorageResult<Option<FileId>> {
        Ok(self.get(path)?.map(|entry| entry.file_id))
    }

    pub fn path_by_id(&self, file_id: FileId) -> StorageResult<Option<String>> {
        Ok(self.db.cache_path_by_id(&self.storage_id, file_id)?)
    }
}
