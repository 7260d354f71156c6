use super::{FileId, FolderId};

pub const DIRECTORY_MIMETYPE: &str = "httpd/unix-directory";

/// One ledger row: a top-level trashed item.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TrashRecord {
    pub record_id: i64,
    pub folder_id: FolderId,
    /// Base name of the deleted item.
    pub name: String,
    /// Unix seconds.
    pub deleted_time: i64,
    /// Folder-relative path the item had when it was deleted.
    pub original_location: String,
    pub backing_file_id: Option<FileId>,
}

impl TrashRecord {
    /// Node location relative to the folder's trash root.
    pub fn node_path(&self) -> String {
        crate::path::record_node_path(&self.original_location, self.deleted_time)
    }
}

/// A row of the metadata index.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CacheEntry {
    pub file_id: FileId,
    pub path: String,
    pub size: u64,
    pub mtime: i64,
    pub mimetype: String,
    pub permissions: u32,
}

impl CacheEntry {
    pub fn is_dir(&self) -> bool {
        self.mimetype == DIRECTORY_MIMETYPE
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FolderStats {
    pub folder_id: FolderId,
    pub record_count: u64,
    pub oldest_deleted_time: i64,
    pub newest_deleted_time: i64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LedgerStats {
    pub db_size_bytes: u64,
    pub record_count: u64,
    pub cache_entry_count: u64,
    pub folders: Vec<FolderStats>,
}
