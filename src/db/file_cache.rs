use rusqlite::{params, OptionalExtension, Result};

use super::models::CacheEntry;
use super::{Database, FileId};

// Subtree match: the path itself or anything below it.
const SUBTREE: &str = "(path = ?2 OR substr(path, 1, length(?2) + 1) = ?2 || '/')";

impl Database {
    /// Insert or refresh an index row. The file id of an existing row is kept.
    pub fn cache_insert(
        &self,
        storage: &str,
        path: &str,
        size: u64,
        mtime: i64,
        mimetype: &str,
        permissions: u32,
    ) -> Result<FileId> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO file_cache (storage, path, size, mtime, mimetype, permissions)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(storage, path) DO UPDATE SET
                size = excluded.size,
                mtime = excluded.mtime,
                mimetype = excluded.mimetype,
                permissions = excluded.permissions",
            params![storage, path, size as i64, mtime, mimetype, permissions],
        )?;
        conn.query_row(
            "SELECT fileid FROM file_cache WHERE storage = ?1 AND path = ?2",
            params![storage, path],
            |row| row.get(0),
        )
    }

    pub fn cache_get(&self, storage: &str, path: &str) -> Result<Option<CacheEntry>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT fileid, path, size, mtime, mimetype, permissions
             FROM file_cache WHERE storage = ?1 AND path = ?2",
            params![storage, path],
            |row| {
                let size: i64 = row.get(2)?;
                Ok(CacheEntry {
                    file_id: row.get(0)?,
                    path: row.get(1)?,
                    size: size.max(0) as u64,
                    mtime: row.get(3)?,
                    mimetype: row.get(4)?,
                    permissions: row.get(5)?,
                })
            },
        )
        .optional()
    }

    pub fn cache_path_by_id(&self, storage: &str, file_id: FileId) -> Result<Option<String>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT path FROM file_cache WHERE storage = ?1 AND fileid = ?2",
            params![storage, file_id],
            |row| row.get(0),
        )
        .optional()
    }

    /// Remove `path` and everything indexed below it.
    pub fn cache_remove(&self, storage: &str, path: &str) -> Result<usize> {
        let conn = self.conn();
        conn.execute(
            &format!("DELETE FROM file_cache WHERE storage = ?1 AND {SUBTREE}"),
            params![storage, path],
        )
    }

    /// Re-home a subtree, possibly across storages, keeping its file ids.
    pub fn cache_move(
        &self,
        source_storage: &str,
        source_path: &str,
        target_storage: &str,
        target_path: &str,
    ) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        // Stale rows at the destination would violate UNIQUE(storage, path).
        tx.execute(
            &format!("DELETE FROM file_cache WHERE storage = ?1 AND {SUBTREE}"),
            params![target_storage, target_path],
        )?;
        let moved = tx.execute(
            &format!(
                "UPDATE file_cache
                 SET storage = ?3, path = ?4 || substr(path, length(?2) + 1)
                 WHERE storage = ?1 AND {SUBTREE}"
            ),
            params![source_storage, source_path, target_storage, target_path],
        )?;
        tx.commit()?;
        Ok(moved)
    }
}
