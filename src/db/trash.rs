use rusqlite::{params, params_from_iter, OptionalExtension, Result, Row};

use super::models::TrashRecord;
use super::{Database, FileId, FolderId};

const RECORD_COLUMNS: &str =
    "trash_id, folder_id, name, deleted_time, original_location, file_id";

fn record_from_row(row: &Row<'_>) -> Result<TrashRecord> {
    Ok(TrashRecord {
        record_id: row.get(0)?,
        folder_id: row.get(1)?,
        name: row.get(2)?,
        deleted_time: row.get(3)?,
        original_location: row.get(4)?,
        backing_file_id: row.get(5)?,
    })
}

impl Database {
    /// Insert a ledger row. Uniqueness of `(folder_id, name, deleted_time)`
    /// is the caller's responsibility.
    pub fn add_record(
        &self,
        folder_id: FolderId,
        name: &str,
        deleted_time: i64,
        original_location: &str,
        backing_file_id: Option<FileId>,
    ) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO trash_items (folder_id, name, deleted_time, original_location, file_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![folder_id, name, deleted_time, original_location, backing_file_id],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Delete the matching row(s). Removing a missing row is not an error.
    pub fn remove_record(&self, folder_id: FolderId, name: &str, deleted_time: i64) -> Result<usize> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM trash_items WHERE folder_id = ?1 AND name = ?2 AND deleted_time = ?3",
            params![folder_id, name, deleted_time],
        )
    }

    /// All rows of the given folders, oldest deletion first.
    pub fn list_records(&self, folder_ids: &[FolderId]) -> Result<Vec<TrashRecord>> {
        if folder_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; folder_ids.len()].join(", ");
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM trash_items
             WHERE folder_id IN ({placeholders})
             ORDER BY deleted_time ASC, trash_id ASC"
        ))?;
        let rows = stmt.query_map(params_from_iter(folder_ids.iter()), record_from_row)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Rows of a folder deleted in the same second, oldest row first.
    pub fn records_deleted_at(&self, folder_id: FolderId, deleted_time: i64) -> Result<Vec<TrashRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM trash_items
             WHERE folder_id = ?1 AND deleted_time = ?2
             ORDER BY trash_id"
        ))?;
        let rows = stmt.query_map(params![folder_id, deleted_time], record_from_row)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    pub fn record_by_backing_file_id(&self, file_id: FileId) -> Result<Option<TrashRecord>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {RECORD_COLUMNS} FROM trash_items WHERE file_id = ?1 ORDER BY trash_id LIMIT 1"),
            params![file_id],
            record_from_row,
        )
        .optional()
    }

    /// Folders that currently have at least one trashed item.
    pub fn distinct_folders_with_trash(&self) -> Result<Vec<FolderId>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT DISTINCT folder_id FROM trash_items ORDER BY folder_id")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    /// Most recent deletion time among rows located at or under `prefix`.
    /// An empty prefix covers the whole folder.
    pub fn latest_deletion_time_at_or_under(&self, folder_id: FolderId, prefix: &str) -> Result<Option<i64>> {
        let conn = self.conn();
        if prefix.is_empty() {
            return conn.query_row(
                "SELECT MAX(deleted_time) FROM trash_items WHERE folder_id = ?1",
                params![folder_id],
                |row| row.get(0),
            );
        }
        conn.query_row(
            "SELECT MAX(deleted_time) FROM trash_items
             WHERE folder_id = ?1
               AND (original_location = ?2
                    OR substr(original_location, 1, length(?2) + 1) = ?2 || '/')",
            params![folder_id, prefix],
            |row| row.get(0),
        )
    }

    /// Drop every row of a folder. Returns the number of rows deleted.
    pub fn purge_all_for_folder(&self, folder_id: FolderId) -> Result<usize> {
        let conn = self.conn();
        conn.execute("DELETE FROM trash_items WHERE folder_id = ?1", params![folder_id])
    }
}
