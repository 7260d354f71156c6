use rusqlite::Result;

use super::models::{FolderStats, LedgerStats};
use super::Database;

impl Database {
    /// Get the on-disk size of the database file in bytes. In-memory databases report 0.
    pub fn get_db_file_size(&self) -> u64 {
        self.path()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// Row counts and per-folder deletion time range.
    pub fn ledger_stats(&self) -> Result<LedgerStats> {
        let db_size_bytes = self.get_db_file_size();
        let conn = self.conn();

        let record_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM trash_items", [], |row| row.get(0))?;
        let cache_entry_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM file_cache", [], |row| row.get(0))?;

        let mut stmt = conn.prepare(
            "SELECT folder_id, COUNT(*), MIN(deleted_time), MAX(deleted_time)
             FROM trash_items GROUP BY folder_id ORDER BY folder_id",
        )?;
        let rows = stmt.query_map([], |row| {
            let count: i64 = row.get(1)?;
            Ok(FolderStats {
                folder_id: row.get(0)?,
                record_count: count as u64,
                oldest_deleted_time: row.get(2)?,
                newest_deleted_time: row.get(3)?,
            })
        })?;
        let mut folders = Vec::new();
        for row in rows {
            folders.push(row?);
        }

        Ok(LedgerStats {
            db_size_bytes,
            record_count: record_count as u64,
            cache_entry_count: cache_entry_count as u64,
            folders,
        })
    }

    /// Reclaim space after large purges.
    pub fn vacuum(&self) -> Result<()> {
        self.conn().execute_batch("VACUUM")
    }
}
