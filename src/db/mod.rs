use rusqlite::{Connection, Result};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Identifier of a shared folder.
pub type FolderId = i64;

/// Identifier of an entry in the metadata index.
pub type FileId = i64;

pub struct Database {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Database {
    pub fn new(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let db = Self {
            conn: Mutex::new(conn),
            path: Some(db_path.to_path_buf()),
        };
        db.init_tables()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            path: None,
        };
        db.init_tables()?;
        Ok(db)
    }

    /// A poisoned lock only means another caller panicked mid-statement;
    /// every statement is atomic on its own, so the connection is still usable.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn init_tables(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS trash_items (
                trash_id            INTEGER PRIMARY KEY AUTOINCREMENT,
                folder_id           INTEGER NOT NULL,
                name                TEXT NOT NULL,
                deleted_time        INTEGER NOT NULL,
                original_location   TEXT NOT NULL,
                file_id             INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_trash_folder ON trash_items(folder_id, deleted_time);
            CREATE INDEX IF NOT EXISTS idx_trash_item ON trash_items(folder_id, name, deleted_time);
            CREATE INDEX IF NOT EXISTS idx_trash_file_id ON trash_items(file_id);

            CREATE TABLE IF NOT EXISTS file_cache (
                fileid      INTEGER PRIMARY KEY AUTOINCREMENT,
                storage     TEXT NOT NULL,
                path        TEXT NOT NULL,
                size        INTEGER NOT NULL DEFAULT 0,
                mtime       INTEGER NOT NULL,
                mimetype    TEXT NOT NULL,
                permissions INTEGER NOT NULL,
                UNIQUE (storage, path)
            );
            ",
        )?;
        Ok(())
    }
}

// ── Sub-modules ─────────────────────────────────────────────

mod file_cache;
mod models;
mod storage;
mod trash;

// ── Re-exports ──────────────────────────────────────────────

pub use models::{CacheEntry, FolderStats, LedgerStats, TrashRecord, DIRECTORY_MIMETYPE};
