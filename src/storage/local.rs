use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use super::cache::{EntryData, FileCache};
use super::Storage;
use crate::db::{Database, FileId};
use crate::error::{StorageError, StorageResult};
use crate::path;

/// A storage backed by a directory on the host filesystem.
pub struct LocalStorage {
    root: PathBuf,
    id: String,
    cache: FileCache,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, db: Arc<Database>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let id = format!("local::{}", root.display());
        let cache = FileCache::new(db, id.clone());
        Ok(Self { root, id, cache })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lexically resolve a relative path below the root. Never touches the
    /// filesystem, so symlinks cannot be used to climb out either.
    fn full_path(&self, request: &str) -> StorageResult<PathBuf> {
        let req = Path::new(request);
        if req.is_absolute() {
            return Err(StorageError::InvalidPath(format!("absolute path {request}")));
        }

        let mut resolved = self.root.clone();
        for component in req.components() {
            match component {
                Component::Normal(p) => resolved.push(p),
                Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) | Component::RootDir => {
                    return Err(StorageError::InvalidPath(format!(
                        "{request} escapes the storage root"
                    )));
                }
            }
        }
        Ok(resolved)
    }

    /// Create `path` and any missing parents, indexing every directory created.
    pub fn mkdir_all(&self, dir: &str) -> StorageResult<()> {
        let mut current = String::new();
        for segment in path::segments(dir) {
            current = path::join(&current, segment);
            if !self.is_dir(&current) {
                self.mkdir(&current)?;
                self.cache
                    .insert_entry(&current, &EntryData::directory(Utc::now().timestamp()))?;
            }
        }
        Ok(())
    }

    /// Write a file (creating parents) and index it.
    pub fn write_file(&self, file: &str, contents: &[u8]) -> StorageResult<FileId> {
        let file = path::normalize(file);
        self.mkdir_all(path::parent(&file))?;
        fs::write(self.full_path(&file)?, contents)?;
        self.cache.insert_entry(
            &file,
            &EntryData::file(contents.len() as u64, Utc::now().timestamp()),
        )
    }

    pub fn read_file(&self, file: &str) -> StorageResult<Vec<u8>> {
        let full = self.full_path(file)?;
        fs::read(&full).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(file.to_string()),
            _ => StorageError::Io(e),
        })
    }

    /// Index whatever sits at `path` if it is not indexed yet.
    pub fn ensure_indexed(&self, at: &str) -> StorageResult<FileId> {
        if let Some(id) = self.cache.id_for_path(at)? {
            return Ok(id);
        }
        let now = Utc::now().timestamp();
        let data = if self.is_dir(at) {
            EntryData::directory(now)
        } else {
            EntryData::file(self.size(at)?, now)
        };
        self.cache.insert_entry(at, &data)
    }
}

impl Storage for LocalStorage {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn exists(&self, path: &str) -> bool {
        self.full_path(path)
            .map(|p| fs::symlink_metadata(p).is_ok())
            .unwrap_or(false)
    }

    fn is_dir(&self, path: &str) -> bool {
        self.full_path(path).map(|p| p.is_dir()).unwrap_or(false)
    }

    fn is_deletable(&self, path: &str) -> bool {
        !path::normalize(path).is_empty() && self.exists(path)
    }

    fn mkdir(&self, path: &str) -> StorageResult<()> {
        let full = self.full_path(path)?;
        if full.exists() {
            return Err(StorageError::AlreadyExists(path.to_string()));
        }
        fs::create_dir(&full)?;
        Ok(())
    }

    fn unlink(&self, path: &str) -> StorageResult<()> {
        let full = self.full_path(path)?;
        let meta = fs::symlink_metadata(&full).map_err(|_| StorageError::NotFound(path.to_string()))?;
        if meta.is_dir() {
            fs::remove_dir_all(&full)?;
        } else {
            fs::remove_file(&full)?;
        }
        Ok(())
    }

    fn size(&self, path: &str) -> StorageResult<u64> {
        let full = self.full_path(path)?;
        if !full.exists() {
            return Err(StorageError::NotFound(path.to_string()));
        }
        Ok(tree_size(&full))
    }

    fn list_dir(&self, path: &str) -> StorageResult<Vec<String>> {
        let full = self.full_path(path)?;
        let entries = fs::read_dir(&full).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(path.to_string()),
            _ => StorageError::Io(e),
        })?;
        let mut names: Vec<String> = entries
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        Ok(names)
    }

    fn move_from(&self, source: &dyn Storage, source_path: &str, target_path: &str) -> StorageResult<()> {
        let target = self.full_path(target_path)?;
        if fs::symlink_metadata(&target).is_ok() {
            return Err(StorageError::AlreadyExists(target_path.to_string()));
        }
        if !target.parent().map(Path::is_dir).unwrap_or(false) {
            return Err(StorageError::NotFound(format!("parent of {target_path}")));
        }
        let from = source.local_path(source_path).ok_or_else(|| {
            StorageError::InvalidPath(format!("{source_path} has no local backing"))
        })?;
        if fs::symlink_metadata(&from).is_err() {
            return Err(StorageError::NotFound(source_path.to_string()));
        }

        if let Err(rename_err) = fs::rename(&from, &target) {
            // Cross-device: copy, then drop the source only once the copy is complete.
            if let Err(copy_err) = copy_recursive(&from, &target) {
                let _ = remove_any(&target);
                return Err(StorageError::Io(io::Error::new(
                    copy_err.kind(),
                    format!("rename failed: {rename_err}, copy failed: {copy_err}"),
                )));
            }
            remove_any(&from)?;
        }

        let indexed = match source.cache() {
            Some(source_cache) => self.cache.move_from(source_cache, source_path, target_path),
            None => self.ensure_indexed(target_path).map(|_| ()),
        };
        if let Err(e) = indexed {
            // The index still describes the source, so the bytes go back there.
            if let Err(undo) = move_back(&target, &from) {
                log::error!(
                    "Failed to return {} to {} after an index error: {}",
                    target.display(),
                    from.display(),
                    undo
                );
            }
            return Err(e);
        }
        Ok(())
    }

    fn local_path(&self, path: &str) -> Option<PathBuf> {
        self.full_path(path).ok()
    }

    fn cache(&self) -> Option<&FileCache> {
        Some(&self.cache)
    }
}

fn tree_size(full: &Path) -> u64 {
    let Ok(meta) = fs::symlink_metadata(full) else {
        return 0;
    };
    if !meta.is_dir() {
        return meta.len();
    }
    match fs::read_dir(full) {
        Ok(entries) => entries.flatten().map(|e| tree_size(&e.path())).sum(),
        Err(e) => {
            log::warn!("Failed to read directory {}: {}", full.display(), e);
            0
        }
    }
}

fn copy_recursive(from: &Path, to: &Path) -> io::Result<()> {
    if from.is_dir() {
        fs::create_dir(to)?;
        for entry in fs::read_dir(from)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &to.join(entry.file_name()))?;
        }
    } else {
        fs::copy(from, to)?;
    }
    Ok(())
}

fn move_back(moved: &Path, original: &Path) -> io::Result<()> {
    if fs::rename(moved, original).is_ok() {
        return Ok(());
    }
    copy_recursive(moved, original)?;
    remove_any(moved)
}

fn remove_any(full: &Path) -> io::Result<()> {
    if full.is_dir() {
        fs::remove_dir_all(full)
    } else {
        fs::remove_file(full)
    }
}
