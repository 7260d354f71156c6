//! Storage primitives the trash engine moves items between.
//!
//! A storage is either terminal (it owns bytes and a metadata index, like
//! [`LocalStorage`]) or a wrapper that re-roots or restricts another storage.
//! Physical moves always run on terminal storages, reached through
//! [`unwrap_storage`].

use std::path::PathBuf;
use std::sync::Arc;

use crate::db::FolderId;
use crate::error::StorageResult;
use crate::path;

mod cache;
mod local;
mod wrapper;

pub use cache::{EntryData, FileCache};
pub use local::LocalStorage;
pub use wrapper::{GroupFolderStorage, Jail, PermissionMask};

pub trait Storage: Send + Sync {
    /// Stable identifier, used to key the metadata index.
    fn id(&self) -> String;

    fn exists(&self, path: &str) -> bool;

    fn is_dir(&self, path: &str) -> bool;

    /// Whether the item at `path` may be deleted through this storage.
    fn is_deletable(&self, path: &str) -> bool;

    /// Create a single directory; the parent must exist.
    fn mkdir(&self, path: &str) -> StorageResult<()>;

    /// Remove a file or a whole directory tree.
    fn unlink(&self, path: &str) -> StorageResult<()>;

    /// Size in bytes, recursive for directories.
    fn size(&self, path: &str) -> StorageResult<u64>;

    /// Entry names of a directory, sorted.
    fn list_dir(&self, path: &str) -> StorageResult<Vec<String>>;

    /// Move the subtree at `source_path` of `source` to `target_path` of this
    /// storage. The target must not exist and its parent must. Either the
    /// whole subtree arrives or the source is left as it was.
    fn move_from(&self, source: &dyn Storage, source_path: &str, target_path: &str) -> StorageResult<()>;

    /// Host filesystem location backing `path`, if any.
    fn local_path(&self, _path: &str) -> Option<PathBuf> {
        None
    }

    /// Metadata index of a terminal storage. Wrappers have none of their own.
    fn cache(&self) -> Option<&FileCache> {
        None
    }

    /// Shared folder this storage (or a storage it wraps) belongs to.
    fn folder_id(&self) -> Option<FolderId> {
        None
    }

    /// True for the layer whose root is the shared folder's root.
    fn is_folder_root(&self) -> bool {
        false
    }

    /// The storage this one wraps and how paths translate into it.
    fn wrapped(&self) -> Option<(Arc<dyn Storage>, PathRewrite)> {
        None
    }
}

/// How a wrapper's paths translate into its inner storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathRewrite {
    Identity,
    /// The wrapper is rooted at this inner path.
    Rebase(String),
}

impl PathRewrite {
    pub fn apply(&self, path: &str) -> String {
        match self {
            PathRewrite::Identity => path.to_string(),
            PathRewrite::Rebase(root) => path::join(root, path),
        }
    }
}

/// A storage view followed down to its terminal storage.
pub struct Unwrapped {
    pub storage: Arc<dyn Storage>,
    /// The requested path in the terminal storage's namespace.
    pub path: String,
    /// The requested path relative to the shared folder root, if a folder layer was crossed.
    pub folder_path: Option<String>,
}

/// Follow `wrapped()` until a terminal storage is reached, composing the path
/// rewrites of every layer crossed.
pub fn unwrap_storage(storage: &Arc<dyn Storage>, path: &str) -> Unwrapped {
    let mut current = Arc::clone(storage);
    let mut current_path = path::normalize(path);
    let mut folder_path = None;

    loop {
        if folder_path.is_none() && current.is_folder_root() {
            folder_path = Some(current_path.clone());
        }
        match current.wrapped() {
            Some((inner, rewrite)) => {
                current_path = rewrite.apply(&current_path);
                current = inner;
            }
            None => break,
        }
    }

    Unwrapped {
        storage: current,
        path: current_path,
        folder_path,
    }
}
