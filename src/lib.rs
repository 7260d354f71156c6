pub mod acl;
pub mod backend;
pub mod config;
pub mod db;
pub mod error;
pub mod expiration;
pub mod folders;
pub mod path;
pub mod storage;
pub mod tree;

#[cfg(test)]
pub(crate) mod testing;

use std::fs;
use std::sync::Arc;

pub use acl::{AccessOracle, Permissions};
pub use backend::{TrashBackend, TrashNode};
pub use config::TrashConfig;
pub use error::{StorageError, TrashError, TrashResult};
pub use expiration::{ExpirationPolicy, ExpireSummary, RetentionPolicy};
pub use folders::{ConfigRegistry, FolderRegistry, VersionStore};
pub use tree::{LeafTrashEntry, TrashEntry, VirtualTrashDirectory};

use db::Database;
use storage::LocalStorage;

/// Initialize logging. `RUST_LOG` overrides the default `info` filter.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
}

fn open_storage(config: &TrashConfig) -> TrashResult<(Arc<Database>, Arc<LocalStorage>)> {
    // Fail on a bad retention value before anything is created on disk.
    retention_policy(config)?;
    fs::create_dir_all(&config.data_dir).map_err(StorageError::from)?;
    let db = Arc::new(Database::new(&config.database_path())?);
    let storage = Arc::new(LocalStorage::new(config.storage_root(), db.clone())?);
    log::info!(
        "Opened trash ledger at {} (storage {})",
        config.database_path().display(),
        config.storage_root().display()
    );
    Ok((db, storage))
}

/// Wire a backend over the ledger and storage described by `config`.
pub fn open(
    config: &TrashConfig,
    registry: Arc<dyn FolderRegistry>,
    oracle: Arc<dyn AccessOracle>,
) -> TrashResult<TrashBackend> {
    let (db, storage) = open_storage(config)?;
    Ok(TrashBackend::new(db, storage, registry, oracle, config.settings.clone()))
}

/// Like [`open`], with folders and ACLs taken from the configuration itself.
pub fn open_configured(config: &TrashConfig) -> TrashResult<TrashBackend> {
    let (db, storage) = open_storage(config)?;
    let registry = Arc::new(ConfigRegistry::new(
        config.folders.clone(),
        storage.clone(),
        &config.settings.groupfolders_dir,
    ));
    Ok(TrashBackend::new(
        db,
        storage,
        registry.clone(),
        registry,
        config.settings.clone(),
    ))
}

pub fn retention_policy(config: &TrashConfig) -> TrashResult<RetentionPolicy> {
    config.settings.retention.parse()
}
