use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::acl::Permissions;
use crate::db::FolderId;
use crate::error::{TrashError, TrashResult};

/// Get the app data directory: <data dir>/shared-trash/
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shared-trash")
}

// ── Data types ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrashConfig {
    /// Root of the ledger database and the physical storage.
    #[serde(default = "app_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub settings: TrashSettings,
    #[serde(default)]
    pub folders: Vec<SharedFolder>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrashSettings {
    /// Retention obligation: `auto`, `D`, `D, auto`, `auto, D`, `D1, D2` or `disabled`
    #[serde(default = "default_retention")]
    pub retention: String,
    /// Recreate missing parent directories on restore instead of restoring to the folder root
    #[serde(default)]
    pub restore_recreates_parents: bool,
    /// Directory under the storage root holding folder contents and trash areas
    #[serde(default = "default_groupfolders_dir")]
    pub groupfolders_dir: String,
    #[serde(default = "default_database_file")]
    pub database_file: String,
}

fn default_retention() -> String {
    "auto".to_string()
}

fn default_groupfolders_dir() -> String {
    "__groupfolders".to_string()
}

fn default_database_file() -> String {
    "trash.db".to_string()
}

impl Default for TrashSettings {
    fn default() -> Self {
        Self {
            retention: default_retention(),
            restore_recreates_parents: false,
            groupfolders_dir: default_groupfolders_dir(),
            database_file: default_database_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedFolder {
    pub id: FolderId,
    pub mount_point: String,
    /// Bytes; 0 or negative means unlimited
    #[serde(default)]
    pub quota: i64,
    #[serde(default)]
    pub members: Vec<FolderMember>,
    /// Path-level overrides of the member grants
    #[serde(default)]
    pub acl: Vec<AclRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderMember {
    pub user: String,
    pub permissions: Permissions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AclRule {
    pub user: String,
    /// Folder-relative path the rule applies to, including everything below it
    pub path: String,
    pub permissions: Permissions,
}

impl Default for TrashConfig {
    fn default() -> Self {
        Self {
            data_dir: app_data_dir(),
            settings: TrashSettings::default(),
            folders: Vec::new(),
        }
    }
}

impl TrashConfig {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.settings.database_file)
    }

    pub fn storage_root(&self) -> PathBuf {
        self.data_dir.join("files")
    }
}

// ── Load / Save ─────────────────────────────────────────────

/// Read a config file as text. UTF-16 files must carry a byte-order mark;
/// a UTF-8 one is dropped.
pub fn read_file_strip_bom(path: &Path) -> TrashResult<String> {
    let raw = fs::read(path).map_err(|e| TrashError::Config(format!("reading {}: {e}", path.display())))?;
    let utf16 = |units: Vec<u16>| {
        String::from_utf16(&units).map_err(|e| TrashError::Config(format!("{}: {e}", path.display())))
    };

    match raw.as_slice() {
        [0xFF, 0xFE, rest @ ..] => utf16(rest.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect()),
        [0xFE, 0xFF, rest @ ..] => utf16(rest.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect()),
        _ => {
            let text = String::from_utf8(raw).map_err(|e| TrashError::Config(format!("{}: {e}", path.display())))?;
            Ok(text.strip_prefix('\u{FEFF}').map(str::to_string).unwrap_or(text))
        }
    }
}

/// Load the configuration, falling back to defaults when the file is missing or unreadable.
pub fn load_config(path: &Path) -> TrashConfig {
    if !path.exists() {
        return TrashConfig::default();
    }
    let parsed = read_file_strip_bom(path)
        .and_then(|data| serde_json::from_str(&data).map_err(|e| TrashError::Config(e.to_string())));
    match parsed {
        Ok(config) => config,
        Err(e) => {
            log::warn!("Ignoring invalid config {}: {}", path.display(), e);
            TrashConfig::default()
        }
    }
}

pub fn save_config(path: &Path, config: &TrashConfig) -> TrashResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| TrashError::Config(e.to_string()))?;
    }
    let json = serde_json::to_string_pretty(config).map_err(|e| TrashError::Config(e.to_string()))?;
    fs::write(path, json).map_err(|e| TrashError::Config(e.to_string()))?;
    Ok(())
}
