//! Expiring old trash, per folder and oldest first.

use std::str::FromStr;

use chrono::Utc;

use crate::backend::TrashBackend;
use crate::db::FolderId;
use crate::error::{TrashError, TrashResult};
use crate::path;
use crate::storage::Storage;

const SECONDS_PER_DAY: i64 = 86_400;

/// Decides whether an item deleted at `deleted_time` should be purged.
pub trait ExpirationPolicy {
    fn is_expired(&self, deleted_time: i64, over_quota: bool) -> bool;
}

impl<F> ExpirationPolicy for F
where
    F: Fn(i64, bool) -> bool,
{
    fn is_expired(&self, deleted_time: i64, over_quota: bool) -> bool {
        self(deleted_time, over_quota)
    }
}

/// Retention obligation in days, as configured by `settings.retention`.
///
/// | value      | keep at least | delete after | purge early when over quota |
/// |------------|---------------|--------------|-----------------------------|
/// | `auto`     | 30            | never        | yes                         |
/// | `D`        | D             | never        | no                          |
/// | `D, auto`  | D             | never        | yes                         |
/// | `auto, D`  | none          | D            | yes                         |
/// | `D1, D2`   | D1            | max(D1, D2)  | no                          |
/// | `disabled` | forever       | never        | no                          |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    min_days: Option<i64>,
    max_days: Option<i64>,
    can_purge_to_save_space: bool,
    enabled: bool,
}

impl RetentionPolicy {
    pub const DEFAULT_MIN_DAYS: i64 = 30;

    pub fn disabled() -> Self {
        Self {
            min_days: None,
            max_days: None,
            can_purge_to_save_space: false,
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_expired_at(&self, now: i64, deleted_time: i64, over_quota: bool) -> bool {
        if !self.enabled || deleted_time > now {
            return false;
        }
        if over_quota && self.can_purge_to_save_space {
            return true;
        }
        let older_than_max = self
            .max_days
            .is_some_and(|days| deleted_time < now - days * SECONDS_PER_DAY);
        let min_reached = self
            .min_days
            .is_some_and(|days| over_quota && deleted_time < now - days * SECONDS_PER_DAY);
        older_than_max || min_reached
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            min_days: Some(Self::DEFAULT_MIN_DAYS),
            max_days: None,
            can_purge_to_save_space: true,
            enabled: true,
        }
    }
}

impl FromStr for RetentionPolicy {
    type Err = TrashError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim().to_lowercase();
        if value == "disabled" {
            return Ok(Self::disabled());
        }
        let parts: Vec<&str> = value.split(',').map(str::trim).collect();
        let days = |part: &str| -> TrashResult<i64> {
            part.parse::<i64>()
                .ok()
                .filter(|d| *d >= 0)
                .ok_or_else(|| TrashError::Config(format!("invalid retention days '{part}'")))
        };

        let policy = match parts.as_slice() {
            [""] | ["auto"] | ["auto", "auto"] => Self::default(),
            [min] => Self {
                min_days: Some(days(*min)?),
                max_days: None,
                can_purge_to_save_space: false,
                enabled: true,
            },
            [min, "auto"] => Self {
                min_days: Some(days(*min)?),
                max_days: None,
                can_purge_to_save_space: true,
                enabled: true,
            },
            ["auto", max] => Self {
                min_days: None,
                max_days: Some(days(*max)?),
                can_purge_to_save_space: true,
                enabled: true,
            },
            [min, max] => {
                let min = days(*min)?;
                Self {
                    min_days: Some(min),
                    max_days: Some(days(*max)?.max(min)),
                    can_purge_to_save_space: false,
                    enabled: true,
                }
            }
            _ => {
                return Err(TrashError::Config(format!(
                    "invalid retention obligation '{value}'"
                )));
            }
        };
        Ok(policy)
    }
}

impl ExpirationPolicy for RetentionPolicy {
    fn is_expired(&self, deleted_time: i64, over_quota: bool) -> bool {
        self.is_expired_at(Utc::now().timestamp(), deleted_time, over_quota)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpireSummary {
    pub count: usize,
    pub bytes: u64,
}

impl TrashBackend {
    /// Purge expired items of every folder, oldest first, stopping at the
    /// first item of a folder that has not expired yet.
    pub fn expire(&self, policy: &dyn ExpirationPolicy) -> TrashResult<ExpireSummary> {
        let mut summary = ExpireSummary::default();
        for usage in self.registry().folders_with_usage() {
            let folder_id = usage.folder_id;
            let records = self.database().list_records(&[folder_id])?;
            if records.is_empty() {
                continue;
            }
            let (live, _) = self.drop_stale_records(folder_id, records)?;

            let trash_root = self.trash_root(folder_id);
            let trash_size: u64 = live
                .iter()
                .map(|r| {
                    self.storage()
                        .size(&path::join(&trash_root, &r.node_path()))
                        .unwrap_or(0)
                })
                .sum();
            let over_quota = usage.is_over_quota(trash_size);

            for record in &live {
                if !policy.is_expired(record.deleted_time, over_quota) {
                    break;
                }
                summary.bytes += self.purge_node(record, "")?;
                summary.count += 1;
                log::info!(
                    "Expired {} from the trash of folder {} (deleted {})",
                    record.original_location,
                    folder_id,
                    record.deleted_time
                );
            }
        }
        if summary.count > 0 {
            log::info!("Expired {} trash items ({} bytes)", summary.count, summary.bytes);
        }
        Ok(summary)
    }

    /// Drop ledger rows whose trash node no longer exists. Returns how many were dropped.
    pub fn reconcile(&self, folder_id: FolderId) -> TrashResult<usize> {
        let records = self.database().list_records(&[folder_id])?;
        let (_, dropped) = self.drop_stale_records(folder_id, records)?;
        Ok(dropped)
    }
}
