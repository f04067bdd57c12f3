//! Row types for the catalog tables.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structured metadata stored alongside a backup record, instead of a
/// dynamically-typed dict (see `SPEC_FULL.md` §9). Named fields cover what
/// every record has; `extra` is for forward-compatible collaborator data.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ObjectMetadata {
    pub original_filename: String,
    pub original_size: u64,
    pub compressed_size: u64,
    pub device_id: String,
    pub backup_version: u32,
    pub checksum: String,
    pub compression_level: u32,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

/// One row of the `backups` table: a single versioned snapshot of a file.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupRecord {
    pub id: i64,
    pub file_path: String,
    pub original_size: u64,
    pub compressed_size: u64,
    pub encrypted_size: u64,
    pub object_key: String,
    pub backup_date: DateTime<Utc>,
    pub checksum: String,
    pub version: u32,
    pub device_id: String,
    pub salt: String,
    pub metadata: Option<ObjectMetadata>,
    pub is_deleted: bool,
}

/// Status row tracking whether a watched file's latest change has been
/// durably backed up yet.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncStatus {
    pub file_path: String,
    pub last_modified: DateTime<Utc>,
    pub last_backup: Option<DateTime<Utc>>,
    pub status: SyncState,
    pub error_message: Option<String>,
    pub device_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Pending,
    Completed,
    Error,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::Completed => "completed",
            SyncState::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => SyncState::Completed,
            "error" => SyncState::Error,
            _ => SyncState::Pending,
        }
    }
}

/// One row of the `cleanup_log` table, recorded after every retention sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanupLogEntry {
    pub id: i64,
    pub cleanup_date: DateTime<Utc>,
    pub files_cleaned: u64,
    pub space_freed_bytes: u64,
    pub errors_count: u64,
}

/// Aggregate storage statistics for a device (§6, `stats` subcommand).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StorageStats {
    pub total_files: u64,
    pub unique_files: u64,
    pub total_original_size: u64,
    pub total_compressed_size: u64,
    pub total_encrypted_size: u64,
    pub avg_compression_ratio: f64,
}
