//! Embedded catalog schema (§4.C, §6).

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS backups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_path TEXT NOT NULL,
    original_size INTEGER NOT NULL,
    compressed_size INTEGER NOT NULL,
    encrypted_size INTEGER NOT NULL,
    object_key TEXT NOT NULL,
    backup_date TEXT NOT NULL,
    checksum TEXT NOT NULL,
    version INTEGER NOT NULL,
    device_id TEXT NOT NULL,
    salt TEXT NOT NULL,
    metadata TEXT,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    UNIQUE(file_path, version, device_id)
);

CREATE TABLE IF NOT EXISTS sync_status (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_path TEXT NOT NULL,
    last_modified TEXT NOT NULL,
    last_backup TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    error_message TEXT,
    device_id TEXT NOT NULL,
    UNIQUE(file_path, device_id)
);

CREATE TABLE IF NOT EXISTS cleanup_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    cleanup_date TEXT NOT NULL,
    files_cleaned INTEGER NOT NULL DEFAULT 0,
    space_freed_bytes INTEGER NOT NULL DEFAULT 0,
    errors_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_backups_file_path ON backups(file_path);
CREATE INDEX IF NOT EXISTS idx_backups_backup_date ON backups(backup_date);
CREATE INDEX IF NOT EXISTS idx_backups_device_id ON backups(device_id);
CREATE INDEX IF NOT EXISTS idx_sync_status_file_path ON sync_status(file_path);
"#;
