//! The embedded backup catalog (§4.C).
//!
//! Backed by `rusqlite` rather than a server-backed database: this is a
//! single-user, single-machine agent, and an embedded file plays the same
//! role the teacher reaches for a real Postgres instance for in its
//! `tamanu`/`psql` subcommands — pick the store that matches the deployment
//! shape, not the biggest hammer available.

pub mod schema;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

pub use types::{BackupRecord, CleanupLogEntry, ObjectMetadata, StorageStats, SyncState, SyncStatus};

use crate::error::{BackupError, Result};

pub struct Catalog {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Catalog {
    /// Open (creating if necessary) the catalog database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| BackupError::io(parent, e))?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(schema::SCHEMA)?;
        tracing::info!(?path, "catalog initialized");
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    /// In-memory catalog, used by tests that don't need file persistence.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(schema::SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        })
    }

    fn next_version(conn: &Connection, file_path: &str, device_id: &str) -> Result<u32> {
        let max: Option<i64> = conn
            .query_row(
                "SELECT MAX(version) FROM backups WHERE file_path = ?1 AND device_id = ?2 AND is_deleted = 0",
                params![file_path, device_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(max.unwrap_or(0) as u32 + 1)
    }

    /// Insert a new backup record, assigning it the next version number for
    /// `(file_path, device_id)`, and mark that file's sync status completed.
    /// Versions are never reused, even after older ones are pruned.
    pub fn add_backup_record(
        &self,
        file_path: &str,
        original_size: u64,
        compressed_size: u64,
        encrypted_size: u64,
        object_key: &str,
        checksum: &str,
        device_id: &str,
        salt: &str,
        metadata: Option<&ObjectMetadata>,
    ) -> Result<i64> {
        let mut conn = self.conn.lock().expect("catalog mutex poisoned");
        let tx = conn.transaction()?;

        let version = Self::next_version(&tx, file_path, device_id)?;
        let now = Utc::now().to_rfc3339();
        let metadata_json = metadata
            .map(serde_json::to_string)
            .transpose()?;

        tx.execute(
            "INSERT INTO backups
                (file_path, original_size, compressed_size, encrypted_size, object_key,
                 backup_date, checksum, version, device_id, salt, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                file_path,
                original_size as i64,
                compressed_size as i64,
                encrypted_size as i64,
                object_key,
                now,
                checksum,
                version,
                device_id,
                salt,
                metadata_json,
            ],
        )?;
        let backup_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO sync_status (file_path, last_modified, last_backup, status, device_id)
             VALUES (?1, ?2, ?3, 'completed', ?4)
             ON CONFLICT(file_path, device_id) DO UPDATE SET
                last_modified = excluded.last_modified,
                last_backup = excluded.last_backup,
                status = 'completed',
                error_message = NULL",
            params![file_path, now, now, device_id],
        )?;

        tx.commit()?;
        tracing::info!(file_path, version, backup_id, "added backup record");
        Ok(backup_id)
    }

    pub fn get_file_versions(&self, file_path: &str, device_id: &str) -> Result<Vec<BackupRecord>> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT * FROM backups WHERE file_path = ?1 AND device_id = ?2 AND is_deleted = 0
             ORDER BY version DESC",
        )?;
        let rows = stmt
            .query_map(params![file_path, device_id], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn get_latest_backup(&self, file_path: &str, device_id: &str) -> Result<Option<BackupRecord>> {
        Ok(self.get_file_versions(file_path, device_id)?.into_iter().next())
    }

    pub fn get_backup_by_id(&self, backup_id: i64) -> Result<Option<BackupRecord>> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        conn.query_row(
            "SELECT * FROM backups WHERE id = ?1 AND is_deleted = 0",
            params![backup_id],
            row_to_record,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Paths whose sync status is pending, or whose last modification is
    /// newer than their last successful backup.
    pub fn get_files_needing_backup(&self, device_id: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT file_path FROM sync_status
             WHERE device_id = ?1 AND (
                status = 'pending' OR last_backup IS NULL OR last_modified > last_backup
             )",
        )?;
        let rows = stmt
            .query_map(params![device_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn update_sync_status(
        &self,
        file_path: &str,
        device_id: &str,
        last_modified: DateTime<Utc>,
        status: SyncState,
        error_message: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        conn.execute(
            "INSERT INTO sync_status (file_path, last_modified, status, error_message, device_id)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(file_path, device_id) DO UPDATE SET
                last_modified = excluded.last_modified,
                status = excluded.status,
                error_message = excluded.error_message",
            params![
                file_path,
                last_modified.to_rfc3339(),
                status.as_str(),
                error_message,
                device_id
            ],
        )?;
        Ok(())
    }

    /// Soft-delete versions beyond `max_versions` per file, plus anything
    /// older than `retention_days`, and record the sweep in `cleanup_log`.
    ///
    /// The original implementation selected old versions with
    /// `LIMIT -1 OFFSET max_versions`, a SQLite-specific idiom (`LIMIT -1`
    /// meaning "no limit") that doesn't translate to other engines. Here the
    /// candidate ids are fetched in full, ordered by version, and the first
    /// `max_versions` are skipped in application code within the same
    /// transaction — same effect, no engine-specific syntax.
    pub fn cleanup_old_versions(
        &self,
        max_versions: u32,
        retention_days: u32,
        device_id: &str,
    ) -> Result<(u64, u64)> {
        let mut conn = self.conn.lock().expect("catalog mutex poisoned");
        let tx = conn.transaction()?;

        let mut cleaned = 0u64;
        let mut freed = 0u64;

        let mut file_stmt = tx.prepare(
            "SELECT file_path, COUNT(*) FROM backups
             WHERE device_id = ?1 AND is_deleted = 0
             GROUP BY file_path HAVING COUNT(*) > ?2",
        )?;
        let files_over_limit = file_stmt
            .query_map(params![device_id, max_versions], |row| {
                Ok(row.get::<_, String>(0)?)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(file_stmt);

        for file_path in files_over_limit {
            let mut version_stmt = tx.prepare(
                "SELECT id, encrypted_size FROM backups
                 WHERE file_path = ?1 AND device_id = ?2 AND is_deleted = 0
                 ORDER BY version DESC",
            )?;
            let all_versions = version_stmt
                .query_map(params![file_path, device_id], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            drop(version_stmt);

            for (backup_id, encrypted_size) in all_versions.into_iter().skip(max_versions as usize) {
                tx.execute("UPDATE backups SET is_deleted = 1 WHERE id = ?1", params![backup_id])?;
                cleaned += 1;
                freed += encrypted_size as u64;
            }
        }

        let cutoff = (Utc::now() - chrono::Duration::days(retention_days as i64)).to_rfc3339();
        let mut aged_stmt = tx.prepare(
            "SELECT id, encrypted_size FROM backups
             WHERE device_id = ?1 AND backup_date < ?2 AND is_deleted = 0",
        )?;
        let aged_out = aged_stmt
            .query_map(params![device_id, cutoff], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(aged_stmt);

        for (backup_id, encrypted_size) in aged_out {
            tx.execute("UPDATE backups SET is_deleted = 1 WHERE id = ?1", params![backup_id])?;
            cleaned += 1;
            freed += encrypted_size as u64;
        }

        tx.execute(
            "INSERT INTO cleanup_log (cleanup_date, files_cleaned, space_freed_bytes) VALUES (?1, ?2, ?3)",
            params![Utc::now().to_rfc3339(), cleaned as i64, freed as i64],
        )?;

        tx.commit()?;
        tracing::info!(cleaned, freed, "cleanup sweep complete");
        Ok((cleaned, freed))
    }

    pub fn get_storage_stats(&self, device_id: &str) -> Result<StorageStats> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        conn.query_row(
            "SELECT
                COUNT(*),
                COUNT(DISTINCT file_path),
                COALESCE(SUM(original_size), 0),
                COALESCE(SUM(compressed_size), 0),
                COALESCE(SUM(encrypted_size), 0),
                COALESCE(AVG(CASE WHEN original_size > 0 THEN compressed_size * 1.0 / original_size ELSE 0 END), 0.0)
             FROM backups WHERE device_id = ?1 AND is_deleted = 0",
            params![device_id],
            |row| {
                Ok(StorageStats {
                    total_files: row.get::<_, i64>(0)? as u64,
                    unique_files: row.get::<_, i64>(1)? as u64,
                    total_original_size: row.get::<_, i64>(2)? as u64,
                    total_compressed_size: row.get::<_, i64>(3)? as u64,
                    total_encrypted_size: row.get::<_, i64>(4)? as u64,
                    avg_compression_ratio: row.get(5)?,
                })
            },
        )
        .map_err(Into::into)
    }

    pub fn search_backups(&self, query: &str, device_id: &str, limit: u32) -> Result<Vec<(String, DateTime<Utc>)>> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        let pattern = format!("%{query}%");
        let mut stmt = conn.prepare(
            "SELECT file_path, MAX(backup_date) as latest FROM backups
             WHERE file_path LIKE ?1 AND device_id = ?2 AND is_deleted = 0
             GROUP BY file_path ORDER BY latest DESC LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(params![pattern, device_id, limit], |row| {
                let path: String = row.get(0)?;
                let date: String = row.get(1)?;
                Ok((path, date))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(path, date)| {
                DateTime::parse_from_rfc3339(&date)
                    .ok()
                    .map(|d| (path, d.with_timezone(&Utc)))
            })
            .collect())
    }

    /// Copy the database file (and its `-wal`/`-shm` siblings, if present)
    /// to `dest_dir/backup-{timestamp}.sqlite3` for the scheduler's
    /// periodic catalog snapshot (§4.F).
    pub fn snapshot(&self, dest_dir: &Path, now: DateTime<Utc>) -> Result<PathBuf> {
        std::fs::create_dir_all(dest_dir).map_err(|e| BackupError::io(dest_dir, e))?;
        let name = format!("backup-{}.sqlite3", now.format("%Y%m%d_%H%M%S"));
        let dest = dest_dir.join(name);

        {
            let conn = self.conn.lock().expect("catalog mutex poisoned");
            conn.execute("PRAGMA wal_checkpoint(TRUNCATE)", []).ok();
        }

        std::fs::copy(&self.db_path, &dest).map_err(|e| BackupError::io(&self.db_path, e))?;
        for suffix in ["-wal", "-shm"] {
            let side_file = PathBuf::from(format!("{}{}", self.db_path.display(), suffix));
            if side_file.exists() {
                let dest_side = PathBuf::from(format!("{}{}", dest.display(), suffix));
                std::fs::copy(&side_file, &dest_side).map_err(|e| BackupError::io(&side_file, e))?;
            }
        }

        tracing::info!(?dest, "catalog snapshot written");
        Ok(dest)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<BackupRecord> {
    let metadata_json: Option<String> = row.get("metadata")?;
    let metadata = metadata_json
        .and_then(|text| serde_json::from_str(&text).ok());
    let backup_date: String = row.get("backup_date")?;

    Ok(BackupRecord {
        id: row.get("id")?,
        file_path: row.get("file_path")?,
        original_size: row.get::<_, i64>("original_size")? as u64,
        compressed_size: row.get::<_, i64>("compressed_size")? as u64,
        encrypted_size: row.get::<_, i64>("encrypted_size")? as u64,
        object_key: row.get("object_key")?,
        backup_date: DateTime::parse_from_rfc3339(&backup_date)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        checksum: row.get("checksum")?,
        version: row.get::<_, i64>("version")? as u32,
        device_id: row.get("device_id")?,
        salt: row.get("salt")?,
        metadata,
        is_deleted: row.get::<_, i64>("is_deleted")? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> ObjectMetadata {
        ObjectMetadata {
            original_filename: "foo.txt".into(),
            original_size: 100,
            compressed_size: 60,
            device_id: "dev-1".into(),
            backup_version: 1,
            checksum: "abc123".into(),
            compression_level: 6,
            extra: Default::default(),
        }
    }

    #[test]
    fn versions_increase_and_never_reuse() {
        let catalog = Catalog::open_in_memory().unwrap();
        let meta = sample_metadata();

        let id1 = catalog
            .add_backup_record("foo.txt", 100, 60, 70, "key/v1", "chk1", "dev-1", "salt1", Some(&meta))
            .unwrap();
        let id2 = catalog
            .add_backup_record("foo.txt", 100, 60, 70, "key/v2", "chk2", "dev-1", "salt2", Some(&meta))
            .unwrap();
        assert_ne!(id1, id2);

        let versions = catalog.get_file_versions("foo.txt", "dev-1").unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].version, 2);
        assert_eq!(versions[1].version, 1);

        catalog.cleanup_old_versions(1, 9999, "dev-1").unwrap();
        let remaining = catalog.get_file_versions("foo.txt", "dev-1").unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].version, 2);

        // A new backup after pruning must not reuse version 1.
        let id3 = catalog
            .add_backup_record("foo.txt", 100, 60, 70, "key/v3", "chk3", "dev-1", "salt3", Some(&meta))
            .unwrap();
        let _ = id3;
        let versions = catalog.get_file_versions("foo.txt", "dev-1").unwrap();
        assert_eq!(versions[0].version, 3);
    }

    #[test]
    fn cleanup_respects_retention_days() {
        let catalog = Catalog::open_in_memory().unwrap();
        let meta = sample_metadata();
        catalog
            .add_backup_record("old.txt", 10, 10, 10, "key/v1", "chk", "dev-1", "salt", Some(&meta))
            .unwrap();

        let (cleaned, _freed) = catalog.cleanup_old_versions(100, 0, "dev-1").unwrap();
        assert_eq!(cleaned, 1, "retention_days=0 should age out everything immediately");
    }

    #[test]
    fn get_backup_by_id_excludes_deleted() {
        let catalog = Catalog::open_in_memory().unwrap();
        let meta = sample_metadata();
        let id = catalog
            .add_backup_record("foo.txt", 10, 10, 10, "key/v1", "chk", "dev-1", "salt", Some(&meta))
            .unwrap();

        assert!(catalog.get_backup_by_id(id).unwrap().is_some());
        catalog.cleanup_old_versions(0, 9999, "dev-1").unwrap();
        assert!(catalog.get_backup_by_id(id).unwrap().is_none());
    }

    #[test]
    fn search_matches_substring() {
        let catalog = Catalog::open_in_memory().unwrap();
        let meta = sample_metadata();
        catalog
            .add_backup_record("/home/user/report.pdf", 10, 10, 10, "key/v1", "chk", "dev-1", "salt", Some(&meta))
            .unwrap();

        let results = catalog.search_backups("report", "dev-1", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "/home/user/report.pdf");
    }
}
