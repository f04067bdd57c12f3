//! Configuration loading.
//!
//! A YAML file on disk holds the tunables a user might reasonably want to
//! edit (watched directories, intervals, retention); secrets and
//! machine-identity values come from the environment. Both are merged once,
//! at startup, into an immutable [`Config`] that is passed explicitly to
//! every constructor that needs it. There is no global/static instance —
//! see the design note in `SPEC_FULL.md` §9: a process-global config makes
//! every consumer implicitly coupled to "whatever got loaded last", which is
//! exactly what made the prototype's test setup fragile.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BackupError, Result};

const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &[
    "*.tmp",
    "*.log",
    "*.cache",
    "__pycache__/*",
    "*.pyc",
    ".git/*",
    "node_modules/*",
];

/// On-disk shape of the config file, deserialized verbatim before defaults
/// and env overrides are applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub backup: BackupSection,
    #[serde(default)]
    pub versioning: VersioningSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub web: WebSection,
    #[serde(default)]
    pub encryption: EncryptionSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSection {
    pub watched_directories: Vec<PathBuf>,
    pub exclude_patterns: Vec<String>,
    pub compression_level: u32,
    pub max_file_size_mb: u64,
    pub batch_size: usize,
    pub retry_attempts: u32,
    pub backup_interval_minutes: u64,
    pub debounce_seconds: u64,
}

impl Default for BackupSection {
    fn default() -> Self {
        Self {
            watched_directories: default_watched_directories(),
            exclude_patterns: DEFAULT_EXCLUDE_PATTERNS.iter().map(|s| s.to_string()).collect(),
            compression_level: 6,
            max_file_size_mb: 100,
            batch_size: 10,
            retry_attempts: 3,
            backup_interval_minutes: 60,
            debounce_seconds: 5,
        }
    }
}

fn default_watched_directories() -> Vec<PathBuf> {
    let home = dirs_home();
    vec![home.join("Documents"), home.join("Pictures")]
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VersioningSection {
    pub max_versions_per_file: u32,
    pub retention_days: u32,
    pub cleanup_interval_hours: u64,
}

impl Default for VersioningSection {
    fn default() -> Self {
        Self {
            max_versions_per_file: 5,
            retention_days: 90,
            cleanup_interval_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub path: PathBuf,
    pub backup_db_interval_hours: u64,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/backup.db"),
            backup_db_interval_hours: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    pub file: Option<PathBuf>,
    pub max_size_mb: u64,
    pub backup_count: u32,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: Some(PathBuf::from("logs/backup.log")),
            max_size_mb: 10,
            backup_count: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSection {
    pub host: String,
    pub port: u16,
    pub debug: bool,
}

impl Default for WebSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5000,
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionSection {
    pub key_derivation_iterations: u32,
}

impl Default for EncryptionSection {
    fn default() -> Self {
        Self {
            key_derivation_iterations: 100_000,
        }
    }
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            backup: BackupSection::default(),
            versioning: VersioningSection::default(),
            database: DatabaseSection::default(),
            logging: LoggingSection::default(),
            web: WebSection::default(),
            encryption: EncryptionSection::default(),
        }
    }
}

/// Fully resolved configuration: file-backed tunables plus environment
/// secrets, read once and handed explicitly to every constructor.
#[derive(Debug, Clone)]
pub struct Config {
    pub raw: RawConfig,
    pub object_store_connection_string: String,
    pub object_store_container: String,
    pub encryption_key: String,
    pub device_id: String,
}

impl Config {
    /// Load the YAML file at `path`, writing out a default config if it
    /// does not exist, then merge in environment-provided secrets.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(text) => serde_yaml::from_str(&text)
                .map_err(|e| BackupError::config(format!("invalid config file {path:?}: {e}")))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let default = RawConfig::default();
                Self::write_default(path, &default)?;
                default
            }
            Err(e) => return Err(BackupError::io(path, e)),
        };

        Ok(Self::from_raw(raw))
    }

    fn write_default(path: &Path, raw: &RawConfig) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| BackupError::io(parent, e))?;
            }
        }
        let text = serde_yaml::to_string(raw)
            .map_err(|e| BackupError::config(format!("failed to render default config: {e}")))?;
        std::fs::write(path, text).map_err(|e| BackupError::io(path, e))
    }

    fn from_raw(raw: RawConfig) -> Self {
        Self {
            object_store_connection_string: std::env::var("BACKUP_OBJECT_STORE_URL")
                .unwrap_or_default(),
            object_store_container: std::env::var("BACKUP_CONTAINER_NAME")
                .unwrap_or_else(|_| "backups".into()),
            encryption_key: std::env::var("BACKUP_ENCRYPTION_KEY").unwrap_or_default(),
            device_id: std::env::var("DEVICE_ID").unwrap_or_else(|_| "default-device".into()),
            raw,
        }
    }

    /// Validate the secrets required to actually run the agent are present.
    /// Called once at startup; never re-read from the environment after.
    pub fn require_secrets(&self) -> Result<()> {
        if self.encryption_key.is_empty() {
            return Err(BackupError::config(
                "BACKUP_ENCRYPTION_KEY is not set; refusing to start without an encryption key",
            ));
        }
        if self.object_store_connection_string.is_empty() {
            return Err(BackupError::config(
                "BACKUP_OBJECT_STORE_URL is not set; refusing to start without object storage",
            ));
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn for_test() -> Self {
        Self {
            raw: RawConfig::default(),
            object_store_connection_string: "memory://test".into(),
            object_store_container: "test-backups".into(),
            encryption_key: "test-passphrase".into(),
            device_id: "test-device".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn loads_default_config_when_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/vaultkeep.yaml");
        let cfg = Config::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.raw.backup.compression_level, 6);
        assert_eq!(cfg.raw.versioning.max_versions_per_file, 5);
    }

    #[test]
    fn round_trips_explicit_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vaultkeep.yaml");
        let mut raw = RawConfig::default();
        raw.backup.batch_size = 42;
        std::fs::write(&path, serde_yaml::to_string(&raw).unwrap()).unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.raw.backup.batch_size, 42);
    }

    #[test]
    fn require_secrets_rejects_missing_key() {
        std::env::remove_var("BACKUP_ENCRYPTION_KEY");
        std::env::remove_var("BACKUP_OBJECT_STORE_URL");
        let cfg = Config::from_raw(RawConfig::default());
        assert!(cfg.require_secrets().is_err());
    }
}
