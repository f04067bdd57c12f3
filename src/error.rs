//! Error taxonomy for the backup pipeline.
//!
//! Mirrors the policy table in `SPEC_FULL.md` §7: each variant carries the
//! retry/propagation behaviour in its name rather than in a side table, so
//! callers match on the type instead of inspecting a string.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// The result of a single backup or restore attempt at the pipeline boundary.
#[derive(Debug, Error, Diagnostic)]
pub enum BackupError {
    /// A remote-storage or network failure that is worth retrying with backoff.
    #[error("transient failure talking to object storage: {message}")]
    #[diagnostic(help("this is usually a network blip; it will be retried automatically"))]
    Transient { message: String },

    /// The requested object or catalog row does not exist. Never retried.
    #[error("not found: {what}")]
    #[diagnostic(help("check the id or path and try again"))]
    NotFound { what: String },

    /// Decryption or checksum verification failed. Fatal for that record.
    #[error("integrity check failed for {path}: {reason}")]
    #[diagnostic(help(
        "the stored ciphertext or checksum does not match; the encryption key may be wrong \
         or the object may be corrupted"
    ))]
    Integrity { path: PathBuf, reason: String },

    /// The file was intentionally skipped by the eligibility filter.
    #[error("{path} is not eligible for backup: {reason}")]
    Eligibility { path: PathBuf, reason: String },

    /// A filesystem error scoped to one file. Recorded as a per-file error,
    /// not fatal to the process.
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration is missing or invalid. Fatal at startup.
    #[error("configuration error: {message}")]
    #[diagnostic(help("check your config file and required environment variables"))]
    Config { message: String },

    /// `process_queue` was already running; this call is an idempotent no-op.
    #[error("a queue drain is already in progress")]
    QueueBusy,

    /// Wraps the embedded catalog database's own error type.
    #[error("catalog error: {0}")]
    Catalog(#[from] rusqlite::Error),

    /// Wraps serialization failures for metadata/config payloads.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl BackupError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn integrity(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Integrity {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn eligibility(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Eligibility {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether the pipeline should retry this operation with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_not_retryable() {
        assert!(!BackupError::not_found("backup 42").is_retryable());
    }

    #[test]
    fn transient_is_retryable() {
        assert!(BackupError::transient("connection reset").is_retryable());
    }

    #[test]
    fn display_includes_path() {
        let err = BackupError::integrity("/tmp/foo.txt", "checksum mismatch");
        assert!(err.to_string().contains("/tmp/foo.txt"));
    }
}
