//! Deterministic object key scheme (§4.B, §6).
//!
//! `{device_id}/{YYYY}/{MM}/{sanitized_path}/v{version}_{YYYYMMDD_HHMMSS}.backup`,
//! carried over one-for-one from
//! `original_source/src/azure_client.py::generate_blob_name`.

use chrono::{DateTime, Datelike, Utc};

/// Replace path separators and drive-letter colons so the file path can be
/// embedded as a flat key segment, and strip any leading slash.
pub fn sanitize_path(file_path: &str) -> String {
    file_path
        .replace('\\', "/")
        .replace(':', "_")
        .trim_start_matches('/')
        .to_string()
}

/// Build the object key for one version of one file.
pub fn object_key(device_id: &str, file_path: &str, version: u32, timestamp: DateTime<Utc>) -> String {
    let sanitized = sanitize_path(file_path);
    format!(
        "{device_id}/{year}/{month:02}/{sanitized}/v{version}_{stamp}.backup",
        year = timestamp.format("%Y"),
        month = timestamp.month(),
        stamp = timestamp.format("%Y%m%d_%H%M%S"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sanitizes_windows_paths() {
        assert_eq!(sanitize_path(r"C:\Users\me\file.txt"), "C_/Users/me/file.txt");
    }

    #[test]
    fn strips_leading_slash() {
        assert_eq!(sanitize_path("/home/me/file.txt"), "home/me/file.txt");
    }

    #[test]
    fn builds_hierarchical_key() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 5, 10, 30, 0).unwrap();
        let key = object_key("dev-1", "/home/me/file.txt", 3, ts);
        assert_eq!(key, "dev-1/2026/03/home/me/file.txt/v3_20260305_103000.backup");
    }
}
