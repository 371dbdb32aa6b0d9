// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Spill files for the retry queue.
//!
//! A spill writes the whole pending list as a pretty-printed JSON array into
//! `retry_backup_<YYYYMMDD_HHMMSS>.json` under the configured directory. The
//! files are meant for manual replay; nothing reads them back automatically.

use crate::error::BackupError;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};

const BACKUP_FILE_PREFIX: &str = "retry_backup_";
const BACKUP_FILE_SUFFIX: &str = ".json";

/// File name for a spill taken at `at`, e.g. `retry_backup_20240131_235959.json`.
pub fn backup_file_name(at: DateTime<Local>) -> String {
    format!(
        "{BACKUP_FILE_PREFIX}{}{BACKUP_FILE_SUFFIX}",
        at.format("%Y%m%d_%H%M%S")
    )
}

/// Creates `dir` if needed and writes `items` to a new timestamped file in it.
pub async fn write_backup<T>(dir: &Path, items: &[T]) -> Result<PathBuf, BackupError>
where
    T: Serialize,
{
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| BackupError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;

    let path = dir.join(backup_file_name(Local::now()));
    let data = serde_json::to_vec_pretty(items)?;
    tokio::fs::write(&path, data)
        .await
        .map_err(|source| BackupError::Write {
            path: path.clone(),
            source,
        })?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn is_backup_file_name(name: &str) -> bool {
        name.strip_prefix(BACKUP_FILE_PREFIX)
            .and_then(|rest| rest.strip_suffix(BACKUP_FILE_SUFFIX))
            .is_some_and(|stamp| {
                stamp.len() == 15
                    && stamp.char_indices().all(|(i, c)| {
                        if i == 8 {
                            c == '_'
                        } else {
                            c.is_ascii_digit()
                        }
                    })
            })
    }

    #[test]
    fn file_name_uses_compact_local_timestamp() {
        let at = Local
            .with_ymd_and_hms(2024, 1, 31, 23, 59, 58)
            .single()
            .expect("unambiguous local time");
        assert_eq!(backup_file_name(at), "retry_backup_20240131_235958.json");
        assert!(is_backup_file_name(&backup_file_name(at)));
    }

    #[test]
    fn recognizes_only_backup_names() {
        assert!(is_backup_file_name("retry_backup_20240101_000000.json"));
        assert!(!is_backup_file_name("retry_backup_2024.json"));
        assert!(!is_backup_file_name("retry_backup_20240101-000000.json"));
        assert!(!is_backup_file_name("hostpulse_2024-01-01.log"));
    }

    #[tokio::test]
    async fn write_creates_directory_and_pretty_json() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = tmp.path().join("nested").join("backup");

        let items = vec![json!({"timestamp": 1, "data": {"agent_id": "a"}})];
        let path = write_backup(&dir, &items).await.expect("write should succeed");

        assert!(path.starts_with(&dir));
        let contents = std::fs::read_to_string(&path).expect("backup readable");
        assert!(contents.starts_with("[\n  {"));
        let parsed: serde_json::Value = serde_json::from_str(&contents).expect("valid json");
        assert_eq!(parsed, json!(items));
    }

    #[tokio::test]
    async fn write_into_a_file_path_fails() {
        let tmp = tempfile::NamedTempFile::new().expect("tempfile");
        let result = write_backup(tmp.path(), &[json!({})]).await;
        assert!(matches!(result, Err(BackupError::CreateDir { .. })));
    }
}
