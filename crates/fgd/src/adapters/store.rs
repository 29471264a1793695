//! File-backed session store.
//!
//! Sessions are appended as JSON lines; limits are read from a TOML file on
//! every call so edits take effect on the next reload.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fg_core::{LimitEntry, SessionRecord};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::ports::{PortError, PortResult, SessionStore};

/// Shape of `limits.toml`.
///
/// ```toml
/// [[limit]]
/// package = "org.mozilla.firefox"
/// limit_ms = 1800000
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsFile {
    #[serde(default, rename = "limit")]
    pub limits: Vec<LimitEntry>,
}

/// Session log plus limits file.
#[derive(Debug, Clone)]
pub struct JsonlSessionStore {
    sessions_path: PathBuf,
    limits_path: PathBuf,
}

impl JsonlSessionStore {
    pub fn new(sessions_path: impl Into<PathBuf>, limits_path: impl Into<PathBuf>) -> Self {
        Self {
            sessions_path: sessions_path.into(),
            limits_path: limits_path.into(),
        }
    }

    pub fn sessions_path(&self) -> &Path {
        &self.sessions_path
    }

    /// Reads every recorded session, skipping lines that do not parse.
    ///
    /// # Errors
    ///
    /// Returns `PortError::Io` if the file exists but cannot be read.
    pub async fn read_sessions(&self) -> PortResult<Vec<SessionRecord>> {
        let content = match fs::read_to_string(&self.sessions_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PortError::io(e)),
        };

        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable session line");
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl SessionStore for JsonlSessionStore {
    async fn record_session(&self, record: &SessionRecord) -> PortResult<()> {
        let mut line = serde_json::to_string(record).map_err(|e| PortError::Malformed(e.to_string()))?;
        line.push('\n');

        if let Some(parent) = self.sessions_path.parent() {
            fs::create_dir_all(parent).await.map_err(PortError::io)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.sessions_path)
            .await
            .map_err(PortError::io)?;
        file.write_all(line.as_bytes()).await.map_err(PortError::io)?;
        file.flush().await.map_err(PortError::io)?;
        Ok(())
    }

    async fn limited_apps(&self) -> PortResult<Vec<LimitEntry>> {
        let content = match fs::read_to_string(&self.limits_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.limits_path.display(), "No limits file");
                return Ok(Vec::new());
            }
            Err(e) => return Err(PortError::io(e)),
        };

        let file: LimitsFile =
            toml::from_str(&content).map_err(|e| PortError::Malformed(e.to_string()))?;
        Ok(file.limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fg_core::{PackageId, Timestamp};

    fn store(dir: &Path) -> JsonlSessionStore {
        JsonlSessionStore::new(dir.join("state/sessions.jsonl"), dir.join("limits.toml"))
    }

    #[tokio::test]
    async fn test_sessions_append() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let first = SessionRecord::new(PackageId::new("a"), Timestamp::from_millis(0), Timestamp::from_millis(10));
        let second = SessionRecord::new(PackageId::new("b"), Timestamp::from_millis(10), Timestamp::from_millis(25));
        store.record_session(&first).await.unwrap();
        store.record_session(&second).await.unwrap();

        assert_eq!(store.read_sessions().await.unwrap(), vec![first, second]);
    }

    #[tokio::test]
    async fn test_read_sessions_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        std::fs::create_dir_all(dir.path().join("state")).unwrap();
        std::fs::write(
            store.sessions_path(),
            "not json\n{\"package\":\"a\",\"start\":1,\"end\":2}\n",
        )
        .unwrap();

        let sessions = store.read_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].package, PackageId::new("a"));
    }

    #[tokio::test]
    async fn test_missing_limits_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(store(dir.path()).limited_apps().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_limits_file_parsed_unvalidated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("limits.toml"),
            r#"
            [[limit]]
            package = "firefox"
            limit_ms = 60000

            [[limit]]
            package = ""
            limit_ms = -5
            "#,
        )
        .unwrap();

        let entries = store(dir.path()).limited_apps().await.unwrap();
        assert_eq!(
            entries,
            vec![LimitEntry::new("firefox", 60_000), LimitEntry::new("", -5)]
        );
    }

    #[tokio::test]
    async fn test_malformed_limits_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("limits.toml"), "[[limit]]\npackage = 3\n").unwrap();

        let err = store(dir.path()).limited_apps().await.unwrap_err();
        assert!(matches!(err, PortError::Malformed(_)));
    }
}
