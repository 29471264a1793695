//! Persistent "tracking" indicator backed by a status file.
//!
//! The file exists exactly while the daemon holds its liveness lease. A file
//! still present at startup means the previous process was killed while
//! tracking, and the new process resumes tracking.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process;

use fg_core::Timestamp;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ports::{KeepAlive, PortError, PortResult};

/// Contents of the status file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingStatusFile {
    pub pid: u32,
    pub since: Timestamp,
}

/// Keep-alive lease stored as `tracking.json`.
#[derive(Debug, Clone)]
pub struct StatusFileKeepAlive {
    path: PathBuf,
}

impl StatusFileKeepAlive {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current status file contents, if any.
    pub fn read(&self) -> Option<TrackingStatusFile> {
        let content = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Unreadable status file");
                None
            }
        }
    }

    /// A lease left behind by another process.
    ///
    /// An unreadable file counts as stale too: the file only exists while
    /// some process is tracking.
    pub fn stale_lease(&self) -> bool {
        if !self.path.exists() {
            return false;
        }
        match self.read() {
            Some(status) => status.pid != process::id(),
            None => true,
        }
    }
}

impl KeepAlive for StatusFileKeepAlive {
    fn acquire(&self) -> PortResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(PortError::io)?;
        }
        let status = TrackingStatusFile {
            pid: process::id(),
            since: Timestamp::now(),
        };
        let content = serde_json::to_string(&status).map_err(|e| PortError::Malformed(e.to_string()))?;
        fs::write(&self.path, content).map_err(PortError::io)?;
        debug!(path = %self.path.display(), "Status file written");
        Ok(())
    }

    fn release(&self) -> PortResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Status file removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PortError::io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_release() {
        let dir = tempfile::tempdir().unwrap();
        let lease = StatusFileKeepAlive::new(dir.path().join("state/tracking.json"));

        lease.acquire().unwrap();
        let status = lease.read().unwrap();
        assert_eq!(status.pid, process::id());
        assert!(!lease.stale_lease());

        lease.release().unwrap();
        assert!(!lease.path().exists());
        lease.release().unwrap();
    }

    #[test]
    fn test_foreign_pid_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let lease = StatusFileKeepAlive::new(dir.path().join("tracking.json"));
        let foreign = TrackingStatusFile {
            pid: process::id().wrapping_add(1),
            since: Timestamp::from_millis(1),
        };
        fs::write(lease.path(), serde_json::to_string(&foreign).unwrap()).unwrap();

        assert!(lease.stale_lease());
    }

    #[test]
    fn test_garbage_file_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let lease = StatusFileKeepAlive::new(dir.path().join("tracking.json"));
        fs::write(lease.path(), "{").unwrap();
        assert!(lease.stale_lease());
    }

    #[test]
    fn test_no_file_is_not_stale() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!StatusFileKeepAlive::new(dir.path().join("tracking.json")).stale_lease());
    }
}
