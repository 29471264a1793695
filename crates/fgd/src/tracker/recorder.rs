//! Session record persistence.
//!
//! Normal finalization hands records to [`SessionRecorder::record_detached`],
//! which spawns a bounded background write and logs failures. Teardown uses
//! [`SessionRecorder::record_blocking`] followed by
//! [`SessionRecorder::wait_idle`], so the last record is on disk before the
//! daemon exits.

use std::sync::Arc;

use fg_core::SessionRecord;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::ports::{PortResult, SessionStore};

/// Maximum concurrent background session writes.
pub const MAX_INFLIGHT_WRITES: usize = 8;

/// Writes session records to the store.
#[derive(Clone)]
pub struct SessionRecorder {
    store: Arc<dyn SessionStore>,
    permits: Arc<Semaphore>,
    tasks: TaskTracker,
}

impl SessionRecorder {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            permits: Arc::new(Semaphore::new(MAX_INFLIGHT_WRITES)),
            tasks: TaskTracker::new(),
        }
    }

    /// Writes `record` in the background. Failures are logged and dropped.
    pub fn record_detached(&self, record: SessionRecord) {
        let store = Arc::clone(&self.store);
        let permits = Arc::clone(&self.permits);

        self.tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                warn!(package = %record.package, "Recorder closed, dropping session record");
                return;
            };

            match store.record_session(&record).await {
                Ok(()) => debug!(
                    package = %record.package,
                    duration_ms = record.duration().as_millis() as u64,
                    "Session recorded"
                ),
                Err(e) => warn!(
                    package = %record.package,
                    error = %e,
                    "Failed to record session"
                ),
            }
        });
    }

    /// Writes `record` and waits for the result.
    pub async fn record_blocking(&self, record: &SessionRecord) -> PortResult<()> {
        self.store.record_session(record).await
    }

    /// Waits for every background write spawned so far.
    pub async fn wait_idle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    /// Number of background writes still running.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::PortError;
    use async_trait::async_trait;
    use fg_core::{LimitEntry, PackageId, Timestamp};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct SlowStore {
        written: Mutex<Vec<SessionRecord>>,
        fail: bool,
    }

    #[async_trait]
    impl SessionStore for SlowStore {
        async fn record_session(&self, record: &SessionRecord) -> PortResult<()> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                return Err(PortError::io("read-only filesystem"));
            }
            self.written.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn limited_apps(&self) -> PortResult<Vec<LimitEntry>> {
            Ok(Vec::new())
        }
    }

    fn record(package: &str) -> SessionRecord {
        SessionRecord::new(
            PackageId::new(package),
            Timestamp::from_millis(0),
            Timestamp::from_millis(1_000),
        )
    }

    #[tokio::test]
    async fn test_detached_write_does_not_block_caller() {
        let store = Arc::new(SlowStore::default());
        let recorder = SessionRecorder::new(store.clone());

        recorder.record_detached(record("a"));
        assert!(store.written.lock().unwrap().is_empty());
        assert_eq!(recorder.in_flight(), 1);

        recorder.wait_idle().await;
        assert_eq!(store.written.lock().unwrap().len(), 1);
        assert_eq!(recorder.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_wait_idle_allows_later_writes() {
        let store = Arc::new(SlowStore::default());
        let recorder = SessionRecorder::new(store.clone());

        recorder.record_detached(record("a"));
        recorder.wait_idle().await;
        recorder.record_detached(record("b"));
        recorder.wait_idle().await;

        let packages: Vec<String> = store
            .written
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.package.to_string())
            .collect();
        assert_eq!(packages, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_write_is_swallowed() {
        let store = Arc::new(SlowStore {
            fail: true,
            ..Default::default()
        });
        let recorder = SessionRecorder::new(store.clone());

        recorder.record_detached(record("a"));
        recorder.wait_idle().await;
        assert!(recorder.record_blocking(&record("b")).await.is_err());
    }
}
