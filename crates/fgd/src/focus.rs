//! Window-focus event source.
//!
//! A lower-latency companion to the poller: focus and content-change
//! notifications are pushed by the desktop (through the control socket) and
//! fed into the same tracker the poller feeds. A single debounce window is
//! applied across all notifications regardless of package; anything arriving
//! inside it is dropped, not queued.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use fg_core::{EventKind, ForegroundEvent, Timestamp};
use tracing::{trace, warn};

use crate::ports::{Clock, ContentInspector};
use crate::tracker::{TrackerError, TrackerHandle};

/// Default minimum spacing between processed notifications.
pub const DEFAULT_FOCUS_DEBOUNCE: Duration = Duration::from_millis(1_000);

/// What happened to one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Arrived inside the debounce window
    Dropped,
    /// Handed to the tracker
    Forwarded,
    /// Content change from a package that is not being tracked, or a
    /// notification the tracker has no use for
    Ignored,
}

/// Debounced push-notification source.
pub struct WindowFocusSource {
    tracker: TrackerHandle,
    inspector: Arc<dyn ContentInspector>,
    clock: Arc<dyn Clock>,
    debounce: Duration,
    last_processed: Mutex<Option<Timestamp>>,
}

impl WindowFocusSource {
    pub fn new(
        tracker: TrackerHandle,
        inspector: Arc<dyn ContentInspector>,
        clock: Arc<dyn Clock>,
        debounce: Duration,
    ) -> Self {
        Self {
            tracker,
            inspector,
            clock,
            debounce,
            last_processed: Mutex::new(None),
        }
    }

    /// Handles one notification.
    ///
    /// # Errors
    ///
    /// - `TrackerError::ChannelClosed` if the tracker has shut down
    pub async fn on_notification(&self, event: ForegroundEvent) -> Result<Disposition, TrackerError> {
        if !self.admit() {
            trace!(package = ?event.package, kind = %event.kind, "Focus notification debounced");
            return Ok(Disposition::Dropped);
        }

        match event.kind {
            EventKind::AppResumed => {
                if event.foreground_package().is_none() {
                    trace!("Window change without a package ignored");
                    return Ok(Disposition::Ignored);
                }
                self.tracker.observe(event).await?;
                Ok(Disposition::Forwarded)
            }
            EventKind::ContentChanged => {
                if !self.tracker.content_changed(event.clone()).await? {
                    return Ok(Disposition::Ignored);
                }
                if let Err(e) = self.inspector.inspect(&event).await {
                    warn!(package = ?event.package, error = %e, "Content inspection failed");
                }
                Ok(Disposition::Forwarded)
            }
            EventKind::Other => Ok(Disposition::Ignored),
        }
    }

    /// Claims the debounce window if it has elapsed.
    fn admit(&self) -> bool {
        let now = self.clock.now();
        let mut last = self
            .last_processed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(previous) = *last {
            // A clock that went backwards reads as zero elapsed.
            if now.saturating_since(previous) < self.debounce {
                return false;
            }
        }
        *last = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::TrackerCommand;
    use crate::ports::{PortError, PortResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use tokio::sync::{broadcast, mpsc};

    struct ManualClock(AtomicI64);

    impl ManualClock {
        fn advance(&self, ms: i64) {
            self.0.fetch_add(ms, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Timestamp {
            Timestamp::from_millis(self.0.load(Ordering::SeqCst))
        }
    }

    #[derive(Default)]
    struct CountingInspector {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ContentInspector for CountingInspector {
        async fn inspect(&self, _event: &ForegroundEvent) -> PortResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PortError::Unavailable("window tree not accessible".to_string()));
            }
            Ok(())
        }
    }

    /// Tracker stand-in that answers content changes for `tracked` and
    /// counts observes.
    fn fake_tracker(tracked: &'static str) -> (TrackerHandle, Arc<AtomicUsize>) {
        let (cmd_tx, mut cmd_rx) = mpsc::channel(16);
        let (event_tx, _) = broadcast::channel(16);
        let observed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&observed);

        tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                match cmd {
                    TrackerCommand::Observe { .. } => {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                    TrackerCommand::ContentChanged { event, respond_to } => {
                        let _ = respond_to.send(event.package.as_ref().map(|p| p.as_str()) == Some(tracked));
                    }
                    _ => {}
                }
            }
        });

        (TrackerHandle::new(cmd_tx, event_tx), observed)
    }

    fn source(
        tracker: TrackerHandle,
        inspector: Arc<CountingInspector>,
        clock: Arc<ManualClock>,
    ) -> WindowFocusSource {
        WindowFocusSource::new(tracker, inspector, clock, DEFAULT_FOCUS_DEBOUNCE)
    }

    fn window(package: &str) -> ForegroundEvent {
        ForegroundEvent::resumed(package, Timestamp::from_millis(0))
    }

    #[tokio::test]
    async fn test_notifications_inside_debounce_are_dropped() {
        let (tracker, observed) = fake_tracker("a");
        let clock = Arc::new(ManualClock(AtomicI64::new(10_000)));
        let focus = source(tracker, Arc::new(CountingInspector::default()), clock.clone());

        assert_eq!(focus.on_notification(window("a")).await, Ok(Disposition::Forwarded));
        clock.advance(200);
        assert_eq!(focus.on_notification(window("b")).await, Ok(Disposition::Dropped));

        // Let the fake drain.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_debounce_is_global_and_reopens() {
        let (tracker, _) = fake_tracker("a");
        let clock = Arc::new(ManualClock(AtomicI64::new(0)));
        let focus = source(tracker, Arc::new(CountingInspector::default()), clock.clone());

        assert_eq!(focus.on_notification(window("a")).await, Ok(Disposition::Forwarded));
        clock.advance(999);
        assert_eq!(focus.on_notification(window("a")).await, Ok(Disposition::Dropped));
        clock.advance(1);
        assert_eq!(focus.on_notification(window("b")).await, Ok(Disposition::Forwarded));
    }

    #[tokio::test]
    async fn test_content_change_from_untracked_package_is_ignored() {
        let (tracker, _) = fake_tracker("a");
        let inspector = Arc::new(CountingInspector::default());
        let focus = source(tracker, inspector.clone(), Arc::new(ManualClock(AtomicI64::new(0))));

        let event = ForegroundEvent::content_changed("b", Timestamp::from_millis(0));
        assert_eq!(focus.on_notification(event).await, Ok(Disposition::Ignored));
        assert_eq!(inspector.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_inspection_does_not_block_later_notifications() {
        let (tracker, _) = fake_tracker("a");
        let inspector = Arc::new(CountingInspector {
            fail: true,
            ..Default::default()
        });
        let clock = Arc::new(ManualClock(AtomicI64::new(0)));
        let focus = source(tracker, inspector.clone(), clock.clone());

        let event = ForegroundEvent::content_changed("a", Timestamp::from_millis(0));
        assert_eq!(focus.on_notification(event.clone()).await, Ok(Disposition::Forwarded));
        clock.advance(1_000);
        assert_eq!(focus.on_notification(event).await, Ok(Disposition::Forwarded));
        assert_eq!(inspector.calls.load(Ordering::SeqCst), 2);
    }
}
