//! Client interface for interacting with the SessionTrackerActor.
//!
//! The `TrackerHandle` is cheap to clone: the poller forwarder, the focus
//! source, the host and every control connection hold their own copy, all
//! feeding the same command channel.

use fg_core::{ForegroundEvent, SessionRecord, Timestamp};
use tokio::sync::{broadcast, mpsc, oneshot};

use super::commands::{FinalizeReason, TrackerCommand, TrackerError, TrackerEvent, TrackerStatus};

/// Handle for interacting with the tracker actor.
#[derive(Clone)]
pub struct TrackerHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<TrackerCommand>,

    /// Event broadcaster for subscribing to updates
    event_sender: broadcast::Sender<TrackerEvent>,
}

impl TrackerHandle {
    pub fn new(
        sender: mpsc::Sender<TrackerCommand>,
        event_sender: broadcast::Sender<TrackerEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Feeds an observed foreground event to the state machine.
    ///
    /// Returns once the event is queued, not once it is applied.
    ///
    /// # Errors
    ///
    /// - `TrackerError::ChannelClosed` if the actor has shut down
    pub async fn observe(&self, event: ForegroundEvent) -> Result<(), TrackerError> {
        self.sender
            .send(TrackerCommand::Observe { event })
            .await
            .map_err(|_| TrackerError::ChannelClosed)
    }

    /// Reports a content change; returns true if it came from the tracked
    /// package.
    ///
    /// # Errors
    ///
    /// - `TrackerError::ChannelClosed` if the actor has shut down
    pub async fn content_changed(&self, event: ForegroundEvent) -> Result<bool, TrackerError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(TrackerCommand::ContentChanged {
                event,
                respond_to: tx,
            })
            .await
            .map_err(|_| TrackerError::ChannelClosed)?;

        rx.await.map_err(|_| TrackerError::ChannelClosed)
    }

    /// Asks the tracker to re-evaluate limits at `now`.
    ///
    /// Fire-and-forget: send errors are ignored (actor may be shutting down).
    pub async fn check_limits(&self, now: Timestamp) {
        let _ = self.sender.send(TrackerCommand::CheckLimits { now }).await;
    }

    /// Closes the open session at `at`, returning its record.
    ///
    /// The record is written in the background.
    ///
    /// # Errors
    ///
    /// - `TrackerError::ChannelClosed` if the actor has shut down
    pub async fn finalize(
        &self,
        at: Timestamp,
        reason: FinalizeReason,
    ) -> Result<Option<SessionRecord>, TrackerError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(TrackerCommand::Finalize {
                at,
                reason,
                respond_to: tx,
            })
            .await
            .map_err(|_| TrackerError::ChannelClosed)?;

        rx.await.map_err(|_| TrackerError::ChannelClosed)
    }

    /// Closes the open session and waits until every session record has
    /// been written.
    ///
    /// # Errors
    ///
    /// - `TrackerError::ChannelClosed` if the actor has shut down
    pub async fn finalize_for_shutdown(
        &self,
        at: Timestamp,
    ) -> Result<Option<SessionRecord>, TrackerError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(TrackerCommand::FinalizeForShutdown { at, respond_to: tx })
            .await
            .map_err(|_| TrackerError::ChannelClosed)?;

        rx.await.map_err(|_| TrackerError::ChannelClosed)
    }

    /// Current session and escalation state.
    ///
    /// Returns the idle status if communication with the actor fails.
    pub async fn status(&self) -> TrackerStatus {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(TrackerCommand::GetStatus { respond_to: tx })
            .await
            .is_err()
        {
            return TrackerStatus::default();
        }

        rx.await.unwrap_or_default()
    }

    /// Subscribe to tracker events.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.event_sender.subscribe()
    }

    /// Check if the actor is still running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fg_core::PackageId;

    fn create_test_handle() -> (TrackerHandle, mpsc::Receiver<TrackerCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(10);
        let (event_tx, _) = broadcast::channel(10);
        (TrackerHandle::new(cmd_tx, event_tx), cmd_rx)
    }

    #[tokio::test]
    async fn test_observe_sends_command() {
        let (handle, mut rx) = create_test_handle();
        let event = ForegroundEvent::resumed("a", Timestamp::from_millis(1));

        handle.observe(event.clone()).await.unwrap();

        match rx.recv().await {
            Some(TrackerCommand::Observe { event: received }) => assert_eq!(received, event),
            other => panic!("Expected Observe, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_observe_channel_closed_error() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        let result = handle
            .observe(ForegroundEvent::resumed("a", Timestamp::from_millis(1)))
            .await;
        assert_eq!(result, Err(TrackerError::ChannelClosed));
        assert!(!handle.is_connected());
    }

    #[tokio::test]
    async fn test_status_defaults_on_channel_close() {
        let (handle, rx) = create_test_handle();
        drop(rx);
        assert_eq!(handle.status().await, TrackerStatus::default());
    }

    #[tokio::test]
    async fn test_content_changed_round_trip() {
        let (handle, mut rx) = create_test_handle();

        tokio::spawn(async move {
            if let Some(TrackerCommand::ContentChanged { event, respond_to }) = rx.recv().await {
                let _ = respond_to.send(event.package == Some(PackageId::new("a")));
            }
        });

        let tracked = handle
            .content_changed(ForegroundEvent::content_changed("a", Timestamp::from_millis(1)))
            .await;
        assert_eq!(tracked, Ok(true));
    }

    #[tokio::test]
    async fn test_check_limits_ignores_closed_channel() {
        let (handle, rx) = create_test_handle();
        drop(rx);
        handle.check_limits(Timestamp::from_millis(1)).await;
    }
}
