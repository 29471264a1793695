//! Session tracker actor - owns the active session and processes commands.
//!
//! The actor is the single owner of the [`ActiveSession`] and of the
//! usage-limit engine's per-session state. Both event sources and the host
//! send commands through one mpsc channel; the actor applies them one at a
//! time, so a package is never observable without its start time and two
//! distinct-package transitions never interleave.
//!
//! # Session State Machine
//!
//! ```text
//!            report(p, t)                   report(p2 != p, t2)
//!   Idle ─────────────────▶ Active(p, t) ─────────────────────▶ Active(p2, t2)
//!    ▲                          │            finalize(p, t, end = t2)
//!    │   report(None, t) /      │
//!    └── finalize(end = t) ◀────┘
//! ```
//!
//! Every finalize writes exactly one [`SessionRecord`] and notifies the
//! limit engine; every start notifies the limit engine.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Responder send failures are ignored (the caller went away)
//! - Collaborator failures are logged and never stop the actor
//! - Notifier calls run on the [`EscalationQueue`] task, never inline

use fg_core::{ActiveSession, EventKind, ForegroundEvent, PackageId, SessionRecord, Timestamp};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};

use crate::limiter::{EscalationQueue, UsageLimitEngine};

use super::commands::{FinalizeReason, TrackerCommand, TrackerEvent, TrackerStatus};
use super::recorder::SessionRecorder;

/// The tracker actor.
pub struct SessionTrackerActor {
    /// Command receiver shared by all producers
    receiver: mpsc::Receiver<TrackerCommand>,

    /// The open session, if any
    session: Option<ActiveSession>,

    /// Escalation decisions for the open session
    limiter: UsageLimitEngine,

    /// Escalation side effects, run off the actor
    escalations: EscalationQueue,

    /// Session record writer
    recorder: SessionRecorder,

    /// Event publisher for subscribers
    event_publisher: broadcast::Sender<TrackerEvent>,
}

impl SessionTrackerActor {
    pub fn new(
        receiver: mpsc::Receiver<TrackerCommand>,
        limiter: UsageLimitEngine,
        escalations: EscalationQueue,
        recorder: SessionRecorder,
        event_publisher: broadcast::Sender<TrackerEvent>,
    ) -> Self {
        Self {
            receiver,
            session: None,
            limiter,
            escalations,
            recorder,
            event_publisher,
        }
    }

    /// Runs the actor event loop until every sender is dropped.
    pub async fn run(mut self) {
        info!("Session tracker starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        // Senders are gone; close whatever is open and flush.
        if self.finalize_for_shutdown(Timestamp::now()).await.is_some() {
            debug!("Flushed open session on tracker stop");
        }
        info!("Session tracker stopped");
    }

    async fn handle_command(&mut self, cmd: TrackerCommand) {
        match cmd {
            TrackerCommand::Observe { event } => {
                self.handle_observe(event);
            }
            TrackerCommand::ContentChanged { event, respond_to } => {
                let tracked = self.handle_content_changed(&event);
                let _ = respond_to.send(tracked);
            }
            TrackerCommand::CheckLimits { now } => {
                if let Some(package) = self.session.as_ref().map(|s| s.package().clone()) {
                    self.check_usage_limits(&package, now);
                }
            }
            TrackerCommand::Finalize {
                at,
                reason,
                respond_to,
            } => {
                let record = self.finalize_current_session(at, reason);
                let _ = respond_to.send(record);
            }
            TrackerCommand::FinalizeForShutdown { at, respond_to } => {
                let record = self.finalize_for_shutdown(at).await;
                let _ = respond_to.send(record);
            }
            TrackerCommand::GetStatus { respond_to } => {
                let _ = respond_to.send(self.status());
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_observe(&mut self, event: ForegroundEvent) {
        match event.kind {
            EventKind::AppResumed => {
                let package = event.foreground_package().cloned();
                self.report_foreground(package, event.timestamp);
            }
            EventKind::ContentChanged => {
                self.handle_content_changed(&event);
            }
            EventKind::Other => {
                trace!(package = ?event.package, "Ignoring foreground event of kind other");
            }
        }
    }

    /// Re-evaluates limits if `event` comes from the tracked package.
    fn handle_content_changed(&mut self, event: &ForegroundEvent) -> bool {
        let Some(package) = event.foreground_package() else {
            return false;
        };
        let tracked = self
            .session
            .as_ref()
            .is_some_and(|session| session.is_for(package));

        if tracked {
            let package = package.clone();
            self.check_usage_limits(&package, event.timestamp);
        } else {
            trace!(package = %package, "Content change from untracked package ignored");
        }
        tracked
    }

    /// Applies one foreground report to the state machine.
    fn report_foreground(&mut self, package: Option<PackageId>, at: Timestamp) {
        let continues = match (&self.session, &package) {
            (Some(session), Some(package)) => session.is_for(package),
            _ => false,
        };

        match package {
            Some(package) if continues => {
                // Same package again: the session continues.
                self.check_usage_limits(&package, at);
            }
            Some(package) => {
                self.finalize_current_session(at, FinalizeReason::Replaced);
                self.start_new_session(package.clone(), at);
                self.check_usage_limits(&package, at);
            }
            None => {
                self.finalize_current_session(at, FinalizeReason::NothingInForeground);
            }
        }
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    fn start_new_session(&mut self, package: PackageId, at: Timestamp) {
        info!(package = %package, started_at = %at, "Session started");

        self.limiter.on_new_session(&package, at);
        self.session = Some(ActiveSession::open(package.clone(), at));

        let _ = self.event_publisher.send(TrackerEvent::SessionStarted {
            package,
            started_at: at,
        });
    }

    /// Closes the open session; its record is written in the background.
    fn finalize_current_session(
        &mut self,
        at: Timestamp,
        reason: FinalizeReason,
    ) -> Option<SessionRecord> {
        let record = self.close_session(at, reason)?;
        self.recorder.record_detached(record.clone());
        Some(record)
    }

    /// Closes the open session and waits for all pending writes.
    async fn finalize_for_shutdown(&mut self, at: Timestamp) -> Option<SessionRecord> {
        let record = self.close_session(at, FinalizeReason::Shutdown);

        if let Some(record) = &record {
            if let Err(e) = self.recorder.record_blocking(record).await {
                warn!(package = %record.package, error = %e, "Failed to record final session");
            }
        }
        self.recorder.wait_idle().await;
        record
    }

    fn close_session(&mut self, at: Timestamp, reason: FinalizeReason) -> Option<SessionRecord> {
        // The limit engine is told even when nothing was open or the app
        // was unlimited.
        self.limiter.on_session_finalized();

        let session = self.session.take()?;
        let record = session.close(at);

        info!(
            package = %record.package,
            duration_ms = record.duration().as_millis() as u64,
            reason = %reason,
            "Session finalized"
        );

        let _ = self.event_publisher.send(TrackerEvent::SessionFinalized {
            record: record.clone(),
            reason,
        });
        Some(record)
    }

    /// Marks due thresholds and queues their side effects; never waits on
    /// the notifier.
    fn check_usage_limits(&mut self, package: &PackageId, now: Timestamp) {
        let actions = self.limiter.check_usage_limits(package, now);
        if actions.is_empty() {
            return;
        }

        for action in &actions {
            let _ = self.event_publisher.send(TrackerEvent::Escalated {
                package: action.config.package().clone(),
                escalation: action.escalation,
                elapsed: action.elapsed,
            });
        }
        self.escalations.submit(actions);
    }

    fn status(&self) -> TrackerStatus {
        TrackerStatus {
            session: self.session.clone(),
            limiter: self.limiter.session_state().cloned(),
        }
    }
}
