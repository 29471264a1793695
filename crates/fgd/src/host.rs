//! Background execution host.
//!
//! The host is the long-lived owner of the tracking pipeline. It turns
//! start commands (begin, stop, reload, screen-off) into operations on the
//! poller, the tracker and the limit cache, and holds the liveness lease for
//! as long as it is tracking. Like the tracker it runs as an actor: one
//! command at a time, reached through a cloneable [`HostHandle`].
//!
//! ```text
//!  start command ──▶ HostHandle ──(mpsc)──▶ HostActor ──┬──▶ ForegroundPoller
//!                                                      ├──▶ forwarder ──▶ TrackerHandle
//!                                                      ├──▶ LimitCache::reload
//!                                                      └──▶ LivenessLease
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Lease, store and tracker failures are logged; dispatch still completes

use std::sync::Arc;
use std::time::Duration;

use fg_core::{Escalation, ForegroundEvent, SessionRecord};
use fg_protocol::{CommandError, HostCommand, SessionStatus};
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::limiter::LimitCache;
use crate::poller::ForegroundPoller;
use crate::ports::{Clock, KeepAlive, PortResult, SessionStore};
use crate::tracker::{FinalizeReason, TrackerError, TrackerHandle};

const HOST_BUFFER: usize = 32;

/// Errors returned by the host handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("host has shut down")]
    ChannelClosed,

    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

// ============================================================================
// Liveness Lease
// ============================================================================

/// Held while tracking; releases the keep-alive status when dropped.
pub struct LivenessLease {
    keep_alive: Arc<dyn KeepAlive>,
    released: bool,
}

impl LivenessLease {
    /// # Errors
    ///
    /// Returns the keep-alive failure; nothing is held in that case.
    pub fn acquire(keep_alive: Arc<dyn KeepAlive>) -> PortResult<Self> {
        keep_alive.acquire()?;
        info!("Liveness lease acquired");
        Ok(Self {
            keep_alive,
            released: false,
        })
    }

    /// Releases the lease, reporting failure.
    ///
    /// # Errors
    ///
    /// Returns the keep-alive failure. The lease counts as released either way.
    pub fn release(mut self) -> PortResult<()> {
        self.released = true;
        let result = self.keep_alive.release();
        if result.is_ok() {
            info!("Liveness lease released");
        }
        result
    }
}

impl Drop for LivenessLease {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.keep_alive.release() {
                warn!(error = %e, "Failed to release liveness lease");
            }
        }
    }
}

// ============================================================================
// Startup
// ============================================================================

/// Commands to run when the process starts.
///
/// `action` is the start command's tag (absent means begin). When a lease
/// was left behind by a killed process, tracking resumes even if the
/// redelivered command was something else.
///
/// # Errors
///
/// Returns `CommandError::UnknownAction` for an unrecognised tag.
pub fn startup_commands(
    action: Option<&str>,
    stale_lease: bool,
) -> Result<Vec<HostCommand>, CommandError> {
    let command = HostCommand::from_action(action)?;
    let resume = stale_lease
        && !matches!(
            command,
            HostCommand::BeginTracking | HostCommand::StopTracking
        );

    if resume {
        info!(action = %command, "Resuming tracking after unclean exit");
        Ok(vec![HostCommand::BeginTracking, command])
    } else {
        Ok(vec![command])
    }
}

// ============================================================================
// Actor
// ============================================================================

/// Collaborators the host needs.
#[derive(Clone)]
pub struct HostParts {
    pub tracker: TrackerHandle,
    pub poller: Arc<ForegroundPoller>,
    pub limits: Arc<LimitCache>,
    pub store: Arc<dyn SessionStore>,
    pub keep_alive: Arc<dyn KeepAlive>,
    pub clock: Arc<dyn Clock>,
    /// Periodic limit re-evaluation while tracking
    pub limit_check_interval: Duration,
}

enum HostRequest {
    Dispatch {
        command: HostCommand,
        respond_to: oneshot::Sender<Result<(), HostError>>,
    },
    Status {
        respond_to: oneshot::Sender<SessionStatus>,
    },
    Shutdown {
        respond_to: oneshot::Sender<Result<Option<SessionRecord>, HostError>>,
    },
}

struct Forwarder {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

struct HostActor {
    receiver: mpsc::Receiver<HostRequest>,
    parts: HostParts,
    lease: Option<LivenessLease>,
    forwarder: Option<Forwarder>,
}

impl HostActor {
    async fn run(mut self) {
        info!("Tracking host starting");

        while let Some(request) = self.receiver.recv().await {
            match request {
                HostRequest::Dispatch {
                    command,
                    respond_to,
                } => {
                    let result = self.dispatch(command).await;
                    let _ = respond_to.send(result);
                }
                HostRequest::Status { respond_to } => {
                    let _ = respond_to.send(self.status().await);
                }
                HostRequest::Shutdown { respond_to } => {
                    let result = self.shutdown().await;
                    let _ = respond_to.send(result);
                    info!("Tracking host stopped");
                    return;
                }
            }
        }

        // Every handle dropped without an explicit shutdown.
        if let Err(e) = self.shutdown().await {
            debug!(error = %e, "Tracker already gone at host stop");
        }
        info!("Tracking host stopped");
    }

    async fn dispatch(&mut self, command: HostCommand) -> Result<(), HostError> {
        debug!(command = %command, "Dispatching host command");

        match command {
            HostCommand::BeginTracking => {
                self.begin_tracking().await;
                Ok(())
            }
            HostCommand::StopTracking => self.stop_tracking().await,
            HostCommand::ReloadLimits => {
                self.reload_limits().await;
                Ok(())
            }
            HostCommand::ScreenOff => {
                let at = self.parts.clock.now();
                self.parts
                    .tracker
                    .finalize(at, FinalizeReason::ScreenOff)
                    .await?;
                Ok(())
            }
        }
    }

    async fn begin_tracking(&mut self) {
        self.reload_limits().await;

        if self.lease.is_none() {
            match LivenessLease::acquire(Arc::clone(&self.parts.keep_alive)) {
                Ok(lease) => self.lease = Some(lease),
                Err(e) => warn!(error = %e, "Could not acquire liveness lease, tracking anyway"),
            }
        }

        // Subscribe before the poller can publish its first event.
        let forwarder_alive = self
            .forwarder
            .as_ref()
            .is_some_and(|f| !f.handle.is_finished());
        if !forwarder_alive {
            self.forwarder = Some(self.spawn_forwarder());
        }

        if self.parts.poller.start_polling() {
            info!("Tracking started");
        }
    }

    async fn stop_tracking(&mut self) -> Result<(), HostError> {
        // Halt the producers first so nothing reopens the session.
        self.halt_producers().await;

        let at = self.parts.clock.now();
        let result = self
            .parts
            .tracker
            .finalize(at, FinalizeReason::StopTracking)
            .await;

        self.release_lease();
        info!("Tracking stopped");
        result.map(|_| ()).map_err(HostError::from)
    }

    async fn shutdown(&mut self) -> Result<Option<SessionRecord>, HostError> {
        info!("Tracking host shutting down");
        self.halt_producers().await;

        let at = self.parts.clock.now();
        let result = self.parts.tracker.finalize_for_shutdown(at).await;

        self.release_lease();
        result.map_err(HostError::from)
    }

    async fn reload_limits(&mut self) {
        let report = self.parts.limits.reload(self.parts.store.as_ref()).await;
        info!(
            loaded = report.loaded,
            rejected = report.rejected,
            store_failed = report.store_failed,
            "Limit settings loaded"
        );
    }

    async fn status(&self) -> SessionStatus {
        let tracker = self.parts.tracker.status().await;
        let limiter = tracker.limiter.as_ref();

        SessionStatus {
            tracking: self.is_tracking(),
            package: tracker.session.as_ref().map(|s| s.package().clone()),
            started_at: tracker.session.as_ref().map(|s| s.started_at()),
            limit_ms: limiter.map(|l| l.config().limit().as_millis() as u64),
            warning: limiter
                .map(|l| l.state_of(Escalation::Warning))
                .unwrap_or_default(),
            intervention: limiter
                .map(|l| l.state_of(Escalation::Intervention))
                .unwrap_or_default(),
        }
    }

    fn is_tracking(&self) -> bool {
        self.parts.poller.is_polling()
    }

    /// Stops the poller and waits for the forwarder to exit, so no event it
    /// already pulled can land behind the finalize that follows.
    async fn halt_producers(&mut self) {
        self.parts.poller.stop_polling();
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.cancel.cancel();
            if let Err(e) = forwarder.handle.await {
                warn!(error = %e, "Event forwarder ended abnormally");
            }
        }
    }

    fn release_lease(&mut self) {
        if let Some(lease) = self.lease.take() {
            if let Err(e) = lease.release() {
                warn!(error = %e, "Failed to release liveness lease");
            }
        }
    }

    fn spawn_forwarder(&self) -> Forwarder {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(forward_events(
            self.parts.poller.subscribe(),
            self.parts.tracker.clone(),
            Arc::clone(&self.parts.clock),
            self.parts.limit_check_interval,
            cancel.clone(),
        ));
        Forwarder { handle, cancel }
    }
}

/// Feeds polled events to the tracker and ticks limit checks.
async fn forward_events(
    mut events: broadcast::Receiver<ForegroundEvent>,
    tracker: TrackerHandle,
    clock: Arc<dyn Clock>,
    check_interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(check_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Ok(event) => {
                    if tracker.observe(event).await.is_err() {
                        warn!("Tracker gone, forwarder stopping");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Forwarder lagged behind the poller");
                }
                Err(RecvError::Closed) => break,
            },
            _ = ticker.tick() => {
                tracker.check_limits(clock.now()).await;
            }
        }
    }
    debug!("Event forwarder stopped");
}

// ============================================================================
// Handle
// ============================================================================

/// Handle for sending start commands to the host.
#[derive(Clone)]
pub struct HostHandle {
    sender: mpsc::Sender<HostRequest>,
}

impl HostHandle {
    /// Resolves an action tag and dispatches it.
    ///
    /// # Errors
    ///
    /// - `HostError::Command` for an unknown tag
    /// - `HostError::ChannelClosed` if the host has shut down
    pub async fn handle_start_command(&self, action: Option<&str>) -> Result<HostCommand, HostError> {
        let command = HostCommand::from_action(action)?;
        self.dispatch(command).await?;
        Ok(command)
    }

    /// Dispatches one command and waits for it to be applied.
    ///
    /// # Errors
    ///
    /// - `HostError::ChannelClosed` if the host has shut down
    /// - `HostError::Tracker` if the tracker has shut down
    pub async fn dispatch(&self, command: HostCommand) -> Result<(), HostError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(HostRequest::Dispatch {
                command,
                respond_to: tx,
            })
            .await
            .map_err(|_| HostError::ChannelClosed)?;
        rx.await.map_err(|_| HostError::ChannelClosed)?
    }

    /// Tracking flag plus the tracker's session state.
    ///
    /// Returns an idle status if the host has shut down.
    pub async fn status(&self) -> SessionStatus {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(HostRequest::Status { respond_to: tx })
            .await
            .is_err()
        {
            return SessionStatus::default();
        }
        rx.await.unwrap_or_default()
    }

    /// Stops producers, synchronously finalizes the open session, waits for
    /// every pending session write and releases the lease. The host exits
    /// afterwards.
    ///
    /// # Errors
    ///
    /// - `HostError::ChannelClosed` if the host has already shut down
    pub async fn shutdown(&self) -> Result<Option<SessionRecord>, HostError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(HostRequest::Shutdown { respond_to: tx })
            .await
            .map_err(|_| HostError::ChannelClosed)?;
        rx.await.map_err(|_| HostError::ChannelClosed)?
    }

    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// Spawn the host actor.
pub fn spawn_host(parts: HostParts) -> HostHandle {
    let (tx, rx) = mpsc::channel(HOST_BUFFER);
    let actor = HostActor {
        receiver: rx,
        parts,
        lease: None,
        forwarder: None,
    };
    tokio::spawn(actor.run());
    HostHandle { sender: tx }
}
