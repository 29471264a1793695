//! Session tracker using the Actor pattern.
//!
//! The tracker is the single authority on "what is in the foreground right
//! now". It receives commands via one tokio mpsc channel that both event
//! sources publish into, and emits session events on a broadcast channel.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ ForegroundPoller│──┐
//! └─────────────────┘  │  TrackerCommand   ┌────────────────────┐   TrackerEvent
//!                      ├──(mpsc channel)──▶│ SessionTrackerActor │──(broadcast)──▶ subscribers
//! ┌─────────────────┐  │                   └─────────┬──────────┘
//! │WindowFocusSource│──┘                             │
//! └─────────────────┘                                ├──▶ UsageLimitEngine ──▶ EscalationQueue ──▶ Notifier
//!                                                    └──▶ SessionRecorder ──▶ SessionStore
//! ```

use std::sync::Arc;

use fg_core::PackageId;
use tokio::sync::{broadcast, mpsc};

use crate::limiter::{EscalationQueue, Escalator, LimitCache, UsageLimitEngine};
use crate::ports::{DisplayNameResolver, Notifier, SessionStore};

mod actor;
mod commands;
mod handle;
mod recorder;

pub use actor::SessionTrackerActor;
pub use commands::{FinalizeReason, TrackerCommand, TrackerError, TrackerEvent, TrackerStatus};
pub use handle::TrackerHandle;
pub use recorder::{SessionRecorder, MAX_INFLIGHT_WRITES};

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 100;

/// Collaborators the tracker needs.
#[derive(Clone)]
pub struct TrackerParts {
    pub store: Arc<dyn SessionStore>,
    pub notifier: Arc<dyn Notifier>,
    pub names: Arc<dyn DisplayNameResolver>,
    /// Shared limit cache, reloaded by the host
    pub limits: Arc<LimitCache>,
    /// Package brought to the foreground on intervention
    pub home_package: PackageId,
}

/// Spawn the tracker actor and return a handle for interaction.
///
/// The actor stops once every handle has been dropped, closing and
/// flushing any open session first.
pub fn spawn_tracker(parts: TrackerParts) -> TrackerHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let limiter = UsageLimitEngine::new(parts.limits);
    let escalations = EscalationQueue::spawn(Escalator::new(
        parts.notifier,
        parts.names,
        parts.home_package,
    ));
    let recorder = SessionRecorder::new(parts.store);

    let actor = SessionTrackerActor::new(cmd_rx, limiter, escalations, recorder, event_tx.clone());
    tokio::spawn(actor.run());

    TrackerHandle::new(cmd_tx, event_tx)
}
