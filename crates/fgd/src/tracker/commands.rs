//! Tracker actor commands, errors, and events.
//!
//! This module defines the message types for communicating with the
//! `SessionTrackerActor`:
//! - `TrackerCommand`: Commands sent to the actor
//! - `TrackerError`: Errors that can occur talking to the actor
//! - `TrackerEvent`: Events published by the actor for subscribers

use std::fmt;
use std::time::Duration;

use fg_core::{ActiveSession, Escalation, ForegroundEvent, PackageId, SessionRecord, Timestamp};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::limiter::LimiterSessionState;

// ============================================================================
// Tracker Commands
// ============================================================================

/// Commands sent to the tracker actor.
///
/// Both event sources and the tracking host publish into the same channel,
/// so commands are applied strictly in arrival order.
#[derive(Debug)]
pub enum TrackerCommand {
    /// An observed foreground event (fire-and-forget).
    ///
    /// App-resumed events drive the session state machine; a `None`
    /// package closes the open session.
    Observe { event: ForegroundEvent },

    /// A content-change notification.
    ///
    /// Responds `true` if the reporting package is the tracked one, in
    /// which case usage limits were re-evaluated at the event's timestamp.
    ContentChanged {
        event: ForegroundEvent,
        respond_to: oneshot::Sender<bool>,
    },

    /// Re-evaluate usage limits for the open session (fire-and-forget).
    CheckLimits { now: Timestamp },

    /// Close the open session, if any, at `at`.
    ///
    /// The session record is written in the background.
    Finalize {
        at: Timestamp,
        reason: FinalizeReason,
        respond_to: oneshot::Sender<Option<SessionRecord>>,
    },

    /// Close the open session and wait until its record, and every
    /// earlier in-flight record, has been written.
    FinalizeForShutdown {
        at: Timestamp,
        respond_to: oneshot::Sender<Option<SessionRecord>>,
    },

    /// Get the current session and escalation state.
    GetStatus {
        respond_to: oneshot::Sender<TrackerStatus>,
    },
}

/// Why a session was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeReason {
    /// A different package came to the foreground.
    Replaced,
    /// An event reported nothing in the foreground.
    NothingInForeground,
    /// The screen turned off.
    ScreenOff,
    /// Tracking was stopped.
    StopTracking,
    /// The daemon is being torn down.
    Shutdown,
}

impl fmt::Display for FinalizeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replaced => write!(f, "another app came to the foreground"),
            Self::NothingInForeground => write!(f, "nothing in the foreground"),
            Self::ScreenOff => write!(f, "screen turned off"),
            Self::StopTracking => write!(f, "tracking stopped"),
            Self::Shutdown => write!(f, "daemon shutting down"),
        }
    }
}

/// Snapshot of the tracker state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerStatus {
    pub session: Option<ActiveSession>,
    pub limiter: Option<LimiterSessionState>,
}

// ============================================================================
// Tracker Errors
// ============================================================================

/// Errors that can occur talking to the tracker.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrackerError {
    /// The actor has shut down.
    #[error("tracker channel closed")]
    ChannelClosed,
}

// ============================================================================
// Tracker Events
// ============================================================================

/// Events published by the tracker to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    /// A foreground session was opened.
    SessionStarted {
        package: PackageId,
        started_at: Timestamp,
    },

    /// A foreground session was closed.
    SessionFinalized {
        record: SessionRecord,
        reason: FinalizeReason,
    },

    /// An escalation step fired.
    Escalated {
        package: PackageId,
        escalation: Escalation,
        elapsed: Duration,
    },
}
