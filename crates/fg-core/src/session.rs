//! Session entities: the open foreground session and its durable record.

use crate::{PackageId, Timestamp};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// The single "what is in the foreground right now" record.
///
/// Package and start time are set together at construction and can only
/// be consumed together through [`ActiveSession::close`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSession {
    package: PackageId,
    started_at: Timestamp,
}

impl ActiveSession {
    /// Opens a session for `package` starting at `started_at`.
    pub fn open(package: PackageId, started_at: Timestamp) -> Self {
        Self {
            package,
            started_at,
        }
    }

    /// Package currently in the foreground.
    pub fn package(&self) -> &PackageId {
        &self.package
    }

    /// When this session began.
    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    /// Returns true if `package` is the one this session tracks.
    pub fn is_for(&self, package: &PackageId) -> bool {
        &self.package == package
    }

    /// Closes the session at `ended_at`, producing its durable record.
    pub fn close(self, ended_at: Timestamp) -> SessionRecord {
        SessionRecord::new(self.package, self.started_at, ended_at)
    }
}

/// A finished session, as written to the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub package: PackageId,
    pub start: Timestamp,
    pub end: Timestamp,
}

impl SessionRecord {
    /// Creates a record, clamping `end` so that `end >= start`.
    pub fn new(package: PackageId, start: Timestamp, end: Timestamp) -> Self {
        let end = if end < start {
            debug!(
                package = %package,
                start = start.as_millis(),
                end = end.as_millis(),
                "Session end precedes start, clamping to a zero-length session"
            );
            start
        } else {
            end
        };

        Self {
            package,
            start,
            end,
        }
    }

    /// Length of the session.
    pub fn duration(&self) -> Duration {
        self.end.saturating_since(self.start)
    }
}
