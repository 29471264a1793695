//! Usage log backed by a command that names the focused app.
//!
//! Desktop sessions keep no queryable history of focus changes, so each
//! query runs the command once and reports what is in front at the end of the
//! window. The poller's latest-event-wins policy makes that equivalent.
//!
//! A command that exits non-zero or prints nothing means no window has focus
//! (locked screen, bare desktop) and is reported as nothing in the
//! foreground.

use std::process::Stdio;

use async_trait::async_trait;
use fg_core::{ForegroundEvent, Timestamp};
use tokio::process::Command;
use tracing::trace;

use crate::ports::{PortError, PortResult, UsageLog};

/// Runs `program args..` and reads the foreground app from its stdout.
#[derive(Debug, Clone)]
pub struct CommandUsageLog {
    program: String,
    args: Vec<String>,
}

impl CommandUsageLog {
    /// Builds a log from a command line; the first element is the program.
    ///
    /// # Errors
    ///
    /// Returns `PortError::Unavailable` for an empty command line.
    pub fn new(command: &[String]) -> PortResult<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| PortError::Unavailable("empty foreground command".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

#[async_trait]
impl UsageLog for CommandUsageLog {
    async fn query(&self, start: Timestamp, end: Timestamp) -> PortResult<Vec<ForegroundEvent>> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PortError::Unavailable(format!("{}: {e}", self.program)))?;

        let at = last_instant_in(start, end);

        // Most window tools also exit non-zero when nothing has focus.
        let event = if output.status.success() {
            parse_foreground_output(&String::from_utf8_lossy(&output.stdout), at)
        } else {
            None
        };

        Ok(vec![event.unwrap_or_else(|| {
            trace!(program = %self.program, status = %output.status, "No focused window reported");
            ForegroundEvent::nothing_in_foreground(at)
        })])
    }
}

/// The last millisecond inside `[start, end)`, or `start` for an empty window.
fn last_instant_in(start: Timestamp, end: Timestamp) -> Timestamp {
    Timestamp::from_millis(end.as_millis().saturating_sub(1).max(start.as_millis()))
}

/// Reads the first non-empty line of command output as a resumed package.
pub fn parse_foreground_output(stdout: &str, at: Timestamp) -> Option<ForegroundEvent> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|package| ForegroundEvent::resumed(package, at))
}
