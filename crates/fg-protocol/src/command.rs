//! Tracking-host commands and their action tags.
//!
//! A start command reaches the host as an opaque request carrying an
//! optional action tag. No tag means "begin tracking", so a restarted daemon
//! that receives a bare start request resumes tracking.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One of the four commands the tracking host dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostCommand {
    /// Start the poller and event subscription (idempotent).
    BeginTracking,
    /// Finalize any open session and tear tracking down (idempotent).
    StopTracking,
    /// Reload the per-package limit settings.
    ReloadLimits,
    /// Finalize the open session but keep polling.
    ScreenOff,
}

impl HostCommand {
    pub const ACTION_BEGIN_TRACKING: &'static str = "begin_tracking";
    pub const ACTION_STOP_TRACKING: &'static str = "stop_tracking";
    pub const ACTION_RELOAD_LIMITS: &'static str = "reload_limits";
    pub const ACTION_SCREEN_OFF: &'static str = "screen_off";

    /// Resolves an optional action tag; `None` means begin tracking.
    pub fn from_action(action: Option<&str>) -> Result<Self, CommandError> {
        match action.map(str::trim) {
            None | Some("") => Ok(Self::BeginTracking),
            Some(Self::ACTION_BEGIN_TRACKING) => Ok(Self::BeginTracking),
            Some(Self::ACTION_STOP_TRACKING) => Ok(Self::StopTracking),
            Some(Self::ACTION_RELOAD_LIMITS) => Ok(Self::ReloadLimits),
            Some(Self::ACTION_SCREEN_OFF) => Ok(Self::ScreenOff),
            Some(other) => Err(CommandError::UnknownAction(other.to_string())),
        }
    }

    /// The action tag for this command.
    pub fn action(&self) -> &'static str {
        match self {
            Self::BeginTracking => Self::ACTION_BEGIN_TRACKING,
            Self::StopTracking => Self::ACTION_STOP_TRACKING,
            Self::ReloadLimits => Self::ACTION_RELOAD_LIMITS,
            Self::ScreenOff => Self::ACTION_SCREEN_OFF,
        }
    }
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action())
    }
}

/// Errors resolving a start command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown action: {0}")]
    UnknownAction(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_action_means_begin() {
        assert_eq!(HostCommand::from_action(None), Ok(HostCommand::BeginTracking));
        assert_eq!(
            HostCommand::from_action(Some("")),
            Ok(HostCommand::BeginTracking)
        );
    }

    #[test]
    fn test_action_tags_resolve() {
        for command in [
            HostCommand::BeginTracking,
            HostCommand::StopTracking,
            HostCommand::ReloadLimits,
            HostCommand::ScreenOff,
        ] {
            assert_eq!(HostCommand::from_action(Some(command.action())), Ok(command));
        }
    }

    #[test]
    fn test_unknown_action_rejected() {
        assert_eq!(
            HostCommand::from_action(Some("self_destruct")),
            Err(CommandError::UnknownAction("self_destruct".to_string()))
        );
    }
}
