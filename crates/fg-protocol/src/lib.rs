//! focusguard protocol - messages on the daemon control socket
//!
//! Newline-delimited JSON between `fgctl` (or a window-manager hook) and
//! `fgd`: tracking commands, pushed window-focus notifications, status
//! queries and the session event stream.

pub mod command;
pub mod message;
pub mod parse;
pub mod version;

pub use command::{CommandError, HostCommand};
pub use message::{ClientMessage, DaemonMessage, MessageType, SessionStatus};
pub use parse::RawFocusEvent;
pub use version::{ProtocolVersion, VersionError};
