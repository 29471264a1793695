//! Protocol message types for daemon communication.

use crate::command::HostCommand;
use crate::parse::RawFocusEvent;
use crate::version::ProtocolVersion;
use fg_core::{Escalation, PackageId, SessionRecord, ThresholdState, Timestamp};
use serde::{Deserialize, Serialize};

/// Message types that can be sent by clients to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageType {
    /// Client handshake/connection request
    Connect {
        #[serde(skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
    },

    /// Start command for the tracking host; no action means begin tracking
    Command {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        action: Option<String>,
    },

    /// Window-focus notification from a desktop hook
    FocusEvent { event: RawFocusEvent },

    /// Request the current tracking status
    Status,

    /// Subscribe to session events
    Subscribe,

    /// Unsubscribe from session events
    Unsubscribe,

    /// Ping to check connection
    Ping { seq: u64 },

    /// Client disconnecting gracefully
    Disconnect,
}

/// Messages sent from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    pub protocol_version: ProtocolVersion,

    #[serde(flatten)]
    pub message: MessageType,
}

impl ClientMessage {
    /// Creates a new client message with current protocol version.
    pub fn new(message: MessageType) -> Self {
        Self {
            protocol_version: ProtocolVersion::CURRENT,
            message,
        }
    }

    pub fn connect(client_id: Option<String>) -> Self {
        Self::new(MessageType::Connect { client_id })
    }

    /// A start command carrying `action` verbatim.
    pub fn command(action: Option<String>) -> Self {
        Self::new(MessageType::Command { action })
    }

    /// A start command for a known host command.
    pub fn host_command(command: HostCommand) -> Self {
        Self::command(Some(command.action().to_string()))
    }

    pub fn focus_event(event: RawFocusEvent) -> Self {
        Self::new(MessageType::FocusEvent { event })
    }

    pub fn status() -> Self {
        Self::new(MessageType::Status)
    }

    pub fn subscribe() -> Self {
        Self::new(MessageType::Subscribe)
    }

    pub fn ping(seq: u64) -> Self {
        Self::new(MessageType::Ping { seq })
    }

    pub fn disconnect() -> Self {
        Self::new(MessageType::Disconnect)
    }
}

/// Snapshot of the tracker, reported by `status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    /// Whether the host is actively tracking
    pub tracking: bool,
    /// Package of the open session, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<PackageId>,
    /// Start of the open session, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    /// Configured limit when the open session is limited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_ms: Option<u64>,
    #[serde(default)]
    pub warning: ThresholdState,
    #[serde(default)]
    pub intervention: ThresholdState,
}

/// Messages sent from daemon to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonMessage {
    /// Connection accepted
    Connected {
        protocol_version: ProtocolVersion,
        client_id: String,
    },

    /// Connection rejected (version mismatch, etc.)
    Rejected {
        reason: String,
        protocol_version: ProtocolVersion,
    },

    /// Command accepted and dispatched
    Ack { command: HostCommand },

    /// Focus notification accepted (`processed` is false when debounced)
    FocusAccepted { processed: bool },

    /// Status response
    Status { status: SessionStatus },

    /// A foreground session was opened
    SessionStarted {
        package: PackageId,
        started_at: Timestamp,
    },

    /// A foreground session was closed
    SessionFinalized { record: SessionRecord },

    /// An escalation fired for a limited package
    Escalated {
        package: PackageId,
        escalation: Escalation,
        elapsed_ms: u64,
    },

    /// Pong response to ping
    Pong { seq: u64 },

    /// Error response
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl DaemonMessage {
    pub fn connected(client_id: String) -> Self {
        Self::Connected {
            protocol_version: ProtocolVersion::CURRENT,
            client_id,
        }
    }

    pub fn rejected(reason: &str) -> Self {
        Self::Rejected {
            reason: reason.to_string(),
            protocol_version: ProtocolVersion::CURRENT,
        }
    }

    pub fn ack(command: HostCommand) -> Self {
        Self::Ack { command }
    }

    pub fn status(status: SessionStatus) -> Self {
        Self::Status { status }
    }

    pub fn pong(seq: u64) -> Self {
        Self::Pong { seq }
    }

    pub fn error(message: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: None,
        }
    }

    pub fn error_with_code(message: &str, code: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: Some(code.to_string()),
        }
    }
}
