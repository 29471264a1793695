//! Connection handler for individual client connections.
//!
//! Each client connection gets its own `ConnectionHandler` that:
//! - Performs protocol version negotiation
//! - Parses incoming messages
//! - Routes start commands to the host and focus notifications to the
//!   focus source
//! - Registers subscribers for session events
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Connection errors are logged and result in graceful disconnect

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fg_protocol::{ClientMessage, DaemonMessage, MessageType, ProtocolVersion, RawFocusEvent};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::focus::Disposition;
use crate::host::HostError;

use super::{ServerContext, MAX_SUBSCRIBERS};

/// Type alias for subscriber writer handle
pub type SubscriberWriter = Arc<Mutex<BufWriter<OwnedWriteHalf>>>;

/// Subscribers keyed by client id
pub type SubscribersMap = Arc<RwLock<HashMap<String, SubscriberWriter>>>;

/// Maximum message size (1 MB)
const MAX_MESSAGE_SIZE: usize = 1_048_576;

/// Read timeout for idle connections (5 minutes)
const READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

type ClientId = String;

/// Connection handler for a single client.
pub struct ConnectionHandler {
    reader: BufReader<OwnedReadHalf>,

    /// Shared with the event broadcaster once subscribed
    writer: SubscriberWriter,

    context: ServerContext,

    subscribers: SubscribersMap,

    /// Assigned after handshake
    client_id: Option<ClientId>,

    connection_number: u64,
}

impl ConnectionHandler {
    pub fn new(
        reader: OwnedReadHalf,
        writer: OwnedWriteHalf,
        context: ServerContext,
        subscribers: SubscribersMap,
        connection_number: u64,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: Arc::new(Mutex::new(BufWriter::new(writer))),
            context,
            subscribers,
            client_id: None,
            connection_number,
        }
    }

    /// Performs the handshake, then processes messages until the client
    /// goes away. Returns the client id, if one was assigned.
    pub async fn run(mut self) -> Option<ClientId> {
        debug!(connection = self.connection_number, "New client connected");

        if let Err(e) = self.handle_handshake().await {
            warn!(connection = self.connection_number, error = %e, "Handshake failed");
            return None;
        }
        debug!(client_id = ?self.client_id, "Client handshake completed");

        let client_id = self.client_id.clone();

        if let Err(e) = self.process_messages().await {
            debug!(client_id = ?self.client_id, error = %e, "Connection closed");
        }

        debug!(client_id = ?self.client_id, "Client disconnected");
        client_id
    }

    async fn handle_handshake(&mut self) -> Result<(), ConnectionError> {
        let msg = timeout(READ_TIMEOUT, self.read_message())
            .await
            .map_err(|_| ConnectionError::Timeout)??;

        let client_version = msg.protocol_version;
        if !client_version.is_compatible_with(&ProtocolVersion::CURRENT) {
            warn!(
                client_version = %client_version,
                server_version = %ProtocolVersion::CURRENT,
                "Protocol version mismatch"
            );

            self.send_message(DaemonMessage::rejected(&format!(
                "Protocol version {} not compatible with server version {}",
                client_version,
                ProtocolVersion::CURRENT
            )))
            .await?;

            return Err(ConnectionError::VersionMismatch {
                client: client_version,
                server: ProtocolVersion::CURRENT,
            });
        }

        match msg.message {
            MessageType::Connect { client_id } => {
                let assigned_id =
                    client_id.unwrap_or_else(|| format!("client-{}", self.connection_number));
                self.client_id = Some(assigned_id.clone());
                self.send_message(DaemonMessage::connected(assigned_id)).await
            }
            other => {
                self.send_message(DaemonMessage::error("Expected Connect message for handshake"))
                    .await?;
                Err(ConnectionError::UnexpectedMessage(format!("{other:?}")))
            }
        }
    }

    async fn process_messages(&mut self) -> Result<(), ConnectionError> {
        loop {
            let msg = match timeout(READ_TIMEOUT, self.read_message()).await {
                Ok(Ok(msg)) => msg,
                Ok(Err(ConnectionError::Eof)) => {
                    debug!(client_id = ?self.client_id, "Client sent EOF");
                    return Ok(());
                }
                Ok(Err(e @ ConnectionError::ParseError(_))) => {
                    // Bad line: report and keep the connection
                    let _ = self
                        .send_message(DaemonMessage::error_with_code(&e.to_string(), "parse_error"))
                        .await;
                    continue;
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    debug!(client_id = ?self.client_id, "Connection timed out");
                    return Err(ConnectionError::Timeout);
                }
            };

            match self.handle_message(msg).await {
                Ok(()) => {}
                Err(ConnectionError::Eof) => return Ok(()),
                Err(e) => {
                    warn!(client_id = ?self.client_id, error = %e, "Error handling message");
                    let _ = self.send_message(DaemonMessage::error(&e.to_string())).await;
                }
            }
        }
    }

    async fn handle_message(&mut self, msg: ClientMessage) -> Result<(), ConnectionError> {
        match msg.message {
            MessageType::Connect { .. } => {
                self.send_message(DaemonMessage::error("Already connected")).await?;
            }

            MessageType::Command { action } => {
                self.handle_command(action.as_deref()).await?;
            }

            MessageType::FocusEvent { event } => {
                self.handle_focus_event(event).await?;
            }

            MessageType::Status => {
                let status = self.context.host.status().await;
                self.send_message(DaemonMessage::status(status)).await?;
            }

            MessageType::Subscribe => {
                self.handle_subscribe().await?;
            }

            MessageType::Unsubscribe => {
                if let Some(ref client_id) = self.client_id {
                    self.subscribers.write().await.remove(client_id);
                }
                debug!(client_id = ?self.client_id, "Client unsubscribed");
            }

            MessageType::Ping { seq } => {
                self.send_message(DaemonMessage::pong(seq)).await?;
            }

            MessageType::Disconnect => {
                debug!(client_id = ?self.client_id, "Client requested disconnect");
                return Err(ConnectionError::Eof);
            }
        }

        Ok(())
    }

    async fn handle_command(&mut self, action: Option<&str>) -> Result<(), ConnectionError> {
        info!(client_id = ?self.client_id, action = ?action, "Start command received");

        match self.context.host.handle_start_command(action).await {
            Ok(command) => self.send_message(DaemonMessage::ack(command)).await,
            Err(HostError::Command(e)) => {
                self.send_message(DaemonMessage::error_with_code(&e.to_string(), "unknown_action"))
                    .await
            }
            Err(e) => Err(ConnectionError::Host(e.to_string())),
        }
    }

    async fn handle_focus_event(&mut self, raw: RawFocusEvent) -> Result<(), ConnectionError> {
        let event = raw.into_event();
        let disposition = self
            .context
            .focus
            .on_notification(event)
            .await
            .map_err(|e| ConnectionError::Host(e.to_string()))?;

        self.send_message(DaemonMessage::FocusAccepted {
            processed: disposition != Disposition::Dropped,
        })
        .await
    }

    async fn handle_subscribe(&mut self) -> Result<(), ConnectionError> {
        let Some(client_id) = self.client_id.clone() else {
            return self
                .send_message(DaemonMessage::error("Must connect before subscribing"))
                .await;
        };

        {
            let mut subs = self.subscribers.write().await;
            if subs.len() >= MAX_SUBSCRIBERS && !subs.contains_key(&client_id) {
                drop(subs);
                return self
                    .send_message(DaemonMessage::error(&format!(
                        "Too many subscribers (max: {MAX_SUBSCRIBERS})"
                    )))
                    .await;
            }
            subs.insert(client_id.clone(), Arc::clone(&self.writer));
        }

        debug!(client_id = %client_id, "Client subscribed to session events");

        // Current state first, then live events.
        let status = self.context.host.status().await;
        self.send_message(DaemonMessage::status(status)).await
    }

    async fn read_message(&mut self) -> Result<ClientMessage, ConnectionError> {
        let mut line = String::new();

        // Cap the read so an endless line cannot exhaust memory.
        let limit = (MAX_MESSAGE_SIZE + 1) as u64;
        let bytes_read = (&mut self.reader)
            .take(limit)
            .read_line(&mut line)
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        if bytes_read == 0 {
            return Err(ConnectionError::Eof);
        }

        if line.len() > MAX_MESSAGE_SIZE {
            return Err(ConnectionError::MessageTooLarge {
                size: line.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let msg: ClientMessage =
            serde_json::from_str(&line).map_err(|e| ConnectionError::ParseError(e.to_string()))?;

        debug!(
            client_id = ?self.client_id,
            message_type = ?std::mem::discriminant(&msg.message),
            "Received message"
        );

        Ok(msg)
    }

    async fn send_message(&self, msg: DaemonMessage) -> Result<(), ConnectionError> {
        let json =
            serde_json::to_string(&msg).map_err(|e| ConnectionError::ParseError(e.to_string()))?;

        let mut writer = self.writer.lock().await;

        match timeout(WRITE_TIMEOUT, async {
            writer.write_all(json.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            Ok::<(), std::io::Error>(())
        })
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
            Err(_) => Err(ConnectionError::WriteTimeout),
        }
    }

    /// Returns the client ID (if connected).
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Protocol version mismatch: client {client}, server {server}")]
    VersionMismatch {
        client: ProtocolVersion,
        server: ProtocolVersion,
    },

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Eof,

    #[error("Read timeout")]
    Timeout,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Host error: {0}")]
    Host(String),
}
