//! Control socket for `fgctl` and window-manager hooks.
//!
//! Each accepted connection gets its own [`ConnectionHandler`] task, which
//! routes start commands to the host, focus notifications to the
//! [`WindowFocusSource`] and status queries to the tracker. Clients that
//! subscribe receive every [`TrackerEvent`] as a JSON line.
//!
//! ```text
//!   fgctl / hook ──▶ ConnectionHandler ──▶ HostHandle | WindowFocusSource | TrackerHandle
//!                            ▲
//!   TrackerHandle ──(broadcast)── forward_events ──▶ subscribed writers
//! ```
//!
//! Nothing in here panics; accept and write failures are logged and the
//! server keeps going.

mod connection;

pub use connection::{ConnectionError, ConnectionHandler, SubscriberWriter, SubscribersMap};

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fg_protocol::DaemonMessage;
use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::focus::WindowFocusSource;
use crate::host::HostHandle;
use crate::tracker::{TrackerEvent, TrackerHandle};

/// Upper bound on `fgctl watch` clients.
pub const MAX_SUBSCRIBERS: usize = 10;

/// Components a connection talks to.
#[derive(Clone)]
pub struct ServerContext {
    pub host: HostHandle,
    pub tracker: TrackerHandle,
    pub focus: Arc<WindowFocusSource>,
}

/// Accept loop for the control socket.
pub struct DaemonServer {
    socket_path: PathBuf,
    context: ServerContext,
    cancel_token: CancellationToken,
    next_client: AtomicU64,
    subscribers: SubscribersMap,
}

impl DaemonServer {
    pub fn new(
        socket_path: impl Into<PathBuf>,
        context: ServerContext,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            context,
            cancel_token,
            next_client: AtomicU64::new(0),
            subscribers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Serves until the cancellation token fires, then removes the socket.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::SocketSetup` if the socket cannot be bound.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = bind(&self.socket_path)?;
        info!(socket = %self.socket_path.display(), "Control server listening");

        tokio::spawn(forward_events(
            self.context.tracker.subscribe(),
            Arc::clone(&self.subscribers),
            self.cancel_token.clone(),
        ));

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => self.serve(stream),
                    Err(e) => error!(error = %e, "Accept failed"),
                },
            }
        }

        self.subscribers.write().await.clear();
        if let Err(e) = remove_stale(&self.socket_path) {
            warn!(socket = %self.socket_path.display(), error = %e, "Could not remove socket");
        }
        info!("Control server stopped");
        Ok(())
    }

    fn serve(&self, stream: UnixStream) {
        let number = self.next_client.fetch_add(1, Ordering::Relaxed);
        let (reader, writer) = stream.into_split();
        let subscribers = Arc::clone(&self.subscribers);
        let handler = ConnectionHandler::new(
            reader,
            writer,
            self.context.clone(),
            Arc::clone(&subscribers),
            number,
        );

        tokio::spawn(async move {
            // A subscribed client leaves its writer behind; drop it here.
            if let Some(id) = handler.run().await {
                if subscribers.write().await.remove(&id).is_some() {
                    debug!(client_id = %id, "Subscriber disconnected");
                }
            }
        });
    }
}

/// Binds `path`, replacing a socket left by an earlier daemon.
fn bind(path: &Path) -> Result<UnixListener, ServerError> {
    let setup = |e: io::Error| ServerError::SocketSetup {
        path: path.to_path_buf(),
        error: e.to_string(),
    };

    remove_stale(path).map_err(setup)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(setup)?;
    }
    UnixListener::bind(path).map_err(setup)
}

fn remove_stale(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Relays tracker events to subscribers until cancelled or the tracker
/// goes away.
async fn forward_events(
    mut events: broadcast::Receiver<TrackerEvent>,
    subscribers: SubscribersMap,
    cancel_token: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel_token.cancelled() => break,
            received = events.recv() => received,
        };
        match event {
            Ok(event) => send_to_subscribers(&subscribers, &event_message(&event)).await,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "Subscribers missed tracker events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!("Event forwarding stopped");
}

/// Wire form of a tracker event.
pub fn event_message(event: &TrackerEvent) -> DaemonMessage {
    match event {
        TrackerEvent::SessionStarted {
            package,
            started_at,
        } => DaemonMessage::SessionStarted {
            package: package.clone(),
            started_at: *started_at,
        },
        TrackerEvent::SessionFinalized { record, .. } => DaemonMessage::SessionFinalized {
            record: record.clone(),
        },
        TrackerEvent::Escalated {
            package,
            escalation,
            elapsed,
        } => DaemonMessage::Escalated {
            package: package.clone(),
            escalation: *escalation,
            elapsed_ms: elapsed.as_millis() as u64,
        },
    }
}

/// Writes `message` to every subscriber; writers that fail are dropped.
async fn send_to_subscribers(subscribers: &SubscribersMap, message: &DaemonMessage) {
    let mut line = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            error!(error = %e, "Could not encode tracker event");
            return;
        }
    };
    line.push('\n');

    // Snapshot the writers so a slow client never holds the map lock.
    let targets: Vec<(String, SubscriberWriter)> = subscribers
        .read()
        .await
        .iter()
        .map(|(id, writer)| (id.clone(), Arc::clone(writer)))
        .collect();

    let mut dead = Vec::new();
    for (id, writer) in targets {
        let mut writer = writer.lock().await;
        let sent = match writer.write_all(line.as_bytes()).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            debug!(client_id = %id, error = %e, "Dropping subscriber after write error");
            dead.push(id);
        }
    }

    if !dead.is_empty() {
        let mut map = subscribers.write().await;
        for id in dead {
            map.remove(&id);
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to setup socket at {path}: {error}")]
    SocketSetup { path: PathBuf, error: String },
}
