//! Integration tests for the Unix socket control server.
//!
//! These run the whole daemon stack over a real socket: handshake, start
//! commands, focus notifications, status and event subscriptions.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

mod common;

use std::path::PathBuf;
use std::time::Duration;

use common::{fast_config, Fakes};
use fg_core::{PackageId, Timestamp};
use fg_protocol::{
    ClientMessage, DaemonMessage, HostCommand, MessageType, ProtocolVersion, RawFocusEvent,
};
use fgd::daemon::Daemon;
use fgd::server::DaemonServer;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

const FEED: &str = "com.example.feed";
const MAPS: &str = "com.example.maps";

// ============================================================================
// Constants
// ============================================================================

/// Maximum time to wait for server socket to appear
const SOCKET_WAIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Interval between socket existence checks
const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Grace period for server shutdown
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_millis(100);

/// Maximum wait for a single reply
const RECV_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Test Helpers
// ============================================================================

/// Test server context that manages the daemon and server lifecycle.
struct TestServer {
    socket_path: PathBuf,
    cancel_token: CancellationToken,
    daemon: Daemon,
    fakes: Fakes,
    _temp_dir: TempDir,
}

impl TestServer {
    async fn spawn() -> Self {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let socket_path = temp_dir.path().join("fg.sock");

        let fakes = Fakes::new(Vec::new());
        let daemon = Daemon::spawn(&fast_config(), fakes.collaborators());
        let cancel_token = CancellationToken::new();

        let server = DaemonServer::new(
            socket_path.clone(),
            daemon.server_context(),
            cancel_token.clone(),
        );
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let start = tokio::time::Instant::now();
        while start.elapsed() < SOCKET_WAIT_TIMEOUT {
            if socket_path.exists() {
                break;
            }
            sleep(SOCKET_POLL_INTERVAL).await;
        }
        assert!(
            socket_path.exists(),
            "Server socket did not appear within {SOCKET_WAIT_TIMEOUT:?}"
        );

        Self {
            socket_path,
            cancel_token,
            daemon,
            fakes,
            _temp_dir: temp_dir,
        }
    }

    async fn connect(&self) -> TestClient {
        let mut client = TestClient::connect(&self.socket_path).await;
        client.handshake().await;
        client
    }

    async fn shutdown(self) {
        self.cancel_token.cancel();
        sleep(SHUTDOWN_GRACE_PERIOD).await;
    }
}

/// Line-oriented JSON client.
struct TestClient {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: tokio::net::unix::OwnedWriteHalf,
}

impl TestClient {
    async fn connect(path: &PathBuf) -> Self {
        let stream = UnixStream::connect(path).await.expect("connect to server");
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn send(&mut self, msg: &ClientMessage) {
        let mut json = serde_json::to_string(msg).unwrap();
        json.push('\n');
        self.writer.write_all(json.as_bytes()).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn recv(&mut self) -> DaemonMessage {
        let mut line = String::new();
        timeout(RECV_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("reply within timeout")
            .unwrap();
        serde_json::from_str(&line).unwrap()
    }

    async fn request(&mut self, msg: &ClientMessage) -> DaemonMessage {
        self.send(msg).await;
        self.recv().await
    }

    async fn handshake(&mut self) {
        match self.request(&ClientMessage::connect(None)).await {
            DaemonMessage::Connected { .. } => {}
            other => panic!("Expected Connected, got {other:?}"),
        }
    }
}

fn focus(package: &str, at: i64) -> ClientMessage {
    let mut event = RawFocusEvent::window_changed(package);
    event.timestamp_ms = Some(at);
    ClientMessage::focus_event(event)
}

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn test_handshake_assigns_client_id() {
    let server = TestServer::spawn().await;
    let mut client = TestClient::connect(&server.socket_path).await;

    let reply = client
        .request(&ClientMessage::connect(Some("hook".to_string())))
        .await;
    match reply {
        DaemonMessage::Connected {
            client_id,
            protocol_version,
        } => {
            assert_eq!(client_id, "hook");
            assert_eq!(protocol_version, ProtocolVersion::CURRENT);
        }
        other => panic!("Expected Connected, got {other:?}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_incompatible_version_is_rejected() {
    let server = TestServer::spawn().await;
    let mut client = TestClient::connect(&server.socket_path).await;

    let msg = ClientMessage {
        protocol_version: ProtocolVersion::new(99, 0),
        message: MessageType::Connect { client_id: None },
    };
    assert!(matches!(
        client.request(&msg).await,
        DaemonMessage::Rejected { .. }
    ));

    server.shutdown().await;
}

#[tokio::test]
async fn test_ping_pong() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    assert!(matches!(
        client.request(&ClientMessage::ping(7)).await,
        DaemonMessage::Pong { seq: 7 }
    ));

    server.shutdown().await;
}

#[tokio::test]
async fn test_malformed_line_keeps_connection() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client.send_raw("{not json").await;
    match client.recv().await {
        DaemonMessage::Error { code, .. } => assert_eq!(code.as_deref(), Some("parse_error")),
        other => panic!("Expected Error, got {other:?}"),
    }

    assert!(matches!(
        client.request(&ClientMessage::ping(1)).await,
        DaemonMessage::Pong { seq: 1 }
    ));

    server.shutdown().await;
}

// ============================================================================
// Start Commands
// ============================================================================

#[tokio::test]
async fn test_command_without_action_begins_tracking() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    match client.request(&ClientMessage::command(None)).await {
        DaemonMessage::Ack { command } => assert_eq!(command, HostCommand::BeginTracking),
        other => panic!("Expected Ack, got {other:?}"),
    }
    assert!(server.fakes.keep_alive.is_held());

    match client.request(&ClientMessage::status()).await {
        DaemonMessage::Status { status } => assert!(status.tracking),
        other => panic!("Expected Status, got {other:?}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_unknown_action_reports_error() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    let reply = client
        .request(&ClientMessage::command(Some("self_destruct".to_string())))
        .await;
    match reply {
        DaemonMessage::Error { code, .. } => assert_eq!(code.as_deref(), Some("unknown_action")),
        other => panic!("Expected Error, got {other:?}"),
    }
    assert!(!server.daemon.poller.is_polling());

    server.shutdown().await;
}

// ============================================================================
// Focus Notifications
// ============================================================================

#[tokio::test]
async fn test_focus_event_opens_session_then_debounces() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    assert!(matches!(
        client.request(&focus(MAPS, 1_000)).await,
        DaemonMessage::FocusAccepted { processed: true }
    ));

    // Same arrival instant: inside the debounce window.
    assert!(matches!(
        client.request(&focus(FEED, 1_100)).await,
        DaemonMessage::FocusAccepted { processed: false }
    ));

    match client.request(&ClientMessage::status()).await {
        DaemonMessage::Status { status } => {
            assert_eq!(status.package, Some(PackageId::new(MAPS)));
            assert_eq!(status.started_at, Some(Timestamp::from_millis(1_000)));
        }
        other => panic!("Expected Status, got {other:?}"),
    }

    server.fakes.clock.advance(1_000);
    assert!(matches!(
        client.request(&focus(FEED, 2_500)).await,
        DaemonMessage::FocusAccepted { processed: true }
    ));

    match client.request(&ClientMessage::status()).await {
        DaemonMessage::Status { status } => {
            assert_eq!(status.package, Some(PackageId::new(FEED)));
        }
        other => panic!("Expected Status, got {other:?}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_content_change_reaches_inspector() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client.request(&focus(MAPS, 1_000)).await;
    server.fakes.clock.advance(1_000);

    let mut event = RawFocusEvent::content_changed(MAPS);
    event.timestamp_ms = Some(2_000);
    assert!(matches!(
        client.request(&ClientMessage::focus_event(event)).await,
        DaemonMessage::FocusAccepted { processed: true }
    ));
    assert_eq!(
        server
            .fakes
            .inspector
            .calls
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );

    server.shutdown().await;
}

// ============================================================================
// Subscriptions
// ============================================================================

#[tokio::test]
async fn test_subscriber_receives_session_events() {
    let server = TestServer::spawn().await;
    let mut watcher = server.connect().await;
    let mut hook = server.connect().await;

    watcher.send(&ClientMessage::subscribe()).await;
    assert!(matches!(watcher.recv().await, DaemonMessage::Status { .. }));

    hook.request(&focus(MAPS, 1_000)).await;
    match watcher.recv().await {
        DaemonMessage::SessionStarted {
            package,
            started_at,
        } => {
            assert_eq!(package.as_str(), MAPS);
            assert_eq!(started_at, Timestamp::from_millis(1_000));
        }
        other => panic!("Expected SessionStarted, got {other:?}"),
    }

    server.fakes.clock.advance(1_000);
    hook.request(&focus(FEED, 4_000)).await;

    match watcher.recv().await {
        DaemonMessage::SessionFinalized { record } => {
            assert_eq!(record.package.as_str(), MAPS);
            assert_eq!(record.duration(), Duration::from_millis(3_000));
        }
        other => panic!("Expected SessionFinalized, got {other:?}"),
    }
    assert!(matches!(
        watcher.recv().await,
        DaemonMessage::SessionStarted { .. }
    ));

    server.shutdown().await;
}
