//! fgctl - control client for the focusguard daemon
//!
//! # Usage
//!
//! ```text
//! fgctl begin                 # begin tracking
//! fgctl stop                  # stop tracking (finalizes the open session)
//! fgctl reload                # reload limits.toml
//! fgctl screen-off            # close the open session, keep polling
//! fgctl status                # current session and escalation state
//! fgctl watch                 # stream session events
//! fgctl focus --package P     # push a window-focus notification
//! fgctl send --action TAG     # raw start command
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;

use fg_core::ThresholdState;
use fg_protocol::{ClientMessage, DaemonMessage, HostCommand, RawFocusEvent, SessionStatus};
use fgd::config::DaemonConfig;

/// Control client for the focusguard daemon
#[derive(Parser, Debug)]
#[command(name = "fgctl", version, about)]
struct Args {
    /// Socket path (defaults to the daemon config, then FG_SOCKET)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// Daemon config file used to find the socket
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Begin tracking
    Begin,
    /// Stop tracking
    Stop,
    /// Reload per-app limits
    Reload,
    /// Screen turned off: finalize the open session
    ScreenOff,
    /// Send a raw start command; no action means begin
    Send {
        #[arg(long)]
        action: Option<String>,
    },
    /// Show tracking status
    Status {
        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },
    /// Stream session events until interrupted
    Watch,
    /// Push a window-focus notification
    Focus {
        #[arg(long)]
        package: String,
        /// Report a content change instead of a window change
        #[arg(long)]
        content: bool,
        #[arg(long)]
        class_name: Option<String>,
    },
}

struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(socket: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket)
            .await
            .with_context(|| format!("Failed to connect to {} (is fgd running?)", socket.display()))?;
        let (reader, writer) = stream.into_split();
        let mut client = Self {
            lines: BufReader::new(reader).lines(),
            writer,
        };

        client
            .send(&ClientMessage::connect(Some(format!("fgctl-{}", std::process::id()))))
            .await?;
        match client.recv().await? {
            DaemonMessage::Connected { .. } => Ok(client),
            DaemonMessage::Rejected { reason, .. } => bail!("Daemon rejected connection: {reason}"),
            other => bail!("Unexpected handshake reply: {other:?}"),
        }
    }

    async fn send(&mut self, msg: &ClientMessage) -> Result<()> {
        let mut json = serde_json::to_string(msg)?;
        json.push('\n');
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<DaemonMessage> {
        let line = self
            .lines
            .next_line()
            .await?
            .context("Daemon closed the connection")?;
        serde_json::from_str(&line).context("Malformed daemon message")
    }

    async fn request(&mut self, msg: &ClientMessage) -> Result<DaemonMessage> {
        self.send(msg).await?;
        match self.recv().await? {
            DaemonMessage::Error { message, code } => match code {
                Some(code) => bail!("{message} ({code})"),
                None => bail!("{message}"),
            },
            reply => Ok(reply),
        }
    }

    async fn close(mut self) {
        let _ = self.send(&ClientMessage::disconnect()).await;
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let socket = match args.socket {
        Some(socket) => socket,
        None => DaemonConfig::load(args.config.as_deref())?.socket_path,
    };

    let mut client = Client::connect(&socket).await?;

    match args.command {
        Cmd::Begin => command(&mut client, Some(HostCommand::BeginTracking.action())).await?,
        Cmd::Stop => command(&mut client, Some(HostCommand::StopTracking.action())).await?,
        Cmd::Reload => command(&mut client, Some(HostCommand::ReloadLimits.action())).await?,
        Cmd::ScreenOff => command(&mut client, Some(HostCommand::ScreenOff.action())).await?,
        Cmd::Send { action } => command(&mut client, action.as_deref()).await?,
        Cmd::Status { json } => match client.request(&ClientMessage::status()).await? {
            DaemonMessage::Status { status } if json => {
                println!("{}", serde_json::to_string_pretty(&status)?);
            }
            DaemonMessage::Status { status } => print_status(&status),
            other => bail!("Unexpected reply: {other:?}"),
        },
        Cmd::Watch => return watch(client).await,
        Cmd::Focus {
            package,
            content,
            class_name,
        } => {
            let mut event = if content {
                RawFocusEvent::content_changed(package)
            } else {
                RawFocusEvent::window_changed(package)
            };
            event.class_name = class_name;
            match client.request(&ClientMessage::focus_event(event)).await? {
                DaemonMessage::FocusAccepted { processed: true } => println!("Processed"),
                DaemonMessage::FocusAccepted { processed: false } => println!("Debounced"),
                other => bail!("Unexpected reply: {other:?}"),
            }
        }
    }

    client.close().await;
    Ok(())
}

async fn command(client: &mut Client, action: Option<&str>) -> Result<()> {
    let msg = ClientMessage::command(action.map(str::to_string));
    match client.request(&msg).await? {
        DaemonMessage::Ack { command } => {
            println!("OK: {command}");
            Ok(())
        }
        other => bail!("Unexpected reply: {other:?}"),
    }
}

async fn watch(mut client: Client) -> Result<()> {
    client.send(&ClientMessage::subscribe()).await?;

    loop {
        let msg = tokio::select! {
            msg = client.recv() => msg?,
            _ = tokio::signal::ctrl_c() => break,
        };

        match msg {
            DaemonMessage::Status { status } => print_status(&status),
            DaemonMessage::SessionStarted {
                package,
                started_at,
            } => println!("{started_at}  start    {package}"),
            DaemonMessage::SessionFinalized { record } => println!(
                "{}  end      {} ({}s)",
                record.end,
                record.package,
                record.duration().as_secs()
            ),
            DaemonMessage::Escalated {
                package,
                escalation,
                elapsed_ms,
            } => println!("{escalation}  {package} after {}s", elapsed_ms / 1000),
            DaemonMessage::Error { message, .. } => eprintln!("error: {message}"),
            _ => {}
        }
    }

    client.close().await;
    Ok(())
}

fn print_status(status: &SessionStatus) {
    println!("Tracking: {}", if status.tracking { "yes" } else { "no" });
    match (&status.package, status.started_at) {
        (Some(package), Some(started_at)) => println!("Session:  {package} since {started_at}"),
        _ => println!("Session:  none"),
    }
    if let Some(limit_ms) = status.limit_ms {
        println!("Limit:    {}s", limit_ms / 1000);
        println!("Warning:  {}", threshold_label(status.warning));
        println!("Blocked:  {}", threshold_label(status.intervention));
    }
}

fn threshold_label(state: ThresholdState) -> &'static str {
    if state.is_triggered() {
        "fired"
    } else {
        "pending"
    }
}
