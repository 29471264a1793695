//! focusguard daemon - foreground session tracker and usage-limit engine
//!
//! This binary runs as a background daemon: it polls the foreground app,
//! accepts window-focus notifications and start commands on a Unix socket,
//! records sessions and escalates when a limited app is used for too long.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon and begin tracking (foreground)
//! fgd start
//!
//! # Start the daemon (background/daemonized)
//! fgd start -d
//!
//! # Start with an explicit start command
//! fgd start --action reload_limits
//!
//! # Stop the daemon
//! fgd stop
//!
//! # Check daemon status
//! fgd status
//!
//! # Custom socket path
//! FG_SOCKET=/run/fg.sock fgd start
//!
//! # Enable debug logging
//! RUST_LOG=fgd=debug fgd start
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: graceful shutdown; the open session is written before
//!   the process exits

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use fgd::adapters::StatusFileKeepAlive;
use fgd::config::DaemonConfig;
use fgd::daemon::{Collaborators, Daemon};
use fgd::host::startup_commands;
use fgd::server::DaemonServer;

/// focusguard daemon - foreground session tracking with usage limits
#[derive(Parser, Debug)]
#[command(name = "fgd", version, about)]
struct Args {
    /// Config file (defaults to ~/.config/focusguard/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        /// Start command tag (begin_tracking, stop_tracking, reload_limits,
        /// screen_off); absent means begin tracking
        #[arg(long)]
        action: Option<String>,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
}

/// Reads the PID from the PID file, if it exists.
fn read_pid(path: &Path) -> Option<u32> {
    let mut file = File::open(path).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

/// Writes the current PID to the PID file.
fn write_pid(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

fn remove_pid_file(path: &Path) {
    let _ = fs::remove_file(path);
}

/// Checks if a process with the given PID is running.
fn is_process_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{}", pid)).exists()
}

/// Checks if the daemon is already running.
fn is_daemon_running(pid_file: &Path) -> Option<u32> {
    if let Some(pid) = read_pid(pid_file) {
        if is_process_running(pid) {
            return Some(pid);
        }
        // Stale PID file
        remove_pid_file(pid_file);
    }
    None
}

/// Sends SIGTERM to the daemon process.
fn stop_daemon(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let pid = i32::try_from(pid).context("PID out of range")?;
        let result = unsafe { libc::kill(pid, libc::SIGTERM) };
        if result != 0 {
            bail!("Failed to send SIGTERM to process {}", pid);
        }
    }
    #[cfg(not(unix))]
    {
        bail!("Stop command is only supported on Unix systems");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = DaemonConfig::load(args.config.as_deref()).context("Failed to load config")?;
    let pid_file = config.pid_file();

    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        action: None,
    });

    match command {
        Command::Start { daemon, action } => {
            if let Some(pid) = is_daemon_running(&pid_file) {
                eprintln!("Daemon is already running (PID {})", pid);
                eprintln!("Use 'fgd stop' to stop it first.");
                process::exit(1);
            }

            if daemon {
                // Daemonize before starting tokio runtime
                daemonize(&config.log_file())?;
            }

            write_pid(&pid_file)?;

            let result = run_daemon(config, action);

            remove_pid_file(&pid_file);

            result
        }
        Command::Stop => {
            if let Some(pid) = is_daemon_running(&pid_file) {
                println!("Stopping daemon (PID {})...", pid);
                stop_daemon(pid)?;

                // Wait for process to exit (up to 5 seconds)
                for _ in 0..50 {
                    if !is_process_running(pid) {
                        println!("Daemon stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }

                eprintln!("Daemon did not stop within 5 seconds.");
                process::exit(1);
            } else {
                println!("Daemon is not running.");
                Ok(())
            }
        }
        Command::Status => {
            if let Some(pid) = is_daemon_running(&pid_file) {
                println!("Daemon is running (PID {})", pid);
                if config.socket_path.exists() {
                    println!("Socket: {}", config.socket_path.display());
                }
                if config.status_file().exists() {
                    println!("Tracking: yes");
                }
                Ok(())
            } else {
                println!("Daemon is not running.");
                process::exit(1);
            }
        }
    }
}

/// Daemonizes the current process.
fn daemonize(log_path: &Path) -> Result<()> {
    use daemonize::Daemonize;

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout.try_clone().context("Failed to open log file for stderr")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

/// Runs the daemon (async entry point).
#[tokio::main]
async fn run_daemon(config: DaemonConfig, action: Option<String>) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("fgd=info".parse()?)
                .add_directive("fg_core=info".parse()?)
                .add_directive("fg_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "focusguard daemon starting"
    );

    // A status file left behind means the last process died while tracking.
    let stale_lease = StatusFileKeepAlive::new(config.status_file()).stale_lease();
    let commands = startup_commands(action.as_deref(), stale_lease)?;

    let collaborators = Collaborators::desktop(&config).context("Failed to set up collaborators")?;
    let daemon = Daemon::spawn(&config, collaborators);

    for command in commands {
        daemon
            .host
            .dispatch(command)
            .await
            .with_context(|| format!("Startup command {command} failed"))?;
    }

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let server = DaemonServer::new(&config.socket_path, daemon.server_context(), cancel_token);
    info!(socket = %config.socket_path.display(), "Starting server");

    let served = server.run().await;

    // Teardown: the open session is written before we return.
    match daemon.host.shutdown().await {
        Ok(Some(record)) => info!(package = %record.package, "Final session recorded"),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Host already stopped"),
    }

    if let Err(e) = served {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("focusguard daemon stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
