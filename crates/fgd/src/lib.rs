//! focusguard daemon - foreground session tracking and usage limits
//!
//! This crate provides the daemon's tracking pipeline:
//! - `poller` - polls the OS usage log for the latest foreground app
//! - `focus` - debounced window-focus notifications
//! - `tracker` - session tracker actor, the single owner of the open session
//! - `limiter` - per-app limits and the warning/intervention escalation
//! - `host` - background host dispatching start commands
//! - `server` - Unix socket control server
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           fgd daemon                             │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  ┌──────────────┐  start cmds  ┌────────────┐                    │
//! │  │ DaemonServer │─────────────▶│ HostActor  │──▶ LivenessLease   │
//! │  │ (Unix socket)│              └─────┬──────┘                    │
//! │  └──────┬───────┘                    │ start/stop                │
//! │         │ focus events               ▼                           │
//! │         ▼                    ┌──────────────────┐                │
//! │  ┌───────────────────┐       │ ForegroundPoller │                │
//! │  │ WindowFocusSource │       └────────┬─────────┘                │
//! │  └─────────┬─────────┘                │ forwarder                │
//! │            │      TrackerCommand      ▼                          │
//! │            └──────────(mpsc)────▶ SessionTrackerActor            │
//! │                                   ├──▶ UsageLimitEngine          │
//! │                                   └──▶ SessionRecorder           │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod adapters;
pub mod config;
pub mod daemon;
pub mod focus;
pub mod host;
pub mod limiter;
pub mod poller;
pub mod ports;
pub mod server;
pub mod tracker;
