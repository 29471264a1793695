//! Wiring of the tracking pipeline.

use std::sync::Arc;

use fg_core::PackageId;

use crate::adapters::{
    CommandUsageLog, DesktopNotifier, JsonlSessionStore, LoggingInspector, StatusFileKeepAlive,
    TableDisplayNames,
};
use crate::config::DaemonConfig;
use crate::focus::WindowFocusSource;
use crate::host::{spawn_host, HostHandle, HostParts};
use crate::limiter::LimitCache;
use crate::poller::ForegroundPoller;
use crate::ports::{
    Clock, ContentInspector, DisplayNameResolver, KeepAlive, Notifier, PortResult, SessionStore,
    SystemClock, UsageLog,
};
use crate::server::ServerContext;
use crate::tracker::{spawn_tracker, TrackerHandle, TrackerParts};

/// Every external collaborator the daemon talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub usage_log: Arc<dyn UsageLog>,
    pub store: Arc<dyn SessionStore>,
    pub notifier: Arc<dyn Notifier>,
    pub names: Arc<dyn DisplayNameResolver>,
    pub inspector: Arc<dyn ContentInspector>,
    pub keep_alive: Arc<dyn KeepAlive>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// The desktop adapters configured by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the foreground command is empty.
    pub fn desktop(config: &DaemonConfig) -> PortResult<Self> {
        Ok(Self {
            usage_log: Arc::new(CommandUsageLog::new(&config.foreground_command)?),
            store: Arc::new(JsonlSessionStore::new(
                config.sessions_file(),
                config.limits_path.clone(),
            )),
            notifier: Arc::new(DesktopNotifier::new(config.focus_command.clone())),
            names: Arc::new(TableDisplayNames::new(config.display_names.clone())),
            inspector: Arc::new(LoggingInspector),
            keep_alive: Arc::new(StatusFileKeepAlive::new(config.status_file())),
            clock: Arc::new(SystemClock),
        })
    }
}

/// Running tracker, poller, focus source and host.
#[derive(Clone)]
pub struct Daemon {
    pub host: HostHandle,
    pub tracker: TrackerHandle,
    pub poller: Arc<ForegroundPoller>,
    pub focus: Arc<WindowFocusSource>,
    pub limits: Arc<LimitCache>,
}

impl Daemon {
    /// Spawns every actor. Nothing is tracked until the host receives a
    /// begin command.
    pub fn spawn(config: &DaemonConfig, collaborators: Collaborators) -> Self {
        let limits = Arc::new(LimitCache::new());

        let tracker = spawn_tracker(TrackerParts {
            store: Arc::clone(&collaborators.store),
            notifier: collaborators.notifier,
            names: collaborators.names,
            limits: Arc::clone(&limits),
            home_package: PackageId::new(config.home_package.clone()),
        });

        let poller = Arc::new(ForegroundPoller::new(
            collaborators.usage_log,
            Arc::clone(&collaborators.clock),
            config.poll_interval(),
        ));

        let focus = Arc::new(WindowFocusSource::new(
            tracker.clone(),
            collaborators.inspector,
            Arc::clone(&collaborators.clock),
            config.focus_debounce(),
        ));

        let host = spawn_host(HostParts {
            tracker: tracker.clone(),
            poller: Arc::clone(&poller),
            limits: Arc::clone(&limits),
            store: collaborators.store,
            keep_alive: collaborators.keep_alive,
            clock: collaborators.clock,
            limit_check_interval: config.limit_check_interval(),
        });

        Self {
            host,
            tracker,
            poller,
            focus,
            limits,
        }
    }

    pub fn server_context(&self) -> ServerContext {
        ServerContext {
            host: self.host.clone(),
            tracker: self.tracker.clone(),
            focus: Arc::clone(&self.focus),
        }
    }
}
