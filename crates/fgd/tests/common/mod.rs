//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fg_core::{ForegroundEvent, LimitEntry, LimitedAppConfig, PackageId, SessionRecord, Timestamp};
use fgd::config::DaemonConfig;
use fgd::daemon::Collaborators;
use fgd::ports::{
    Clock, ContentInspector, DisplayNameResolver, KeepAlive, Notifier, PortError, PortResult,
    SessionStore, UsageLog,
};

/// Session store that keeps everything in memory.
#[derive(Default)]
pub struct MemoryStore {
    pub sessions: Mutex<Vec<SessionRecord>>,
    pub limits: Mutex<Vec<LimitEntry>>,
}

impl MemoryStore {
    pub fn with_limits(limits: Vec<LimitEntry>) -> Self {
        Self {
            limits: Mutex::new(limits),
            ..Default::default()
        }
    }

    pub fn sessions(&self) -> Vec<SessionRecord> {
        self.sessions.lock().unwrap().clone()
    }

    pub fn set_limits(&self, limits: Vec<LimitEntry>) {
        *self.limits.lock().unwrap() = limits;
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn record_session(&self, record: &SessionRecord) -> PortResult<()> {
        self.sessions.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn limited_apps(&self) -> PortResult<Vec<LimitEntry>> {
        Ok(self.limits.lock().unwrap().clone())
    }
}

/// Notifier that records every call as `kind:arg`.
#[derive(Default)]
pub struct RecordingNotifier {
    pub calls: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn show_warning(
        &self,
        _config: &LimitedAppConfig,
        display_name: &str,
        _elapsed: Duration,
    ) -> PortResult<()> {
        self.calls.lock().unwrap().push(format!("warning:{display_name}"));
        Ok(())
    }

    async fn bring_app_to_foreground(&self, package: &PackageId) -> PortResult<()> {
        self.calls.lock().unwrap().push(format!("foreground:{package}"));
        Ok(())
    }

    async fn show_dissuasion_message(&self, display_name: &str) -> PortResult<()> {
        self.calls.lock().unwrap().push(format!("dissuade:{display_name}"));
        Ok(())
    }
}

pub struct Names(pub HashMap<String, String>);

impl DisplayNameResolver for Names {
    fn resolve(&self, package: &PackageId) -> PortResult<String> {
        self.0
            .get(package.as_str())
            .cloned()
            .ok_or_else(|| PortError::NotFound(package.to_string()))
    }
}

#[derive(Default)]
pub struct CountingInspector {
    pub calls: AtomicUsize,
}

#[async_trait]
impl ContentInspector for CountingInspector {
    async fn inspect(&self, _event: &ForegroundEvent) -> PortResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Keep-alive that tracks whether the lease is currently held.
#[derive(Default)]
pub struct FlagKeepAlive {
    pub held: Mutex<bool>,
    pub acquisitions: AtomicUsize,
}

impl FlagKeepAlive {
    pub fn is_held(&self) -> bool {
        *self.held.lock().unwrap()
    }
}

impl KeepAlive for FlagKeepAlive {
    fn acquire(&self) -> PortResult<()> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        *self.held.lock().unwrap() = true;
        Ok(())
    }

    fn release(&self) -> PortResult<()> {
        *self.held.lock().unwrap() = false;
        Ok(())
    }
}

/// Usage log reporting whatever package is currently set, or nothing in
/// the foreground when none is.
#[derive(Default)]
pub struct ScriptedUsageLog {
    pub current: Mutex<Option<String>>,
    pub queries: AtomicUsize,
}

impl ScriptedUsageLog {
    pub fn set_foreground(&self, package: Option<&str>) {
        *self.current.lock().unwrap() = package.map(str::to_string);
    }
}

#[async_trait]
impl UsageLog for ScriptedUsageLog {
    async fn query(&self, start: Timestamp, end: Timestamp) -> PortResult<Vec<ForegroundEvent>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let at = Timestamp::from_millis((end.as_millis() - 1).max(start.as_millis()));
        let event = match self.current.lock().unwrap().as_deref() {
            Some(package) => ForegroundEvent::resumed(package, at),
            None => ForegroundEvent::nothing_in_foreground(at),
        };
        Ok(vec![event])
    }
}

/// Clock moved by hand.
pub struct ManualClock(pub AtomicI64);

impl ManualClock {
    pub fn at(ms: i64) -> Self {
        Self(AtomicI64::new(ms))
    }

    pub fn set(&self, ms: i64) {
        self.0.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: i64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.0.load(Ordering::SeqCst))
    }
}

/// Every in-memory collaborator, kept for assertions.
pub struct Fakes {
    pub usage_log: Arc<ScriptedUsageLog>,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub inspector: Arc<CountingInspector>,
    pub keep_alive: Arc<FlagKeepAlive>,
    pub clock: Arc<ManualClock>,
}

impl Fakes {
    pub fn new(limits: Vec<LimitEntry>) -> Self {
        Self {
            usage_log: Arc::new(ScriptedUsageLog::default()),
            store: Arc::new(MemoryStore::with_limits(limits)),
            notifier: Arc::new(RecordingNotifier::default()),
            inspector: Arc::new(CountingInspector::default()),
            keep_alive: Arc::new(FlagKeepAlive::default()),
            clock: Arc::new(ManualClock::at(1_000_000)),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            usage_log: self.usage_log.clone(),
            store: self.store.clone(),
            notifier: self.notifier.clone(),
            names: Arc::new(Names(HashMap::from([(
                "com.example.feed".to_string(),
                "Feed".to_string(),
            )]))),
            inspector: self.inspector.clone(),
            keep_alive: self.keep_alive.clone(),
            clock: self.clock.clone(),
        }
    }
}

/// Fast intervals for tests that run in real time.
pub fn fast_config() -> DaemonConfig {
    DaemonConfig {
        poll_interval_ms: 20,
        focus_debounce_ms: 1_000,
        limit_check_interval_ms: Some(20),
        home_package: "focusguard".to_string(),
        ..Default::default()
    }
}

/// Polls `condition` until it holds or two seconds pass.
pub async fn eventually<F: FnMut() -> bool>(mut condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
