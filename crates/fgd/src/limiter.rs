//! Usage-limit engine: per-package continuous-usage ceilings and escalation.
//!
//! The engine tracks how long the currently active *limited* package has
//! been in the foreground and decides when to escalate:
//!
//! - [`Escalation::Warning`] once elapsed time reaches the limit,
//! - [`Escalation::Intervention`] once it reaches three times the limit.
//!
//! Each step fires at most once per session. The per-step
//! [`ThresholdState`] is reset only by [`UsageLimitEngine::on_new_session`],
//! never by a check, so re-evaluating on every event is safe.
//!
//! Deciding and acting are split: [`UsageLimitEngine::check_usage_limits`]
//! is synchronous and returns the steps that just crossed their threshold,
//! and [`Escalator`] performs the user-facing side effects on the
//! [`EscalationQueue`] task, away from the tracker.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use fg_core::{Escalation, LimitEntry, LimitedAppConfig, PackageId, ThresholdState, Timestamp};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::ports::{display_name_or_package, DisplayNameResolver, Notifier, SessionStore};

/// Upper bound on a single notification call.
pub const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Escalation batches waiting for the notifier.
const ESCALATION_BUFFER: usize = 32;

type ConfigMap = HashMap<PackageId, LimitedAppConfig>;

// ============================================================================
// Limit Cache
// ============================================================================

/// Copy-on-write cache of validated limit configs.
///
/// Readers take a snapshot (`Arc` clone under a momentary read lock) and
/// never observe a half-applied reload: [`LimitCache::replace`] swaps the
/// whole map at once.
#[derive(Debug, Default)]
pub struct LimitCache {
    configs: RwLock<Arc<ConfigMap>>,
}

/// Outcome of a settings reload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Entries now in the cache
    pub loaded: usize,
    /// Entries rejected by validation
    pub rejected: usize,
    /// True when the store could not be read (the previous cache is kept)
    pub store_failed: bool,
}

impl LimitCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache pre-populated from `entries`.
    pub fn from_entries(entries: Vec<LimitEntry>) -> Self {
        let cache = Self::new();
        let (configs, _) = build_configs(entries);
        cache.replace(configs);
        cache
    }

    /// Current set of configs.
    pub fn snapshot(&self) -> Arc<ConfigMap> {
        match self.configs.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Looks up the config for `package`.
    pub fn get(&self, package: &PackageId) -> Option<LimitedAppConfig> {
        self.snapshot().get(package).cloned()
    }

    /// Number of limited packages.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Atomically replaces the whole cache.
    pub fn replace(&self, configs: ConfigMap) {
        let configs = Arc::new(configs);
        match self.configs.write() {
            Ok(mut guard) => *guard = configs,
            Err(poisoned) => *poisoned.into_inner() = configs,
        }
    }

    /// Reloads all limit settings from the store.
    ///
    /// Bad entries are rejected individually; a store failure keeps the
    /// previous cache.
    pub async fn reload(&self, store: &dyn SessionStore) -> LoadReport {
        let entries = match store.limited_apps().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Failed to load limit settings, keeping previous cache");
                return LoadReport {
                    loaded: self.len(),
                    rejected: 0,
                    store_failed: true,
                };
            }
        };

        let (configs, rejected) = build_configs(entries);
        let loaded = configs.len();
        self.replace(configs);

        info!(loaded, rejected, "Limit settings loaded");
        LoadReport {
            loaded,
            rejected,
            store_failed: false,
        }
    }
}

/// Validates entries into a config map. Later duplicates win.
fn build_configs(entries: Vec<LimitEntry>) -> (ConfigMap, usize) {
    let mut configs = ConfigMap::with_capacity(entries.len());
    let mut rejected = 0;

    for entry in entries {
        match LimitedAppConfig::try_from(entry) {
            Ok(config) => {
                if let Some(previous) = configs.insert(config.package().clone(), config) {
                    debug!(package = %previous.package(), "Duplicate limit entry, keeping the later one");
                }
            }
            Err(e) => {
                warn!(error = %e, "Rejected limit entry");
                rejected += 1;
            }
        }
    }

    (configs, rejected)
}

// ============================================================================
// Engine
// ============================================================================

/// Escalation bookkeeping for the active limited package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterSessionState {
    config: LimitedAppConfig,
    continuous_start: Timestamp,
    warning: ThresholdState,
    intervention: ThresholdState,
}

impl LimiterSessionState {
    fn new(config: LimitedAppConfig, continuous_start: Timestamp) -> Self {
        Self {
            config,
            continuous_start,
            warning: ThresholdState::NotTriggered,
            intervention: ThresholdState::NotTriggered,
        }
    }

    pub fn config(&self) -> &LimitedAppConfig {
        &self.config
    }

    pub fn continuous_start(&self) -> Timestamp {
        self.continuous_start
    }

    /// State of a single escalation step.
    pub fn state_of(&self, escalation: Escalation) -> ThresholdState {
        match escalation {
            Escalation::Warning => self.warning,
            Escalation::Intervention => self.intervention,
        }
    }

    fn mark_triggered(&mut self, escalation: Escalation) {
        match escalation {
            Escalation::Warning => self.warning = ThresholdState::Triggered,
            Escalation::Intervention => self.intervention = ThresholdState::Triggered,
        }
    }
}

/// An escalation step that just crossed its threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationAction {
    pub escalation: Escalation,
    pub config: LimitedAppConfig,
    pub elapsed: Duration,
}

/// Decides when the active limited package escalates.
#[derive(Debug)]
pub struct UsageLimitEngine {
    cache: Arc<LimitCache>,
    state: Option<LimiterSessionState>,
}

impl UsageLimitEngine {
    pub fn new(cache: Arc<LimitCache>) -> Self {
        Self { cache, state: None }
    }

    /// The shared config cache.
    pub fn cache(&self) -> &Arc<LimitCache> {
        &self.cache
    }

    /// Reloads the config cache from the store.
    ///
    /// A session already in progress keeps the config it started with.
    pub async fn load_limited_app_settings(&self, store: &dyn SessionStore) -> LoadReport {
        self.cache.reload(store).await
    }

    /// Current escalation state, if the active package is limited.
    pub fn session_state(&self) -> Option<&LimiterSessionState> {
        self.state.as_ref()
    }

    /// A new session began for `package` at `start`.
    pub fn on_new_session(&mut self, package: &PackageId, start: Timestamp) {
        self.state = self.cache.get(package).map(|config| {
            debug!(
                package = %package,
                limit_ms = config.limit().as_millis() as u64,
                "Limited package in foreground"
            );
            LimiterSessionState::new(config, start)
        });
    }

    /// The active session ended.
    pub fn on_session_finalized(&mut self) {
        self.state = None;
    }

    /// Evaluates the thresholds for `active` at `now`.
    ///
    /// Returns the steps that fire on this call, in ascending order. Each
    /// step is returned at most once per session.
    pub fn check_usage_limits(&mut self, active: &PackageId, now: Timestamp) -> Vec<EscalationAction> {
        let Some(state) = self.state.as_mut() else {
            return Vec::new();
        };
        if state.config.package() != active {
            return Vec::new();
        }

        let elapsed = now.saturating_since(state.continuous_start);
        let mut fired = Vec::new();

        for escalation in Escalation::ALL {
            if state.state_of(escalation).is_triggered() {
                continue;
            }
            if elapsed >= state.config.threshold(escalation) {
                state.mark_triggered(escalation);
                fired.push(EscalationAction {
                    escalation,
                    config: state.config.clone(),
                    elapsed,
                });
            }
        }

        fired
    }
}

// ============================================================================
// Escalator
// ============================================================================

/// Performs the user-facing side effects of escalation.
///
/// Failures are logged and not retried; the threshold stays triggered for
/// the rest of the session.
#[derive(Clone)]
pub struct Escalator {
    notifier: Arc<dyn Notifier>,
    names: Arc<dyn DisplayNameResolver>,
    home_package: PackageId,
}

impl Escalator {
    /// `home_package` is brought to the foreground on intervention.
    pub fn new(
        notifier: Arc<dyn Notifier>,
        names: Arc<dyn DisplayNameResolver>,
        home_package: PackageId,
    ) -> Self {
        Self {
            notifier,
            names,
            home_package,
        }
    }

    /// Runs `actions` in order.
    pub async fn dispatch(&self, actions: &[EscalationAction]) {
        for action in actions {
            let display_name = display_name_or_package(self.names.as_ref(), action.config.package());
            match action.escalation {
                Escalation::Warning => self.warn_user(action, &display_name).await,
                Escalation::Intervention => self.intervene(action, &display_name).await,
            }
        }
    }

    async fn warn_user(&self, action: &EscalationAction, display_name: &str) {
        info!(
            package = %action.config.package(),
            elapsed_ms = action.elapsed.as_millis() as u64,
            limit_ms = action.config.limit().as_millis() as u64,
            "Usage limit reached, warning user"
        );
        let call = self
            .notifier
            .show_warning(&action.config, display_name, action.elapsed);
        log_notify_failure("show_warning", timeout(NOTIFY_TIMEOUT, call).await);
    }

    async fn intervene(&self, action: &EscalationAction, display_name: &str) {
        info!(
            package = %action.config.package(),
            elapsed_ms = action.elapsed.as_millis() as u64,
            "Usage far past limit, intervening"
        );
        let foreground = self.notifier.bring_app_to_foreground(&self.home_package);
        log_notify_failure(
            "bring_app_to_foreground",
            timeout(NOTIFY_TIMEOUT, foreground).await,
        );
        let message = self.notifier.show_dissuasion_message(display_name);
        log_notify_failure(
            "show_dissuasion_message",
            timeout(NOTIFY_TIMEOUT, message).await,
        );
    }
}

/// Runs escalations on their own task, one batch at a time in submission
/// order, so a slow notifier never holds up the tracker.
#[derive(Clone)]
pub struct EscalationQueue {
    sender: mpsc::Sender<Vec<EscalationAction>>,
}

impl EscalationQueue {
    /// Spawns the worker. It stops once every queue handle is dropped.
    pub fn spawn(escalator: Escalator) -> Self {
        let (sender, mut receiver) = mpsc::channel::<Vec<EscalationAction>>(ESCALATION_BUFFER);

        tokio::spawn(async move {
            while let Some(actions) = receiver.recv().await {
                escalator.dispatch(&actions).await;
            }
            debug!("Escalation queue stopped");
        });

        Self { sender }
    }

    /// Queues `actions` without waiting.
    ///
    /// A full queue drops the batch; like a failed notification, it is not
    /// retried.
    pub fn submit(&self, actions: Vec<EscalationAction>) {
        if actions.is_empty() {
            return;
        }
        match self.sender.try_send(actions) {
            Ok(()) => {}
            Err(TrySendError::Full(actions)) => {
                warn!(dropped = actions.len(), "Escalation queue full, notifications dropped");
            }
            Err(TrySendError::Closed(_)) => warn!("Escalation queue closed"),
        }
    }
}

fn log_notify_failure(
    call: &str,
    result: Result<crate::ports::PortResult<()>, tokio::time::error::Elapsed>,
) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(call, error = %e, "Notification failed"),
        Err(_) => warn!(call, timeout_secs = NOTIFY_TIMEOUT.as_secs(), "Notification timed out"),
    }
}
