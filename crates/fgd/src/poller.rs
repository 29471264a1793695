//! Foreground-event source: bridges a pull-only OS usage log into a
//! broadcast stream of foreground events.
//!
//! Each tick queries the log for `[watermark, now)`, keeps only the latest
//! app-resumed event (transient flicker in between is discarded), publishes
//! it, and advances the watermark to `now` whether or not the query
//! succeeded.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Query failures and timeouts are logged; the loop always proceeds to
//!   the next tick

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use fg_core::{EventKind, ForegroundEvent, Timestamp};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::ports::{Clock, UsageLog};

/// Default tick interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3_000);

/// Upper bound on a single usage-log query.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

const EVENT_BUFFER: usize = 64;

/// Last timestamp up to which the usage log has been processed.
#[derive(Debug, Default)]
struct Watermark(AtomicI64);

impl Watermark {
    fn get(&self) -> Timestamp {
        Timestamp::from_millis(self.0.load(Ordering::Acquire))
    }

    /// Moves the watermark forward; never backwards.
    fn advance_to(&self, to: Timestamp) {
        self.0.fetch_max(to.as_millis(), Ordering::AcqRel);
    }
}

struct PollTask {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Polling foreground-event source.
pub struct ForegroundPoller {
    usage_log: Arc<dyn UsageLog>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    events: broadcast::Sender<ForegroundEvent>,
    watermark: Arc<Watermark>,
    task: Mutex<Option<PollTask>>,
}

impl ForegroundPoller {
    pub fn new(usage_log: Arc<dyn UsageLog>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            usage_log,
            clock,
            interval,
            events,
            watermark: Arc::new(Watermark::default()),
            task: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Starts the polling loop unless one is already running.
    ///
    /// Liveness is judged from the loop's task handle, so a loop that ended
    /// unexpectedly is replaced. Returns true if a new loop was launched.
    pub fn start_polling(&self) -> bool {
        let mut task = self.lock_task();

        if let Some(existing) = task.as_ref() {
            if !existing.handle.is_finished() {
                trace!("Poller already running");
                return false;
            }
            warn!("Previous poll loop ended unexpectedly, restarting");
        }

        // Do not replay history from before this start.
        let now = self.clock.now();
        let floor = Timestamp::from_millis(
            now.as_millis()
                .saturating_sub(i64::try_from(self.interval.as_millis()).unwrap_or(i64::MAX)),
        );
        self.watermark.advance_to(floor);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            Arc::clone(&self.usage_log),
            Arc::clone(&self.clock),
            self.interval,
            self.events.clone(),
            Arc::clone(&self.watermark),
            cancel.clone(),
        ));

        info!(interval_ms = self.interval.as_millis() as u64, "Foreground poller started");
        *task = Some(PollTask { handle, cancel });
        true
    }

    /// Cancels the polling loop. Safe to call when not running.
    pub fn stop_polling(&self) {
        if let Some(task) = self.lock_task().take() {
            task.cancel.cancel();
            info!("Foreground poller stopped");
        }
    }

    /// True while a polling loop is alive.
    pub fn is_polling(&self) -> bool {
        self.lock_task()
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Subscribe to polled foreground events.
    ///
    /// Events published before subscribing are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<ForegroundEvent> {
        self.events.subscribe()
    }

    /// The last-checked timestamp.
    pub fn watermark(&self) -> Timestamp {
        self.watermark.get()
    }

    fn lock_task(&self) -> MutexGuard<'_, Option<PollTask>> {
        self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ForegroundPoller {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

async fn poll_loop(
    usage_log: Arc<dyn UsageLog>,
    clock: Arc<dyn Clock>,
    period: Duration,
    events: broadcast::Sender<ForegroundEvent>,
    watermark: Arc<Watermark>,
    cancel: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let now = clock.now();
        let since = watermark.get();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = timeout(QUERY_TIMEOUT, usage_log.query(since, now)) => result,
        };

        match result {
            Ok(Ok(batch)) => {
                trace!(since = since.as_millis(), now = now.as_millis(), events = batch.len(), "Usage log queried");
                if let Some(latest) = latest_resumed(batch) {
                    debug!(package = ?latest.package, at = %latest.timestamp, "Foreground app observed");
                    if events.send(latest).is_err() {
                        trace!("No poller subscribers");
                    }
                }
            }
            Ok(Err(e)) => warn!(error = %e, "Usage log query failed"),
            Err(_) => warn!(timeout_secs = QUERY_TIMEOUT.as_secs(), "Usage log query timed out"),
        }

        watermark.advance_to(now);
    }

    debug!("Poll loop exited");
}

/// The latest app-resumed event; ties go to the later one.
///
/// A package-less event ("nothing in the foreground") competes like any
/// other, so a screen that went dark after the last app reports that.
pub fn latest_resumed(events: Vec<ForegroundEvent>) -> Option<ForegroundEvent> {
    events
        .into_iter()
        .filter(|e| e.kind == EventKind::AppResumed)
        .fold(None, |best, event| match best {
            Some(best) if best.timestamp > event.timestamp => Some(best),
            _ => Some(event),
        })
}
