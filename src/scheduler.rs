//! Periodic SLA monitoring.
//!
//! [`SlaMonitor`] runs [`check_sla_warnings`] against a shared store: once
//! immediately when started, then on every interval tick from a background
//! tokio task. Only one timer exists per monitor; starting again replaces it.
//!
//! A hook registered with [`SlaMonitor::before_scan`] runs under the store lock
//! right before each scan, so the store can be reloaded from disk. Listeners
//! registered with [`SlaMonitor::on_scan`] run after every scan, outside the
//! store lock. Hook and listener errors are logged and the timer keeps ticking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::sla::{ScanReport, SlaPolicy, check_sla_warnings};
use crate::store::{self, ItsmData, SharedStore};
use crate::{Error, Result};

/// Default time between scans.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(60);

/// Source of the current time for scans.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(Mutex::new(at))
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Callback invoked with the report of every scan.
pub type ScanListener = Box<dyn Fn(&ScanReport) -> Result<()> + Send + Sync>;

/// Callback that refreshes the store before a scan.
pub type RefreshHook = Box<dyn Fn(&mut ItsmData) -> Result<()> + Send + Sync>;

/// State shared between the monitor and its timer task.
struct MonitorShared {
    store: SharedStore,
    clock: Arc<dyn Clock>,
    policy: SlaPolicy,
    refresh: Mutex<Option<RefreshHook>>,
    listeners: Mutex<Vec<ScanListener>>,
    scans: AtomicU64,
}

impl MonitorShared {
    fn run_scan(&self) -> ScanReport {
        let report = {
            let mut data = store::lock(&self.store);
            let refresh = self.refresh.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(refresh) = refresh.as_ref() {
                if let Err(e) = refresh(&mut data) {
                    warn!(error = %e, "store refresh failed, scanning current data");
                }
            }
            check_sla_warnings(&mut data, self.clock.now(), &self.policy)
        };
        let scan = self.scans.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(
            scan,
            evaluated = report.evaluated,
            raised = report.raised.len(),
            "SLA scan finished"
        );

        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            if let Err(e) = listener(&report) {
                warn!(scan, error = %e, "SLA scan listener failed");
            }
        }
        report
    }
}

struct TimerTask {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Periodic SLA scanner over a shared store.
pub struct SlaMonitor {
    shared: Arc<MonitorShared>,
    timer: Option<TimerTask>,
}

impl SlaMonitor {
    /// Create a monitor using the system clock.
    pub fn new(store: SharedStore, policy: SlaPolicy) -> Self {
        Self::with_clock(store, policy, Arc::new(SystemClock))
    }

    pub fn with_clock(store: SharedStore, policy: SlaPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            shared: Arc::new(MonitorShared {
                store,
                clock,
                policy,
                refresh: Mutex::new(None),
                listeners: Mutex::new(Vec::new()),
                scans: AtomicU64::new(0),
            }),
            timer: None,
        }
    }

    /// Register a listener. Listeners must not register further listeners.
    pub fn on_scan<F>(&self, listener: F)
    where
        F: Fn(&ScanReport) -> Result<()> + Send + Sync + 'static,
    {
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(listener));
    }

    /// Set the hook that runs before every scan, replacing any previous one.
    pub fn before_scan<F>(&self, refresh: F)
    where
        F: Fn(&mut ItsmData) -> Result<()> + Send + Sync + 'static,
    {
        *self.shared.refresh.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Box::new(refresh));
    }

    /// Run one scan now, outside the timer.
    pub fn scan_now(&self) -> ScanReport {
        self.shared.run_scan()
    }

    /// Start scanning every `interval`, replacing any running timer.
    ///
    /// The first scan runs before this returns; its report is returned.
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, interval: Duration) -> Result<ScanReport> {
        if interval.is_zero() {
            return Err(Error::InvalidInput("scan interval must be positive".into()));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::Other("SLA monitor requires a tokio runtime".into()))?;

        if self.stop() {
            debug!("replacing running SLA timer");
        }

        let report = self.shared.run_scan();

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let shared = Arc::clone(&self.shared);
        let handle = runtime.spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        shared.run_scan();
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
            debug!("SLA timer exiting");
        });

        info!(interval_secs = interval.as_secs_f64(), "SLA monitoring started");
        self.timer = Some(TimerTask {
            shutdown_tx,
            handle,
        });
        Ok(report)
    }

    /// Stop the timer. Returns false if it was not running.
    pub fn stop(&mut self) -> bool {
        match self.timer.take() {
            Some(timer) => {
                // The task may already have exited; nothing to report then
                let _ = timer.shutdown_tx.send(());
                drop(timer.handle);
                info!("SLA monitoring stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Total scans run so far, timer-driven or not.
    pub fn scan_count(&self) -> u64 {
        self.shared.scans.load(Ordering::Acquire)
    }
}

impl Drop for SlaMonitor {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            let _ = timer.shutdown_tx.send(());
            timer.handle.abort();
        }
    }
}
