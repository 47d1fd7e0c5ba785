// Scheduler engine: reloads monitors, picks the due ones and runs them concurrently

use crate::config_store::MonitorSource;
use crate::errors::SchedulerError;
use crate::models::Monitor;
use crate::runner::{MonitorRunner, RunOutcome};
use crate::scheduler::clock::{Clock, SystemClock};
use crate::telemetry;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Configuration for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Sleep between cycles (in seconds)
    pub poll_interval_seconds: u64,
    /// Upper bound on runs in flight within one cycle; 0 means unbounded
    pub max_concurrent_runs: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 120,
            max_concurrent_runs: 0,
        }
    }
}

/// Last dispatch time per monitor id
#[derive(Debug, Default, Clone)]
pub struct DueTimeTable {
    last_run: HashMap<String, DateTime<Utc>>,
}

impl DueTimeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time left until `monitor` is due, or `None` when it is due now
    pub fn remaining(&self, monitor: &Monitor, now: DateTime<Utc>) -> Option<ChronoDuration> {
        let last = self.last_run.get(&monitor.id)?;
        let cooldown = ChronoDuration::seconds(monitor.cooldown_seconds());
        let elapsed = now - *last;
        if elapsed >= cooldown {
            None
        } else {
            Some(cooldown - elapsed)
        }
    }

    /// Never-run monitors are always due
    pub fn is_due(&self, monitor: &Monitor, now: DateTime<Utc>) -> bool {
        self.remaining(monitor, now).is_none()
    }

    pub fn mark_dispatched(&mut self, monitor_id: &str, at: DateTime<Utc>) {
        self.last_run.insert(monitor_id.to_string(), at);
    }

    pub fn last_run(&self, monitor_id: &str) -> Option<DateTime<Utc>> {
        self.last_run.get(monitor_id).copied()
    }
}

/// Aggregate outcome of one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub due: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub rate_limited: usize,
    pub cancelled: usize,
    pub notifications: usize,
}

impl CycleReport {
    fn record(&mut self, outcome: &RunOutcome) {
        self.notifications += outcome.notified_count;
        if outcome.error.is_some() {
            self.failed += 1;
        } else if outcome.cancelled {
            self.cancelled += 1;
        } else if outcome.rate_limited {
            self.rate_limited += 1;
        } else {
            self.succeeded += 1;
        }
    }
}

/// Scheduler trait for monitor scheduling operations
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Load monitors and run cycles until stopped
    async fn start(&self) -> Result<(), SchedulerError>;

    /// Signal the loop and in-flight runs to stop
    async fn stop(&self) -> Result<(), SchedulerError>;

    /// Run every due monitor once and wait for all of them
    async fn run_cycle(&self) -> CycleReport;
}

#[derive(Debug, Default)]
struct MonitorState {
    monitors: Vec<Monitor>,
    marker: Option<SystemTime>,
}

/// Main scheduler engine implementation
pub struct SchedulerEngine {
    config: SchedulerConfig,
    source: Arc<dyn MonitorSource>,
    runner: MonitorRunner,
    clock: Arc<dyn Clock>,
    semaphore: Option<Arc<Semaphore>>,
    state: Mutex<MonitorState>,
    due: Mutex<DueTimeTable>,
    cancel: CancellationToken,
}

impl SchedulerEngine {
    pub fn new(
        config: SchedulerConfig,
        source: Arc<dyn MonitorSource>,
        runner: MonitorRunner,
        cancel: CancellationToken,
    ) -> Self {
        let semaphore = match config.max_concurrent_runs {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };
        Self {
            config,
            source,
            runner,
            clock: Arc::new(SystemClock),
            semaphore,
            state: Mutex::new(MonitorState::default()),
            due: Mutex::new(DueTimeTable::new()),
            cancel,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current monitor list
    pub async fn monitors(&self) -> Vec<Monitor> {
        self.state.lock().await.monitors.clone()
    }

    pub async fn last_run(&self, monitor_id: &str) -> Option<DateTime<Utc>> {
        self.due.lock().await.last_run(monitor_id)
    }

    /// Startup load; unlike reloads, failure here is fatal
    #[instrument(skip(self))]
    pub async fn load_initial(&self) -> Result<usize, SchedulerError> {
        let marker = self.source.modified_marker();
        let monitors = self
            .source
            .load_monitors()
            .await
            .map_err(SchedulerError::InitialConfig)?;

        let count = monitors.len();
        let mut state = self.state.lock().await;
        state.monitors = monitors;
        state.marker = marker;
        info!(monitors = count, "Monitor configuration loaded");
        Ok(count)
    }

    /// Reload when the store's marker moved. A failed reload keeps the
    /// previous list and leaves the marker so the next cycle retries.
    async fn refresh_monitors(&self) {
        let marker = self.source.modified_marker();
        let mut state = self.state.lock().await;
        if marker.is_none() || marker == state.marker {
            return;
        }

        info!("Configuration changed, reloading");
        match self.source.load_monitors().await {
            Ok(monitors) => {
                info!(monitors = monitors.len(), "Configuration reloaded");
                state.monitors = monitors;
                state.marker = marker;
            }
            Err(e) => {
                warn!(error = %e, "Failed to reload configuration, keeping previous monitors");
            }
        }
    }

    /// Enabled monitors that are due, marking each as dispatched at `now`
    async fn take_due(&self, now: DateTime<Utc>) -> Vec<Monitor> {
        let enabled: Vec<Monitor> = self
            .state
            .lock()
            .await
            .monitors
            .iter()
            .filter(|m| m.enabled)
            .cloned()
            .collect();

        let mut table = self.due.lock().await;
        let mut due = Vec::new();
        for monitor in enabled {
            match table.remaining(&monitor, now) {
                None => {
                    info!(monitor_id = %monitor.id, monitor_name = %monitor.name, "Monitor due, running");
                    table.mark_dispatched(&monitor.id, now);
                    due.push(monitor);
                }
                Some(remaining) => {
                    debug!(
                        monitor_id = %monitor.id,
                        monitor_name = %monitor.name,
                        remaining_minutes = %format!("{:.1}", remaining.num_seconds() as f64 / 60.0),
                        "Monitor not due yet"
                    );
                }
            }
        }
        due
    }
}

#[async_trait]
impl Scheduler for SchedulerEngine {
    #[instrument(skip(self))]
    async fn start(&self) -> Result<(), SchedulerError> {
        if self.config.poll_interval_seconds == 0 {
            return Err(SchedulerError::InvalidConfiguration(
                "poll_interval_seconds must be greater than 0".to_string(),
            ));
        }
        self.load_initial().await?;

        info!(
            poll_interval_seconds = self.config.poll_interval_seconds,
            max_concurrent_runs = self.config.max_concurrent_runs,
            "Starting scheduler engine"
        );
        let poll_interval = Duration::from_secs(self.config.poll_interval_seconds);

        while !self.cancel.is_cancelled() {
            self.run_cycle().await;

            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                _ = self.cancel.cancelled() => {
                    info!("Shutdown signal received, stopping scheduler");
                }
            }
        }

        info!("Scheduler engine stopped");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop(&self) -> Result<(), SchedulerError> {
        info!("Stopping scheduler engine");
        self.cancel.cancel();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();
        self.refresh_monitors().await;
        let monitor_count = self.state.lock().await.monitors.len();
        info!(monitors = monitor_count, "Scheduler cycle started");

        let now = self.clock.now();
        let due = self.take_due(now).await;
        let mut report = CycleReport {
            due: due.len(),
            ..Default::default()
        };

        if due.is_empty() {
            let elapsed = started.elapsed();
            telemetry::record_cycle_duration(elapsed.as_secs_f64());
            info!(
                due = 0,
                duration_ms = elapsed.as_millis() as u64,
                "Scheduler cycle complete, no monitors due"
            );
            return report;
        }

        let mut tasks = JoinSet::new();
        for monitor in due {
            let runner = self.runner.clone();
            let semaphore = self.semaphore.clone();
            tasks.spawn(async move {
                let _permit = match semaphore {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };
                runner.run(&monitor).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.record(&outcome),
                Err(e) => {
                    error!(error = %e, "Monitor run task failed");
                    report.failed += 1;
                }
            }
        }

        let elapsed = started.elapsed();
        telemetry::record_cycle_duration(elapsed.as_secs_f64());
        info!(
            due = report.due,
            succeeded = report.succeeded,
            failed = report.failed,
            rate_limited = report.rate_limited,
            cancelled = report.cancelled,
            notifications = report.notifications,
            duration_ms = elapsed.as_millis() as u64,
            "Scheduler cycle complete"
        );
        report
    }
}
