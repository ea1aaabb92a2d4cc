//! Background reconciliation scheduler.
//!
//! Wakes on a fixed interval and runs reconciliation once per day inside the
//! configured time window. A tick that arrives while a run is still in
//! progress is skipped. The scheduler stops on its cancellation token; the
//! token is not passed into the engine, which ends on its own time budget.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::config::CoreConfig;
use crate::logging::{LOG_RETENTION_DAYS, cleanup_old_logs};
use crate::reconcile::{Reconciler, ReconciliationReport};

/// Scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Daily window such as "03:30-05:00". `None` allows a run at any time.
    #[serde(default)]
    pub time_window: Option<String>,

    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    #[serde(default = "default_time_budget_secs")]
    pub time_budget_secs: u64,

    /// Directory whose rotated logs are pruned after each run.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_check_interval_secs() -> u64 {
    3600
}

fn default_time_budget_secs() -> u64 {
    300
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            time_window: Some("03:30-05:00".to_string()),
            check_interval_secs: default_check_interval_secs(),
            time_budget_secs: default_time_budget_secs(),
            log_dir: None,
        }
    }
}

impl SchedulerConfig {
    pub fn from_core(config: &CoreConfig) -> Self {
        Self {
            time_window: config.reconcile_window.clone(),
            check_interval_secs: config.scheduler_check_interval_secs,
            time_budget_secs: config.reconcile_time_budget_secs,
            log_dir: Some(config.log_dir.clone()),
        }
    }

    pub fn with_time_window(mut self, window: Option<String>) -> Self {
        self.time_window = window;
        self
    }

    pub fn with_check_interval_secs(mut self, secs: u64) -> Self {
        self.check_interval_secs = secs;
        self
    }

    pub fn with_time_budget_secs(mut self, secs: u64) -> Self {
        self.time_budget_secs = secs;
        self
    }
}

/// Daily time window, possibly spanning midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl TimeWindow {
    /// Parse "HH:MM-HH:MM".
    pub fn parse(window: &str) -> Option<Self> {
        let (start, end) = window.split_once('-')?;
        let start = NaiveTime::parse_from_str(start.trim(), "%H:%M").ok()?;
        let end = NaiveTime::parse_from_str(end.trim(), "%H:%M").ok()?;
        Some(Self { start, end })
    }

    pub fn is_within(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            time >= self.start && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

/// Outcome of one scheduler tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    OutsideWindow,
    AlreadyRanToday,
    AlreadyRunning,
    Completed(ReconciliationReport),
}

/// Runs reconciliation on a daily window.
pub struct ReconcileScheduler {
    config: SchedulerConfig,
    reconciler: Arc<Reconciler>,
    time_window: Option<TimeWindow>,
    running: AtomicBool,
    last_run: Mutex<Option<NaiveDate>>,
}

/// Clears the running flag when a run ends, including by error.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ReconcileScheduler {
    pub fn new(config: SchedulerConfig, reconciler: Arc<Reconciler>) -> Self {
        let time_window = config.time_window.as_deref().and_then(TimeWindow::parse);
        if config.time_window.is_some() && time_window.is_none() {
            warn!(
                window = ?config.time_window,
                "Invalid reconcile window, expected HH:MM-HH:MM; running without a window"
            );
        }

        Self {
            config,
            reconciler,
            time_window,
            running: AtomicBool::new(false),
            last_run: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn is_allowed_at(&self, time: NaiveTime) -> bool {
        self.time_window.is_none_or(|w| w.is_within(time))
    }

    fn ran_on(&self, date: NaiveDate) -> bool {
        self.last_run
            .lock()
            .map(|last| *last == Some(date))
            .unwrap_or(false)
    }

    fn record_run(&self, date: NaiveDate) {
        if let Ok(mut last) = self.last_run.lock() {
            *last = Some(date);
        }
    }

    /// Reconcile now, unless a run is already in progress.
    pub async fn run_once(&self) -> Result<Option<ReconciliationReport>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!("Reconciliation already in progress, skipping this run");
            return Ok(None);
        }
        let _guard = RunningGuard(&self.running);

        let report = self
            .reconciler
            .reconcile(Duration::from_secs(self.config.time_budget_secs))
            .await?;

        if let Some(log_dir) = &self.config.log_dir
            && let Err(e) = cleanup_old_logs(log_dir, LOG_RETENTION_DAYS).await
        {
            warn!(error = %e, "Log retention cleanup failed");
        }

        Ok(Some(report))
    }

    /// One scheduler tick at the given local date and time.
    pub async fn tick_at(&self, date: NaiveDate, time: NaiveTime) -> Result<TickOutcome> {
        if !self.is_allowed_at(time) {
            return Ok(TickOutcome::OutsideWindow);
        }
        if self.ran_on(date) {
            return Ok(TickOutcome::AlreadyRanToday);
        }

        match self.run_once().await? {
            Some(report) => {
                self.record_run(date);
                Ok(TickOutcome::Completed(report))
            }
            None => Ok(TickOutcome::AlreadyRunning),
        }
    }

    /// Spawn the background loop.
    pub fn start(
        self: &Arc<Self>,
        cancellation_token: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let scheduler = Arc::clone(self);

        tokio::spawn(async move {
            let mut check_interval =
                interval(Duration::from_secs(scheduler.config.check_interval_secs.max(1)));
            check_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                window = ?scheduler.config.time_window,
                interval_secs = scheduler.config.check_interval_secs,
                budget_secs = scheduler.config.time_budget_secs,
                "Reconcile scheduler started"
            );

            loop {
                tokio::select! {
                    _ = cancellation_token.cancelled() => {
                        info!("Reconcile scheduler shutting down");
                        break;
                    }
                    _ = check_interval.tick() => {
                        let now = Local::now();
                        match scheduler.tick_at(now.date_naive(), now.time()).await {
                            Ok(TickOutcome::Completed(report)) => {
                                debug!(
                                    timed_out = report.timed_out,
                                    "Scheduled reconciliation finished"
                                );
                            }
                            Ok(outcome) => debug!(?outcome, "Scheduler tick skipped"),
                            Err(e) => error!(error = %e, "Scheduled reconciliation failed"),
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::VideoDbModel;
    use crate::database::repositories::{SqlxVideoRepository, VideoRepository};
    use crate::database::{init_pool, run_migrations};

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    async fn scheduler(root: &std::path::Path, window: Option<&str>) -> ReconcileScheduler {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let repo = Arc::new(SqlxVideoRepository::new(pool));
        repo.create_video(&VideoDbModel::new("abc123", "C", "T"))
            .await
            .unwrap();
        let reconciler = Arc::new(Reconciler::new(repo, root));
        ReconcileScheduler::new(
            SchedulerConfig::default().with_time_window(window.map(String::from)),
            reconciler,
        )
    }

    #[test]
    fn test_time_window_parse() {
        let window = TimeWindow::parse("03:30-05:00").unwrap();
        assert_eq!(window.start, t(3, 30));
        assert_eq!(window.end, t(5, 0));

        assert!(TimeWindow::parse("invalid").is_none());
        assert!(TimeWindow::parse("03:30").is_none());
        assert!(TimeWindow::parse("03:30-").is_none());
        assert!(TimeWindow::parse("25:00-05:00").is_none());
    }

    #[test]
    fn test_time_window_bounds() {
        let window = TimeWindow::parse("03:30-05:00").unwrap();
        assert!(window.is_within(t(3, 30)));
        assert!(window.is_within(t(4, 59)));
        assert!(!window.is_within(t(3, 29)));
        assert!(!window.is_within(t(5, 0)));
    }

    #[test]
    fn test_time_window_overnight() {
        let window = TimeWindow::parse("23:00-02:00").unwrap();
        assert!(window.is_within(t(23, 30)));
        assert!(window.is_within(t(1, 0)));
        assert!(!window.is_within(t(12, 0)));
    }

    #[test]
    fn test_scheduler_config_default() {
        let config = SchedulerConfig::default();
        assert_eq!(config.time_window.as_deref(), Some("03:30-05:00"));
        assert_eq!(config.check_interval_secs, 3600);
        assert_eq!(config.time_budget_secs, 300);
    }

    #[tokio::test]
    async fn test_tick_runs_once_per_day() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(dir.path(), Some("03:30-05:00")).await;

        assert_eq!(
            scheduler.tick_at(d(1), t(12, 0)).await.unwrap(),
            TickOutcome::OutsideWindow
        );

        let outcome = scheduler.tick_at(d(1), t(3, 45)).await.unwrap();
        match outcome {
            TickOutcome::Completed(report) => {
                assert_eq!(report.processed, 1);
                assert_eq!(report.removed, 1);
            }
            other => panic!("expected a completed run, got {:?}", other),
        }

        assert_eq!(
            scheduler.tick_at(d(1), t(4, 45)).await.unwrap(),
            TickOutcome::AlreadyRanToday
        );
        assert!(matches!(
            scheduler.tick_at(d(2), t(3, 45)).await.unwrap(),
            TickOutcome::Completed(_)
        ));
    }

    #[tokio::test]
    async fn test_overlapping_run_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(dir.path(), None).await;

        scheduler.running.store(true, Ordering::Release);
        assert_eq!(scheduler.run_once().await.unwrap(), None);

        scheduler.running.store(false, Ordering::Release);
        assert!(scheduler.run_once().await.unwrap().is_some());
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_failed_run_clears_running_flag() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(&dir.path().join("missing"), None).await;

        assert!(scheduler.run_once().await.is_err());
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_start_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = Arc::new(scheduler(dir.path(), Some("00:00-00:01")).await);
        let token = CancellationToken::new();

        let handle = scheduler.start(token.clone());
        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
