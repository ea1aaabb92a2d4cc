//! Catalog reconciliation against the filesystem.
//!
//! A run scans the download tree once, then walks the catalog in primary-key
//! chunks and applies the minimal corrections each row needs. The run is
//! bounded by a wall-clock budget; running out of budget ends the run early
//! with `timed_out` set and leaves the remaining rows for the next run.
//!
//! Writes happen one row per statement in small sub-batches with a
//! cooperative yield in between, so a long run never monopolizes a runtime
//! shared with request handling.

pub mod plan;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::database::repositories::VideoRepository;
use crate::scanner::{self, ScanResult};
use crate::{Error, Result};

pub use plan::{Correction, PlannedUpdate, plan_update};

/// Default wall-clock budget for one run.
pub const DEFAULT_TIME_BUDGET: Duration = Duration::from_secs(5 * 60);

/// Catalog rows read per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Catalog rows reconciled between cooperative yields.
pub const DEFAULT_UPDATE_BATCH_SIZE: usize = 100;

/// Tuning knobs for a reconciliation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileOptions {
    pub chunk_size: usize,
    pub update_batch_size: usize,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            update_batch_size: DEFAULT_UPDATE_BATCH_SIZE,
        }
    }
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Catalog rows examined and, where needed, corrected.
    pub processed: u64,
    /// Ids found in the disk index.
    pub on_disk: u64,
    /// Rows whose file columns were refreshed from disk.
    pub updated: u64,
    /// Rows newly flagged as missing from disk.
    pub removed: u64,
    /// Row updates that failed and were skipped.
    pub failed: u64,
    /// Ids with more than one candidate file on disk.
    pub duplicates: u64,
    pub timed_out: bool,
    pub elapsed_secs: f64,
}

/// Wall-clock budget, checked at every phase boundary.
#[derive(Debug, Clone, Copy)]
struct TimeBudget {
    started: Instant,
    budget: Duration,
}

impl TimeBudget {
    fn start(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    fn expired(&self) -> bool {
        self.started.elapsed() >= self.budget
    }

    fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

/// Errors that mean the catalog itself is unreachable, as opposed to one bad row.
fn is_connection_error(err: &Error) -> bool {
    matches!(
        err,
        Error::DatabaseSqlx(
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
        )
    )
}

/// Reconciles the video catalog with the files under the output root.
pub struct Reconciler {
    videos: Arc<dyn VideoRepository>,
    output_root: PathBuf,
    options: ReconcileOptions,
}

impl Reconciler {
    pub fn new(videos: Arc<dyn VideoRepository>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            videos,
            output_root: output_root.into(),
            options: ReconcileOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ReconcileOptions) -> Self {
        self.options = options;
        self
    }

    async fn build_index(&self) -> Result<ScanResult> {
        let root = self.output_root.clone();
        tokio::task::spawn_blocking(move || scanner::scan(&root))
            .await
            .map_err(|e| Error::Other(format!("Filesystem scan task failed: {}", e)))?
    }

    /// Run one reconciliation pass within `time_budget`.
    ///
    /// Running out of budget is not an error: the report comes back with
    /// `timed_out` set. Errors are returned only when the scan root or the
    /// catalog is unusable, after being logged.
    pub async fn reconcile(&self, time_budget: Duration) -> Result<ReconciliationReport> {
        let budget = TimeBudget::start(time_budget);
        let mut report = ReconciliationReport::default();

        info!(
            root = %self.output_root.display(),
            budget_secs = time_budget.as_secs(),
            "Starting catalog reconciliation"
        );

        match self.run(&budget, &mut report).await {
            Ok(()) => {
                report.elapsed_secs = budget.elapsed_secs();
                if report.timed_out {
                    info!(
                        processed = report.processed,
                        updated = report.updated,
                        removed = report.removed,
                        elapsed_secs = report.elapsed_secs,
                        "Reconciliation reached its time budget, remaining rows deferred"
                    );
                } else {
                    info!(
                        processed = report.processed,
                        on_disk = report.on_disk,
                        updated = report.updated,
                        removed = report.removed,
                        failed = report.failed,
                        duplicates = report.duplicates,
                        elapsed_secs = report.elapsed_secs,
                        "Reconciliation complete"
                    );
                }
                Ok(report)
            }
            Err(e) => {
                error!(
                    root = %self.output_root.display(),
                    processed = report.processed,
                    error = %e,
                    "Reconciliation failed"
                );
                Err(e)
            }
        }
    }

    async fn run(&self, budget: &TimeBudget, report: &mut ReconciliationReport) -> Result<()> {
        if budget.expired() {
            report.timed_out = true;
            return Ok(());
        }

        let scan = self.build_index().await?;
        report.on_disk = scan.index.len() as u64;
        report.duplicates = scan.duplicate_count() as u64;

        if budget.expired() {
            report.timed_out = true;
            return Ok(());
        }

        let chunk_size = self.options.chunk_size.max(1);
        let batch_size = self.options.update_batch_size.max(1);
        let mut offset: usize = 0;

        loop {
            if budget.expired() {
                report.timed_out = true;
                return Ok(());
            }

            let rows = self
                .videos
                .list_videos_page(offset as i64, chunk_size as i64)
                .await?;
            if rows.is_empty() {
                break;
            }
            offset += rows.len();

            debug!(offset, rows = rows.len(), "Reconciling catalog chunk");

            // A row counts as processed only once its update has been applied
            for slice in rows.chunks(batch_size) {
                if budget.expired() {
                    report.timed_out = true;
                    return Ok(());
                }
                let queued: Vec<PlannedUpdate> = slice
                    .iter()
                    .filter_map(|video| plan_update(video, scan.index.get(&video.youtube_id)))
                    .collect();
                self.apply_batch(&queued, report).await?;
                report.processed += slice.len() as u64;
                tokio::task::yield_now().await;
            }

            if rows.len() < chunk_size {
                break;
            }
            tokio::task::yield_now().await;
        }

        Ok(())
    }

    async fn apply_batch(
        &self,
        batch: &[PlannedUpdate],
        report: &mut ReconciliationReport,
    ) -> Result<()> {
        for planned in batch {
            match self.videos.apply_file_update(&planned.update).await {
                Ok(()) => match planned.correction {
                    Correction::Found => report.updated += 1,
                    Correction::Missing => report.removed += 1,
                },
                Err(e) if is_connection_error(&e) => return Err(e),
                Err(e) => {
                    warn!(
                        id = planned.update.id,
                        youtube_id = %planned.youtube_id,
                        path = ?planned.update.file_path,
                        error = %e,
                        "Failed to apply reconciliation update, skipping row"
                    );
                    report.failed += 1;
                }
            }
        }
        Ok(())
    }
}
