//! Upstream existence verification with a recheck window.
//!
//! Each row is checked against the platform at most once per window. A row the
//! platform reports as gone is flagged permanently and never checked again.
//! Results are committed in at most two bulk statements per call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::Result;
use crate::config::CoreConfig;
use crate::database::models::VideoDbModel;
use crate::database::repositories::VideoRepository;
use crate::database::time::now_ms;

/// Default recheck window.
pub const DEFAULT_RECHECK_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Asks the platform whether a video is still published.
#[async_trait]
pub trait ExistenceChecker: Send + Sync {
    async fn exists(&self, youtube_id: &str) -> Result<bool>;
}

/// Counts from one verification call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistenceReport {
    /// Rows queried upstream.
    pub checked: usize,
    /// Rows not queried: already removed or checked within the window.
    pub skipped: usize,
    /// Rows newly flagged as removed upstream.
    pub removed: usize,
    /// Rows confirmed still present.
    pub confirmed: usize,
    /// Queries that failed; these rows are left untouched.
    pub failed: usize,
}

/// Decides which rows need an upstream check and commits the results.
pub struct ExistenceVerifier {
    videos: Arc<dyn VideoRepository>,
    checker: Arc<dyn ExistenceChecker>,
    recheck_window: Duration,
}

impl ExistenceVerifier {
    pub fn new(videos: Arc<dyn VideoRepository>, checker: Arc<dyn ExistenceChecker>) -> Self {
        Self {
            videos,
            checker,
            recheck_window: DEFAULT_RECHECK_WINDOW,
        }
    }

    /// Verifier using the configured recheck window.
    pub fn from_config(
        videos: Arc<dyn VideoRepository>,
        checker: Arc<dyn ExistenceChecker>,
        config: &CoreConfig,
    ) -> Self {
        Self::new(videos, checker).with_recheck_window(config.existence_recheck_window())
    }

    pub fn recheck_window(&self) -> Duration {
        self.recheck_window
    }

    pub fn with_recheck_window(mut self, window: Duration) -> Self {
        self.recheck_window = window;
        self
    }

    /// True if `video` should be queried upstream at `now` (epoch ms).
    pub fn needs_check(&self, video: &VideoDbModel, now: i64) -> bool {
        if video.platform_removed {
            return false;
        }
        match video.platform_removed_checked_at {
            None => true,
            Some(checked_at) => {
                let window_ms = i64::try_from(self.recheck_window.as_millis()).unwrap_or(i64::MAX);
                now.saturating_sub(checked_at) >= window_ms
            }
        }
    }

    /// Verify a working set, returning it with flags and timestamps applied.
    pub async fn verify(
        &self,
        videos: Vec<VideoDbModel>,
    ) -> Result<(Vec<VideoDbModel>, ExistenceReport)> {
        self.verify_at(videos, now_ms()).await
    }

    /// Same as [`verify`](Self::verify) with an explicit clock.
    pub async fn verify_at(
        &self,
        mut videos: Vec<VideoDbModel>,
        now: i64,
    ) -> Result<(Vec<VideoDbModel>, ExistenceReport)> {
        let mut report = ExistenceReport::default();

        let eligible: Vec<usize> = videos
            .iter()
            .enumerate()
            .filter(|(_, v)| self.needs_check(v, now))
            .map(|(i, _)| i)
            .collect();
        report.skipped = videos.len() - eligible.len();

        if eligible.is_empty() {
            debug!(skipped = report.skipped, "No videos due for an existence check");
            return Ok((videos, report));
        }

        let checks = eligible.iter().map(|&i| {
            let checker = Arc::clone(&self.checker);
            let youtube_id = videos[i].youtube_id.clone();
            async move {
                let result = checker.exists(&youtube_id).await;
                (youtube_id, result)
            }
        });
        let results = join_all(checks).await;
        report.checked = results.len();

        let mut removed_ids = Vec::new();
        let mut confirmed_ids = Vec::new();
        let mut removed_idx = Vec::new();
        let mut confirmed_idx = Vec::new();

        for (&i, (youtube_id, result)) in eligible.iter().zip(results) {
            match result {
                Ok(true) => {
                    confirmed_ids.push(videos[i].id);
                    confirmed_idx.push(i);
                }
                Ok(false) => {
                    removed_ids.push(videos[i].id);
                    removed_idx.push(i);
                }
                Err(e) => {
                    warn!(
                        id = videos[i].id,
                        youtube_id = %youtube_id,
                        error = %e,
                        "Existence check failed, will retry next window"
                    );
                    report.failed += 1;
                }
            }
        }

        if !removed_ids.is_empty() {
            self.videos.mark_platform_removed(&removed_ids, now).await?;
            for i in removed_idx {
                videos[i].platform_removed = true;
                videos[i].platform_removed_checked_at = Some(now);
            }
        }
        if !confirmed_ids.is_empty() {
            self.videos.mark_platform_checked(&confirmed_ids, now).await?;
            for i in confirmed_idx {
                videos[i].platform_removed_checked_at = Some(now);
            }
        }

        report.removed = removed_ids.len();
        report.confirmed = confirmed_ids.len();

        info!(
            checked = report.checked,
            skipped = report.skipped,
            removed = report.removed,
            confirmed = report.confirmed,
            failed = report.failed,
            "Existence verification complete"
        );

        Ok((videos, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repositories::SqlxVideoRepository;
    use crate::database::{init_pool, run_migrations};
    use crate::Error;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const HOUR_MS: i64 = 60 * 60 * 1000;

    /// Checker with scripted answers and a per-id call counter.
    #[derive(Default)]
    struct FakeChecker {
        gone: Vec<String>,
        failing: Vec<String>,
        calls: Mutex<HashMap<String, usize>>,
    }

    impl FakeChecker {
        fn calls(&self, id: &str) -> usize {
            self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl ExistenceChecker for FakeChecker {
        async fn exists(&self, youtube_id: &str) -> Result<bool> {
            *self
                .calls
                .lock()
                .unwrap()
                .entry(youtube_id.to_string())
                .or_default() += 1;
            if self.failing.iter().any(|id| id == youtube_id) {
                return Err(Error::upstream(youtube_id, "timeout"));
            }
            Ok(!self.gone.iter().any(|id| id == youtube_id))
        }
    }

    async fn setup_repo() -> Arc<SqlxVideoRepository> {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        Arc::new(SqlxVideoRepository::new(pool))
    }

    async fn insert(
        repo: &SqlxVideoRepository,
        youtube_id: &str,
        checked_at: Option<i64>,
    ) -> VideoDbModel {
        let mut video = VideoDbModel::new(youtube_id, "C", "T");
        video.platform_removed_checked_at = checked_at;
        let id = repo.create_video(&video).await.unwrap();
        repo.get_video(id).await.unwrap()
    }

    #[tokio::test]
    async fn test_recheck_window() {
        let repo = setup_repo().await;
        let now = 1_700_000_000_000;
        let fresh = insert(&repo, "fresh", Some(now - 23 * HOUR_MS)).await;
        let stale = insert(&repo, "stale", Some(now - 25 * HOUR_MS)).await;

        let checker = Arc::new(FakeChecker::default());
        let verifier = ExistenceVerifier::new(repo.clone(), checker.clone());
        let (videos, report) = verifier.verify_at(vec![fresh, stale], now).await.unwrap();

        assert_eq!(checker.calls("fresh"), 0);
        assert_eq!(checker.calls("stale"), 1);
        assert_eq!(report.checked, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.confirmed, 1);
        assert_eq!(videos[1].platform_removed_checked_at, Some(now));

        let stored = repo.get_video_by_youtube_id("stale").await.unwrap();
        assert_eq!(stored.platform_removed_checked_at, Some(now));
        assert!(!stored.platform_removed);
    }

    #[tokio::test]
    async fn test_removed_is_terminal() {
        let repo = setup_repo().await;
        let now = 1_700_000_000_000;
        let gone = insert(&repo, "gone", None).await;

        let checker = Arc::new(FakeChecker {
            gone: vec!["gone".into()],
            ..Default::default()
        });
        let verifier = ExistenceVerifier::new(repo.clone(), checker.clone());

        let (videos, report) = verifier.verify_at(vec![gone], now).await.unwrap();
        assert_eq!(report.removed, 1);
        assert!(videos[0].platform_removed);
        assert!(repo.get_video_by_youtube_id("gone").await.unwrap().platform_removed);

        // Far past the window, a removed row is still not queried
        let (_, report) = verifier
            .verify_at(videos, now + 100 * HOUR_MS)
            .await
            .unwrap();
        assert_eq!(report.checked, 0);
        assert_eq!(checker.calls("gone"), 1);
    }

    #[tokio::test]
    async fn test_failed_check_leaves_row_untouched() {
        let repo = setup_repo().await;
        let now = 1_700_000_000_000;
        let flaky = insert(&repo, "flaky", None).await;
        let fine = insert(&repo, "fine", None).await;

        let checker = Arc::new(FakeChecker {
            failing: vec!["flaky".into()],
            ..Default::default()
        });
        let verifier = ExistenceVerifier::new(repo.clone(), checker);
        let (videos, report) = verifier.verify_at(vec![flaky, fine], now).await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.confirmed, 1);
        assert_eq!(videos[0].platform_removed_checked_at, None);
        let stored = repo.get_video_by_youtube_id("flaky").await.unwrap();
        assert_eq!(stored.platform_removed_checked_at, None);
        assert!(!stored.platform_removed);
    }

    #[tokio::test]
    async fn test_configurable_window() {
        let repo = setup_repo().await;
        let now = 1_700_000_000_000;
        let video = insert(&repo, "abc", Some(now - 2 * HOUR_MS)).await;

        let checker = Arc::new(FakeChecker::default());
        let verifier = ExistenceVerifier::new(repo, checker.clone())
            .with_recheck_window(Duration::from_secs(60 * 60));
        verifier.verify_at(vec![video], now).await.unwrap();

        assert_eq!(checker.calls("abc"), 1);
    }

    #[tokio::test]
    async fn test_from_config_uses_recheck_hours() {
        let repo = setup_repo().await;
        let now = 1_700_000_000_000;
        let video = insert(&repo, "abc", Some(now - 3 * HOUR_MS)).await;

        let config = CoreConfig::from_lookup(|key| {
            (key == "EXISTENCE_RECHECK_HOURS").then(|| "2".to_string())
        })
        .unwrap();
        let checker = Arc::new(FakeChecker::default());
        let verifier = ExistenceVerifier::from_config(repo, checker.clone(), &config);
        assert_eq!(verifier.recheck_window(), Duration::from_secs(2 * 60 * 60));

        verifier.verify_at(vec![video], now).await.unwrap();
        assert_eq!(checker.calls("abc"), 1);
    }

    #[tokio::test]
    async fn test_empty_working_set() {
        let repo = setup_repo().await;
        let verifier = ExistenceVerifier::new(repo, Arc::new(FakeChecker::default()));
        let (videos, report) = verifier.verify(Vec::new()).await.unwrap();
        assert!(videos.is_empty());
        assert_eq!(report, ExistenceReport::default());
    }
}
