//! On-demand presence check for a page of catalog rows.
//!
//! Only stored paths are examined. A row with no stored path is left alone;
//! the nightly reconciliation is what locates those files. The removed flag is
//! changed only when every stored path could be stat'ed conclusively, so a
//! permission error or a flaky mount never marks a video as removed.

use std::io::ErrorKind;

use tracing::{debug, warn};

use crate::Result;
use crate::database::models::{VideoDbModel, VideoFileUpdate};
use crate::database::repositories::VideoRepository;

/// Outcome of stat'ing one stored path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathStatus {
    Present(u64),
    Missing,
    Unknown,
}

async fn stat_path(path: &str) -> PathStatus {
    match tokio::fs::metadata(path).await {
        Ok(meta) => PathStatus::Present(meta.len()),
        Err(e) if e.kind() == ErrorKind::NotFound => PathStatus::Missing,
        Err(e) => {
            warn!(path, error = %e, "Could not determine file status");
            PathStatus::Unknown
        }
    }
}

/// Stats stored file paths and derives the minimal row updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileChecker;

impl FileChecker {
    pub fn new() -> Self {
        Self
    }

    /// Check each row's stored files.
    ///
    /// Returns the rows with updates applied in memory, plus the updates to
    /// persist with [`apply_updates`](Self::apply_updates).
    pub async fn check_video_files(
        &self,
        mut videos: Vec<VideoDbModel>,
    ) -> (Vec<VideoDbModel>, Vec<VideoFileUpdate>) {
        let mut updates = Vec::new();

        for video in videos.iter_mut() {
            let mut update = VideoFileUpdate::new(video.id);

            let video_status = match video.file_path.as_deref() {
                Some(path) => Some(stat_path(path).await),
                None => None,
            };
            let audio_status = match video.audio_file_path.as_deref() {
                Some(path) => Some(stat_path(path).await),
                None => None,
            };

            if let Some(PathStatus::Present(size)) = video_status
                && video.file_size != Some(size as i64)
            {
                update.file_size = Some(size as i64);
            }
            if let Some(PathStatus::Present(size)) = audio_status
                && video.audio_file_size != Some(size as i64)
            {
                update.audio_file_size = Some(size as i64);
            }

            let statuses: Vec<PathStatus> = [video_status, audio_status]
                .into_iter()
                .flatten()
                .collect();
            let all_known = statuses.iter().all(|s| *s != PathStatus::Unknown);
            if !statuses.is_empty() && all_known {
                let any_present = statuses
                    .iter()
                    .any(|s| matches!(s, PathStatus::Present(_)));
                if any_present && video.removed {
                    update.removed = Some(false);
                } else if !any_present && !video.removed {
                    update.removed = Some(true);
                }
            }

            if !update.is_empty() {
                debug!(
                    id = video.id,
                    youtube_id = %video.youtube_id,
                    ?update,
                    "File status changed"
                );
                update.apply_to(video);
                updates.push(update);
            }
        }

        (videos, updates)
    }

    /// Persist updates produced by [`check_video_files`](Self::check_video_files).
    pub async fn apply_updates(
        &self,
        repo: &dyn VideoRepository,
        updates: &[VideoFileUpdate],
    ) -> Result<usize> {
        let mut applied = 0;
        for update in updates.iter().filter(|u| !u.is_empty()) {
            repo.apply_file_update(update).await?;
            applied += 1;
        }
        Ok(applied)
    }
}
