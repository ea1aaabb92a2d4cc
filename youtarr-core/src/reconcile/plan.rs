//! Per-row correction planning.

use crate::database::models::{VideoDbModel, VideoFileUpdate};
use crate::scanner::{DiskFile, DiskIndexEntry};

/// What a planned correction does to the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correction {
    /// File columns refreshed from disk and the removed flag cleared.
    Found,
    /// Only the removed flag set; file columns are left as they were.
    Missing,
}

/// A queued correction for one catalog row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUpdate {
    pub youtube_id: String,
    pub correction: Correction,
    pub update: VideoFileUpdate,
}

fn differs(path: &Option<String>, size: Option<i64>, file: &DiskFile) -> bool {
    let disk_path = file.path.to_string_lossy();
    path.as_deref() != Some(&*disk_path) || size != Some(file.size as i64)
}

/// Decide the minimal update that brings `video` in line with `entry`.
///
/// Returns `None` when the row already matches the disk. Every value written
/// comes from the disk state, never from the previous row, so interleaved runs
/// converge.
pub fn plan_update(video: &VideoDbModel, entry: Option<&DiskIndexEntry>) -> Option<PlannedUpdate> {
    let mut update = VideoFileUpdate::new(video.id);

    let Some(entry) = entry else {
        if video.removed {
            return None;
        }
        update.removed = Some(true);
        return Some(PlannedUpdate {
            youtube_id: video.youtube_id.clone(),
            correction: Correction::Missing,
            update,
        });
    };

    let mut changed = video.removed;

    if let Some(file) = &entry.video
        && differs(&video.file_path, video.file_size, file)
    {
        update.file_path = Some(file.path.to_string_lossy().into_owned());
        update.file_size = Some(file.size as i64);
        changed = true;
    }

    if let Some(file) = &entry.audio
        && differs(&video.audio_file_path, video.audio_file_size, file)
    {
        update.audio_file_path = Some(file.path.to_string_lossy().into_owned());
        update.audio_file_size = Some(file.size as i64);
        changed = true;
    }

    if !changed {
        return None;
    }

    update.removed = Some(false);
    Some(PlannedUpdate {
        youtube_id: video.youtube_id.clone(),
        correction: Correction::Found,
        update,
    })
}
