//! Video database model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::ms_to_datetime;

/// A downloaded video tracked in the catalog.
///
/// `file_path` being `None` implies `file_size` is `None`; the same holds for
/// the audio pair. `removed` records that the last reconciliation pass found no
/// file on disk; the row itself is never deleted by this crate.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct VideoDbModel {
    pub id: i64,
    /// Platform video id, unique across the catalog.
    pub youtube_id: String,
    pub channel_id: Option<String>,
    pub channel_name: String,
    pub title: String,
    pub duration_secs: Option<i64>,
    pub published_date: Option<String>,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub audio_file_path: Option<String>,
    pub audio_file_size: Option<i64>,
    /// "video" or "audio"
    pub media_type: String,
    pub removed: bool,
    /// The platform reported the video as gone. Terminal once set.
    pub platform_removed: bool,
    /// Unix epoch milliseconds (UTC) of the last upstream existence check.
    pub platform_removed_checked_at: Option<i64>,
}

impl VideoDbModel {
    /// Create a row that has not been inserted yet (`id` is assigned by the store).
    pub fn new(
        youtube_id: impl Into<String>,
        channel_name: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            youtube_id: youtube_id.into(),
            channel_id: None,
            channel_name: channel_name.into(),
            title: title.into(),
            duration_secs: None,
            published_date: None,
            file_path: None,
            file_size: None,
            audio_file_path: None,
            audio_file_size: None,
            media_type: "video".to_string(),
            removed: false,
            platform_removed: false,
            platform_removed_checked_at: None,
        }
    }

    pub fn with_file(mut self, path: impl Into<String>, size: i64) -> Self {
        self.file_path = Some(path.into());
        self.file_size = Some(size);
        self
    }

    pub fn with_audio_file(mut self, path: impl Into<String>, size: i64) -> Self {
        self.audio_file_path = Some(path.into());
        self.audio_file_size = Some(size);
        self
    }

    pub fn platform_checked_at(&self) -> Option<DateTime<Utc>> {
        self.platform_removed_checked_at.map(ms_to_datetime)
    }
}

/// Partial update of a video's file columns.
///
/// `None` leaves the column untouched, so a correction never has to restate
/// values it did not compute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoFileUpdate {
    pub id: i64,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub audio_file_path: Option<String>,
    pub audio_file_size: Option<i64>,
    pub removed: Option<bool>,
}

impl VideoFileUpdate {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// True if the update would not change any column.
    pub fn is_empty(&self) -> bool {
        self.file_path.is_none()
            && self.file_size.is_none()
            && self.audio_file_path.is_none()
            && self.audio_file_size.is_none()
            && self.removed.is_none()
    }

    /// Apply the update to an in-memory copy of the row.
    pub fn apply_to(&self, video: &mut VideoDbModel) {
        if let Some(path) = &self.file_path {
            video.file_path = Some(path.clone());
        }
        if let Some(size) = self.file_size {
            video.file_size = Some(size);
        }
        if let Some(path) = &self.audio_file_path {
            video.audio_file_path = Some(path.clone());
        }
        if let Some(size) = self.audio_file_size {
            video.audio_file_size = Some(size);
        }
        if let Some(removed) = self.removed {
            video.removed = removed;
        }
    }
}
