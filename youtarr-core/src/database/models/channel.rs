//! Channel database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A tracked channel and its per-channel download settings.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ChannelDbModel {
    /// Platform channel id.
    pub channel_id: String,
    pub display_name: String,
    /// Per-channel resolution override (e.g. "720").
    pub video_quality: Option<String>,
    /// Subfolder name without the on-disk prefix. May carry surrounding
    /// whitespace or the global-default sentinel as stored.
    pub sub_folder: Option<String>,
    pub min_duration_secs: Option<i64>,
    pub max_duration_secs: Option<i64>,
    pub title_filter_regex: Option<String>,
    pub audio_format: Option<String>,
    pub enabled: bool,
}

impl ChannelDbModel {
    pub fn new(channel_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            display_name: display_name.into(),
            video_quality: None,
            sub_folder: None,
            min_duration_secs: None,
            max_duration_secs: None,
            title_filter_regex: None,
            audio_format: None,
            enabled: true,
        }
    }

    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.video_quality = Some(quality.into());
        self
    }

    pub fn with_sub_folder(mut self, sub_folder: impl Into<String>) -> Self {
        self.sub_folder = Some(sub_folder.into());
        self
    }
}
