//! Channel repository.
//!
//! Channels are managed elsewhere; this crate only reads them, apart from the
//! insert used to seed a catalog.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::ChannelDbModel;
use crate::{Error, Result};

/// Channel repository trait.
#[async_trait]
pub trait ChannelRepository: Send + Sync {
    async fn get_channel(&self, channel_id: &str) -> Result<ChannelDbModel>;
    async fn list_enabled_channels(&self) -> Result<Vec<ChannelDbModel>>;
    async fn create_channel(&self, channel: &ChannelDbModel) -> Result<()>;
}

/// SQLx implementation of ChannelRepository.
pub struct SqlxChannelRepository {
    pool: SqlitePool,
}

impl SqlxChannelRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChannelRepository for SqlxChannelRepository {
    async fn get_channel(&self, channel_id: &str) -> Result<ChannelDbModel> {
        sqlx::query_as::<_, ChannelDbModel>("SELECT * FROM channels WHERE channel_id = ?")
            .bind(channel_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Channel", channel_id))
    }

    async fn list_enabled_channels(&self) -> Result<Vec<ChannelDbModel>> {
        // rowid keeps the order stable so grouping output is reproducible
        let channels = sqlx::query_as::<_, ChannelDbModel>(
            "SELECT * FROM channels WHERE enabled = TRUE ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(channels)
    }

    async fn create_channel(&self, channel: &ChannelDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO channels (
                channel_id, display_name, video_quality, sub_folder,
                min_duration_secs, max_duration_secs, title_filter_regex,
                audio_format, enabled
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&channel.channel_id)
        .bind(&channel.display_name)
        .bind(&channel.video_quality)
        .bind(&channel.sub_folder)
        .bind(channel.min_duration_secs)
        .bind(channel.max_duration_secs)
        .bind(&channel.title_filter_regex)
        .bind(&channel.audio_format)
        .bind(channel.enabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
