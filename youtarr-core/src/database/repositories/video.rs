//! Video repository.

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::database::models::{VideoDbModel, VideoFileUpdate};
use crate::{Error, Result};

/// Video repository trait.
#[async_trait]
pub trait VideoRepository: Send + Sync {
    async fn get_video(&self, id: i64) -> Result<VideoDbModel>;
    async fn get_video_by_youtube_id(&self, youtube_id: &str) -> Result<VideoDbModel>;
    /// One page of the catalog in primary-key order.
    async fn list_videos_page(&self, offset: i64, limit: i64) -> Result<Vec<VideoDbModel>>;
    /// Insert a video and return its assigned id.
    async fn create_video(&self, video: &VideoDbModel) -> Result<i64>;
    /// Apply a partial file-column update to a single row.
    async fn apply_file_update(&self, update: &VideoFileUpdate) -> Result<()>;
    /// Flag rows as removed upstream and stamp the check time, in one statement.
    async fn mark_platform_removed(&self, ids: &[i64], checked_at_ms: i64) -> Result<u64>;
    /// Stamp the check time only, in one statement.
    async fn mark_platform_checked(&self, ids: &[i64], checked_at_ms: i64) -> Result<u64>;
}

/// SQLx implementation of VideoRepository.
pub struct SqlxVideoRepository {
    pool: SqlitePool,
}

impl SqlxVideoRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VideoRepository for SqlxVideoRepository {
    async fn get_video(&self, id: i64) -> Result<VideoDbModel> {
        sqlx::query_as::<_, VideoDbModel>("SELECT * FROM videos WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Video", id.to_string()))
    }

    async fn get_video_by_youtube_id(&self, youtube_id: &str) -> Result<VideoDbModel> {
        sqlx::query_as::<_, VideoDbModel>("SELECT * FROM videos WHERE youtube_id = ?")
            .bind(youtube_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Video", youtube_id))
    }

    async fn list_videos_page(&self, offset: i64, limit: i64) -> Result<Vec<VideoDbModel>> {
        let videos = sqlx::query_as::<_, VideoDbModel>(
            "SELECT * FROM videos ORDER BY id ASC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(videos)
    }

    async fn create_video(&self, video: &VideoDbModel) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO videos (
                youtube_id, channel_id, channel_name, title, duration_secs,
                published_date, file_path, file_size, audio_file_path, audio_file_size,
                media_type, removed, platform_removed, platform_removed_checked_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&video.youtube_id)
        .bind(&video.channel_id)
        .bind(&video.channel_name)
        .bind(&video.title)
        .bind(video.duration_secs)
        .bind(&video.published_date)
        .bind(&video.file_path)
        .bind(video.file_size)
        .bind(&video.audio_file_path)
        .bind(video.audio_file_size)
        .bind(&video.media_type)
        .bind(video.removed)
        .bind(video.platform_removed)
        .bind(video.platform_removed_checked_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(done.last_insert_rowid()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                Error::validation(format!("Video {} already exists", video.youtube_id)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn apply_file_update(&self, update: &VideoFileUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }

        // Values are bound, never spliced into the SQL.
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE videos SET ");
        let mut set = qb.separated(", ");
        if let Some(path) = &update.file_path {
            set.push("file_path = ").push_bind_unseparated(path.clone());
        }
        if let Some(size) = update.file_size {
            set.push("file_size = ").push_bind_unseparated(size);
        }
        if let Some(path) = &update.audio_file_path {
            set.push("audio_file_path = ")
                .push_bind_unseparated(path.clone());
        }
        if let Some(size) = update.audio_file_size {
            set.push("audio_file_size = ").push_bind_unseparated(size);
        }
        if let Some(removed) = update.removed {
            set.push("removed = ").push_bind_unseparated(removed);
        }
        qb.push(" WHERE id = ").push_bind(update.id);

        qb.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn mark_platform_removed(&self, ids: &[i64], checked_at_ms: i64) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids_json = serde_json::to_string(ids)?;
        let result = sqlx::query(
            r#"
            UPDATE videos
            SET platform_removed = TRUE, platform_removed_checked_at = ?
            WHERE id IN (SELECT value FROM json_each(?))
            "#,
        )
        .bind(checked_at_ms)
        .bind(&ids_json)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn mark_platform_checked(&self, ids: &[i64], checked_at_ms: i64) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids_json = serde_json::to_string(ids)?;
        let result = sqlx::query(
            r#"
            UPDATE videos
            SET platform_removed_checked_at = ?
            WHERE id IN (SELECT value FROM json_each(?))
            "#,
        )
        .bind(checked_at_ms)
        .bind(&ids_json)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
