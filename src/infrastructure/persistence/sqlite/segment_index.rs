//! SQLite Segment Index

use async_trait::async_trait;
use sqlx::{FromRow, QueryBuilder, Sqlite};

use super::DbPool;
use crate::application::ports::{IndexError, SegmentIndexPort};
use crate::domain::SegmentRow;

/// SQLite Segment Index
pub struct SqliteSegmentIndex {
    pool: DbPool,
}

impl SqliteSegmentIndex {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// 写入一条片段记录，返回行 id
    pub async fn insert_segment(
        &self,
        channel: &str,
        met_start: i64,
        met_end: i64,
        url: &str,
    ) -> Result<i64, IndexError> {
        let result = sqlx::query(
            "INSERT INTO audio_segments (channel_id, met_start, met_end, url) VALUES (?, ?, ?, ?)",
        )
        .bind(channel)
        .bind(met_start)
        .bind(met_end)
        .bind(url)
        .execute(&self.pool)
        .await
        .map_err(|e| IndexError::DatabaseError(e.to_string()))?;

        Ok(result.last_insert_rowid())
    }
}

#[derive(FromRow)]
struct SegmentIndexRow {
    channel_id: String,
    met_start: i64,
    met_end: i64,
    url: String,
}

impl From<SegmentIndexRow> for SegmentRow {
    fn from(row: SegmentIndexRow) -> Self {
        SegmentRow {
            start: row.met_start,
            end: row.met_end,
            locator: row.url,
            channel: row.channel_id,
        }
    }
}

#[async_trait]
impl SegmentIndexPort for SqliteSegmentIndex {
    async fn find_overlapping(
        &self,
        channels: &[String],
        window_start: i64,
        window_end: i64,
    ) -> Result<Vec<SegmentRow>, IndexError> {
        if channels.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT channel_id, met_start, met_end, url FROM audio_segments WHERE met_end > ",
        );
        query.push_bind(window_start);
        query.push(" AND met_start < ");
        query.push_bind(window_end);
        query.push(" AND channel_id IN (");
        let mut separated = query.separated(", ");
        for channel in channels {
            separated.push_bind(channel.clone());
        }
        separated.push_unseparated(")");
        query.push(" ORDER BY met_start, channel_id");

        let rows: Vec<SegmentIndexRow> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| IndexError::DatabaseError(e.to_string()))?;

        tracing::debug!(
            channels = ?channels,
            window_start,
            window_end,
            rows = rows.len(),
            "Segment index query"
        );

        Ok(rows.into_iter().map(SegmentRow::from).collect())
    }
}
