//! Segment Index Port - 出站端口
//!
//! 片段元数据存储的抽象接口，具体实现在 infrastructure 层（SQLite）

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::SegmentRow;

/// Segment Index 错误
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Segment Index Port
#[async_trait]
pub trait SegmentIndexPort: Send + Sync {
    /// 查询与半开窗口 [window_start, window_end) 相交的片段
    ///
    /// 条件: `met_end > window_start AND met_start < window_end`，
    /// 结果按 start 升序（同一 start 按频道排序）
    async fn find_overlapping(
        &self,
        channels: &[String],
        window_start: i64,
        window_end: i64,
    ) -> Result<Vec<SegmentRow>, IndexError>;
}
