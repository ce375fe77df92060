//! Segment Fetcher Port - 出站端口
//!
//! 把片段源音频落盘到确定的本地路径

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// 取回错误
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("HTTP {status} fetching {locator}")]
    Status { status: u16, locator: String },

    #[error("Fetch timed out")]
    Timeout,

    #[error("Unsupported locator: {0}")]
    UnsupportedLocator(String),

    #[error("Invalid audio: {0}")]
    InvalidAudio(String),

    #[error("IO error: {0}")]
    IoError(String),
}

/// 取回结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// 本次调用写入了目标文件
    Downloaded { bytes: u64 },
    /// 目标文件已存在，未做任何操作
    AlreadyPresent,
}

/// Segment Fetcher Port
///
/// 实现必须幂等，并且在同一目标路径被并发调用时不能暴露写了一半的文件
#[async_trait]
pub trait SegmentFetcherPort: Send + Sync {
    async fn fetch(&self, locator: &str, target: &Path) -> Result<FetchOutcome, FetchError>;
}
