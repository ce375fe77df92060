//! 应用层错误定义
//!
//! 单次组装请求的错误分类

use thiserror::Error;

use crate::application::pipeline::StageKind;
use crate::application::ports::{FetchError, IndexError, PipelineError, ProbeError};
use crate::domain::DomainError;

/// 组装错误
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// 请求参数无效
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] DomainError),

    /// 归档中没有与窗口相交的片段
    #[error("No audio archived for window [{start}, {end})")]
    NoData { start: i64, end: i64 },

    /// 片段索引查询失败
    #[error("Segment index error: {0}")]
    Index(#[from] IndexError),

    /// 片段取回失败
    #[error("Failed to fetch segment {locator}: {source}")]
    Fetch {
        locator: String,
        #[source]
        source: FetchError,
    },

    /// 外部工具无法启动
    #[error("Tool unavailable ({program}): {message}")]
    ToolUnavailable { program: String, message: String },

    /// 外部进程非零退出
    #[error("{stage} process failed (exit code {code:?}): {stderr}")]
    ProcessFailed {
        stage: StageKind,
        code: Option<i32>,
        stderr: String,
    },

    /// 超过调用方给定的截止时间
    #[error("{0} timed out")]
    Timeout(&'static str),

    /// 调用方取消
    #[error("Assembly cancelled")]
    Cancelled,

    /// 输出端已关闭
    #[error("Output sink closed: {0}")]
    SinkClosed(String),

    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AssemblyError {
    pub fn fetch(locator: impl Into<String>, source: FetchError) -> Self {
        match source {
            FetchError::Timeout => Self::Timeout("segment fetch"),
            source => Self::Fetch {
                locator: locator.into(),
                source,
            },
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<PipelineError> for AssemblyError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::InvalidGraph(msg) => Self::Internal(msg),
            PipelineError::Spawn {
                program, message, ..
            } => Self::ToolUnavailable { program, message },
            PipelineError::StageFailed { kind, code, stderr } => Self::ProcessFailed {
                stage: kind,
                code,
                stderr,
            },
            PipelineError::Timeout => Self::Timeout("merge/transcode"),
            PipelineError::Cancelled => Self::Cancelled,
            PipelineError::SinkClosed(msg) => Self::SinkClosed(msg),
            PipelineError::IoError(msg) => Self::Io(msg),
        }
    }
}

impl From<std::io::Error> for AssemblyError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
