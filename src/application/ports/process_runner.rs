//! Process Runner Port - 进程图执行
//!
//! 执行 `ProcessGraph`：各阶段作为外部进程启动，通过管道串联

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;

use crate::application::pipeline::{ProcessGraph, StageKind};

/// 管道执行错误
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    #[error("Failed to spawn {kind} stage ({program}): {message}")]
    Spawn {
        kind: StageKind,
        program: String,
        message: String,
    },

    #[error("{kind} stage failed (exit code {code:?}): {stderr}")]
    StageFailed {
        kind: StageKind,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Pipeline timed out")]
    Timeout,

    #[error("Pipeline cancelled")]
    Cancelled,

    #[error("Output sink closed: {0}")]
    SinkClosed(String),

    #[error("IO error: {0}")]
    IoError(String),
}

/// 运行控制：取消与截止时间
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    pub cancel: CancellationToken,
    pub timeout: Option<Duration>,
}

impl RunControl {
    pub fn new(cancel: CancellationToken, timeout: Option<Duration>) -> Self {
        Self { cancel, timeout }
    }
}

/// Process Runner Port
#[async_trait]
pub trait ProcessRunnerPort: Send + Sync {
    /// 执行进程图，返回写入 sink 的字节数
    ///
    /// `GraphOutput::Discard` 时不向 sink 写入任何内容。
    /// 取消或超时时必须终止所有仍在运行的阶段。
    async fn run(
        &self,
        graph: &ProcessGraph,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
        ctl: &RunControl,
    ) -> Result<u64, PipelineError>;
}
