//! Audio Commands - 音频组装命令

use std::path::PathBuf;
use std::time::Duration;

use crate::domain::{FormatSelection, OutputFormat, RequestVars};

/// 调用方给定的截止时间
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadlines {
    /// 单个片段取回
    pub fetch: Option<Duration>,
    /// 单次合并+转码进程组
    pub process: Option<Duration>,
}

/// 非致命的降级信号
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyWarning {
    /// 请求的格式不受支持，已回退到 MP3
    FormatFallback { requested: String },
}

impl std::fmt::Display for AssemblyWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssemblyWarning::FormatFallback { requested } => write!(
                f,
                "unsupported format {:?}, fell back to {}",
                requested,
                OutputFormat::Mp3
            ),
        }
    }
}

/// 组装请求（流式与文件模式共用）
#[derive(Debug, Clone)]
pub struct AssembleAudio {
    pub vars: RequestVars,
    pub warnings: Vec<AssemblyWarning>,
    pub deadlines: Deadlines,
}

impl AssembleAudio {
    pub fn new(vars: RequestVars, deadlines: Deadlines) -> Self {
        Self {
            vars,
            warnings: Vec::new(),
            deadlines,
        }
    }

    /// 从格式选择结果构建，回退时自动附带警告
    pub fn from_selection(
        mission: i64,
        channels: impl IntoIterator<Item = impl Into<String>>,
        selection: FormatSelection,
        start: i64,
        duration: i64,
        deadlines: Deadlines,
    ) -> Result<Self, crate::domain::DomainError> {
        let vars = RequestVars::new(mission, channels, selection.format, start, duration)?;
        let mut cmd = Self::new(vars, deadlines);
        if let Some(requested) = selection.fallback_from {
            cmd.warnings.push(AssemblyWarning::FormatFallback { requested });
        }
        Ok(cmd)
    }
}

/// 流式组装命令
pub type StreamAudioCommand = AssembleAudio;

/// 文件组装命令
pub type SaveAudioCommand = AssembleAudio;

/// 流式组装完成信号
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamReport {
    pub slices: usize,
    pub bytes_written: u64,
    pub warnings: Vec<AssemblyWarning>,
}

/// 文件组装结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedArtifact {
    pub path: PathBuf,
    pub slices: usize,
    pub warnings: Vec<AssemblyWarning>,
}
