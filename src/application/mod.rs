//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（SegmentIndex、SegmentFetcher、ProcessRunner、AudioProbe）
//! - pipeline: 进程图构建
//! - discovery / prefetch: 切片发现与片段预取
//! - commands: 组装命令及处理器
//! - error: 应用层错误定义

pub mod commands;
pub mod discovery;
pub mod error;
pub mod pipeline;
pub mod ports;
pub mod prefetch;

// Re-exports
pub use commands::{
    handlers::{PreparedStream, SaveAudioHandler, StreamAudioHandler},
    AssembleAudio, AssemblyWarning, Deadlines, SaveAudioCommand, SavedArtifact,
    StreamAudioCommand, StreamReport,
};

pub use discovery::SliceDiscovery;
pub use error::AssemblyError;
pub use pipeline::{AudioPipelineBuilder, PcmLayout, ProcessGraph, Stage, StageKind, ToolPaths};
pub use prefetch::SlicePrefetcher;

pub use ports::{
    AudioProbePort, FetchError, FetchOutcome, IndexError, PipelineError, ProbeError,
    ProcessRunnerPort, RunControl, SegmentFetcherPort, SegmentIndexPort,
};
