//! Process Graph - 类型化的进程管道
//!
//! 每个阶段（合并、裁剪、转码）都是带独立参数列表的外部进程，
//! 阶段之间通过字节流边连接，不经过 shell 字符串拼接。
//!
//! 结构:
//! - sources: 依次运行，输出被串接（单个 source 时直接用 OS 管道连接）
//! - chain: stdout -> stdin 逐级连接
//! - output: 最后一级写到调用方 sink，或自行写文件

use std::path::{Path, PathBuf};

use crate::domain::{OutputFormat, TimeSlice, TrimInstruction};

/// 阶段类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Merge,
    Trim,
    Concat,
    Transcode,
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageKind::Merge => write!(f, "merge"),
            StageKind::Trim => write!(f, "trim"),
            StageKind::Concat => write!(f, "concat"),
            StageKind::Transcode => write!(f, "transcode"),
        }
    }
}

/// 单个进程阶段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub kind: StageKind,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Stage {
    pub fn new(kind: StageKind, program: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    /// 用于日志的命令行
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// 最后一级的输出去向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphOutput {
    /// 写到调用方提供的 sink
    Sink,
    /// 最后一级自行写文件，stdout 丢弃
    Discard,
}

/// 进程图
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessGraph {
    pub sources: Vec<Stage>,
    pub chain: Vec<Stage>,
    pub output: GraphOutput,
}

impl ProcessGraph {
    pub fn validate(&self) -> Result<(), String> {
        if self.sources.is_empty() {
            return Err("graph has no source stage".to_string());
        }
        if self.chain.is_empty() {
            return Err("graph has no chain stage".to_string());
        }
        Ok(())
    }

    /// 按管道顺序遍历所有阶段
    pub fn stages(&self) -> impl Iterator<Item = &Stage> {
        self.sources.iter().chain(self.chain.iter())
    }
}

/// 外部工具路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub sox: PathBuf,
    pub ffmpeg: PathBuf,
}

/// 无头 PCM 参数（文件模式串接时各切片统一输出此格式）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmLayout {
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmLayout {
    fn to_args(self) -> Vec<String> {
        vec![
            "-r".to_string(),
            self.sample_rate.to_string(),
            "-c".to_string(),
            self.channels.to_string(),
            "-b".to_string(),
            "16".to_string(),
            "-e".to_string(),
            "signed-integer".to_string(),
        ]
    }
}

/// 合并阶段的输出形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutput {
    /// sox 管道格式（`-p`），可附带裁剪
    SoxPipe(TrimInstruction),
    /// 无头 PCM，供串接
    RawPcm(PcmLayout),
}

/// 转码目标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeTarget<'a> {
    Stream,
    File(&'a Path),
}

/// 构建 sox / ffmpeg 进程图
#[derive(Debug, Clone)]
pub struct AudioPipelineBuilder {
    tools: ToolPaths,
}

impl AudioPipelineBuilder {
    pub fn new(tools: ToolPaths) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &ToolPaths {
        &self.tools
    }

    /// 合并切片内所有频道
    ///
    /// 只有一个频道时不加 `-m`，直接透传
    pub fn merge_stage(&self, slice: &TimeSlice, output: MergeOutput) -> Stage {
        let mut stage = Stage::new(StageKind::Merge, &self.tools.sox);
        if slice.channel_count() > 1 {
            stage = stage.arg("-m");
        }
        for path in slice.local_paths() {
            stage = stage.args(["-t", "wav"]).arg(path.display().to_string());
        }

        match output {
            MergeOutput::SoxPipe(trim) => stage.arg("-p").args(trim.to_args()),
            MergeOutput::RawPcm(layout) => stage
                .args(["-t", "raw"])
                .args(layout.to_args())
                .arg("-"),
        }
    }

    /// 对串接后的 PCM 流做整体裁剪
    pub fn trim_stage(&self, layout: PcmLayout, trim: TrimInstruction) -> Stage {
        Stage::new(StageKind::Trim, &self.tools.sox)
            .args(["-t", "raw"])
            .args(layout.to_args())
            .arg("-")
            .arg("-p")
            .args(trim.to_args())
    }

    pub fn transcode_stage(&self, format: OutputFormat, target: TranscodeTarget<'_>) -> Stage {
        let stage = Stage::new(StageKind::Transcode, &self.tools.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-i", "-"]);

        match target {
            TranscodeTarget::Stream => stage.args(stream_codec_args(format)).arg("pipe:1"),
            TranscodeTarget::File(path) => stage
                .args(file_codec_args(format))
                .arg("-y")
                .arg(path.display().to_string()),
        }
    }

    /// 流式模式：单个切片 合并(+裁剪) -> 转码 -> sink
    pub fn stream_graph(
        &self,
        slice: &TimeSlice,
        trim: TrimInstruction,
        format: OutputFormat,
    ) -> ProcessGraph {
        ProcessGraph {
            sources: vec![self.merge_stage(slice, MergeOutput::SoxPipe(trim))],
            chain: vec![self.transcode_stage(format, TranscodeTarget::Stream)],
            output: GraphOutput::Sink,
        }
    }

    /// 文件模式：所有切片 合并 -> 串接 -> 裁剪 -> 转码 -> 文件
    pub fn bulk_graph(
        &self,
        slices: &[TimeSlice],
        trim: TrimInstruction,
        layout: PcmLayout,
        format: OutputFormat,
        target: &Path,
    ) -> ProcessGraph {
        ProcessGraph {
            sources: slices
                .iter()
                .map(|slice| self.merge_stage(slice, MergeOutput::RawPcm(layout)))
                .collect(),
            chain: vec![
                self.trim_stage(layout, trim),
                self.transcode_stage(format, TranscodeTarget::File(target)),
            ],
            output: GraphOutput::Discard,
        }
    }
}

fn stream_codec_args(format: OutputFormat) -> Vec<&'static str> {
    match format {
        // m4a 的 muxer 名为 ipod；管道输出需要分片 moov
        OutputFormat::Aac | OutputFormat::M4a => vec![
            "-c:a",
            "libfdk_aac",
            "-b:a",
            "256k",
            "-movflags",
            "+frag_keyframe+empty_moov",
            "-f",
            "ipod",
        ],
        OutputFormat::Ogg => vec!["-c:a", "libvorbis", "-qscale:a", "6", "-f", "ogg"],
        OutputFormat::Mp3 => vec!["-f", "mp3", "-b:a", "256k"],
    }
}

fn file_codec_args(format: OutputFormat) -> Vec<&'static str> {
    match format {
        OutputFormat::Aac | OutputFormat::M4a => {
            vec!["-strict", "-2", "-c:a", "aac", "-b:a", "96k", "-f", "mp4"]
        }
        OutputFormat::Ogg => vec!["-c:a", "libvorbis", "-qscale:a", "6", "-f", "ogg"],
        OutputFormat::Mp3 => vec!["-f", "mp3", "-b:a", "256k"],
    }
}
