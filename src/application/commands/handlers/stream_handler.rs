//! Stream Audio Handler - 流式组装
//!
//! 逐个切片: 等待片段落盘 -> 合并+裁剪 -> 转码 -> 写入 sink

use std::sync::Arc;

use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;

use crate::application::commands::audio_commands::{StreamAudioCommand, StreamReport};
use crate::application::discovery::SliceDiscovery;
use crate::application::error::AssemblyError;
use crate::application::pipeline::AudioPipelineBuilder;
use crate::application::ports::{ProcessRunnerPort, RunControl, SegmentFetcherPort};
use crate::application::prefetch::SlicePrefetcher;
use crate::domain::{slice_trim, TimeSlice};

/// 已完成切片发现、尚未开始输出的流
#[derive(Debug)]
pub struct PreparedStream {
    pub command: StreamAudioCommand,
    pub slices: Vec<TimeSlice>,
}

pub struct StreamAudioHandler {
    discovery: Arc<SliceDiscovery>,
    fetcher: Arc<dyn SegmentFetcherPort>,
    runner: Arc<dyn ProcessRunnerPort>,
    pipeline: AudioPipelineBuilder,
    max_concurrent_fetches: usize,
}

impl StreamAudioHandler {
    pub fn new(
        discovery: Arc<SliceDiscovery>,
        fetcher: Arc<dyn SegmentFetcherPort>,
        runner: Arc<dyn ProcessRunnerPort>,
        pipeline: AudioPipelineBuilder,
        max_concurrent_fetches: usize,
    ) -> Self {
        Self {
            discovery,
            fetcher,
            runner,
            pipeline,
            max_concurrent_fetches,
        }
    }

    /// 只做切片发现
    ///
    /// 让调用方在写出任何字节之前区分 "没有数据" 与其它错误
    pub async fn prepare(&self, cmd: StreamAudioCommand) -> Result<PreparedStream, AssemblyError> {
        let slices = self.discovery.discover(&cmd.vars).await?;
        Ok(PreparedStream {
            command: cmd,
            slices,
        })
    }

    pub async fn stream(
        &self,
        prepared: PreparedStream,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
        cancel: CancellationToken,
    ) -> Result<StreamReport, AssemblyError> {
        let PreparedStream {
            command,
            mut slices,
        } = prepared;
        let rv = &command.vars;

        tracing::info!(
            mission = rv.mission,
            channels = ?rv.channels,
            start = rv.start,
            duration = rv.duration,
            format = %rv.format,
            slices = slices.len(),
            "Streaming audio"
        );

        let mut prefetcher = SlicePrefetcher::new(
            self.fetcher.clone(),
            self.max_concurrent_fetches,
            command.deadlines.fetch,
        );
        let ctl = RunControl::new(cancel.clone(), command.deadlines.process);
        let mut bytes_written = 0u64;

        for index in 0..slices.len() {
            if cancel.is_cancelled() {
                return Err(AssemblyError::Cancelled);
            }

            prefetcher.ready(&mut slices, index, &cancel).await?;

            let trim = slice_trim(index, &slices, rv);
            let graph = self.pipeline.stream_graph(&slices[index], trim, rv.format);
            let written = self.runner.run(&graph, sink, &ctl).await?;
            bytes_written += written;

            tracing::debug!(
                slice = index,
                channels = slices[index].channel_count(),
                bytes = written,
                "Slice streamed"
            );
        }

        tracing::info!(
            mission = rv.mission,
            slices = slices.len(),
            bytes = bytes_written,
            "Stream complete"
        );

        Ok(StreamReport {
            slices: slices.len(),
            bytes_written,
            warnings: command.warnings,
        })
    }

    pub async fn handle(
        &self,
        cmd: StreamAudioCommand,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
        cancel: CancellationToken,
    ) -> Result<StreamReport, AssemblyError> {
        let prepared = self.prepare(cmd).await?;
        self.stream(prepared, sink, cancel).await
    }
}
