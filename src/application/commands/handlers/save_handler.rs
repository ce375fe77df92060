//! Save Audio Handler - 文件模式组装
//!
//! 所有切片落盘后整体执行: 合并 -> 串接 -> 整体裁剪 -> 转码写文件。
//! 先写 `.part` 临时文件，成功后重命名；失败或请求被丢弃时删除。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::application::commands::audio_commands::{SaveAudioCommand, SavedArtifact};
use crate::application::discovery::SliceDiscovery;
use crate::application::error::AssemblyError;
use crate::application::pipeline::AudioPipelineBuilder;
use crate::application::ports::{
    AudioProbePort, ProcessRunnerPort, RunControl, SegmentFetcherPort,
};
use crate::application::prefetch::SlicePrefetcher;
use crate::domain::{bulk_trim, RequestVars};

pub struct SaveAudioHandler {
    discovery: Arc<SliceDiscovery>,
    fetcher: Arc<dyn SegmentFetcherPort>,
    runner: Arc<dyn ProcessRunnerPort>,
    probe: Arc<dyn AudioProbePort>,
    pipeline: AudioPipelineBuilder,
    output_dir: PathBuf,
    max_concurrent_fetches: usize,
}

impl SaveAudioHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        discovery: Arc<SliceDiscovery>,
        fetcher: Arc<dyn SegmentFetcherPort>,
        runner: Arc<dyn ProcessRunnerPort>,
        probe: Arc<dyn AudioProbePort>,
        pipeline: AudioPipelineBuilder,
        output_dir: impl Into<PathBuf>,
        max_concurrent_fetches: usize,
    ) -> Self {
        Self {
            discovery,
            fetcher,
            runner,
            probe,
            pipeline,
            output_dir: output_dir.into(),
            max_concurrent_fetches,
        }
    }

    /// 输出文件名: `mission_{m}_channels_{a.b}_{start}_{duration}.{ext}`
    pub fn artifact_name(rv: &RequestVars) -> String {
        format!(
            "mission_{}_channels_{}_{}_{}.{}",
            rv.mission,
            rv.channels.join("."),
            rv.start,
            rv.duration,
            rv.format.extension()
        )
    }

    pub async fn handle(
        &self,
        cmd: SaveAudioCommand,
        cancel: CancellationToken,
    ) -> Result<SavedArtifact, AssemblyError> {
        let rv = &cmd.vars;
        let mut slices = self.discovery.discover(rv).await?;

        tracing::info!(
            mission = rv.mission,
            channels = ?rv.channels,
            start = rv.start,
            duration = rv.duration,
            format = %rv.format,
            slices = slices.len(),
            "Saving audio"
        );

        let mut prefetcher = SlicePrefetcher::new(
            self.fetcher.clone(),
            self.max_concurrent_fetches,
            cmd.deadlines.fetch,
        );
        for index in 0..slices.len() {
            prefetcher.ready(&mut slices, index, &cancel).await?;
        }
        drop(prefetcher);

        // 串接要求各切片 PCM 参数一致，以第一个片段为准
        let first = slices
            .first()
            .and_then(|s| s.segments.values().next())
            .ok_or_else(|| AssemblyError::internal("first slice has no segments"))?;
        let layout = self.probe.probe_layout(&first.local_path).await?;

        let trim = bulk_trim(&slices, rv);
        let name = Self::artifact_name(rv);
        let final_path = self.output_dir.join(&name);
        let part = PartFile::new(part_path(&self.output_dir, &name, rv.format.extension()));

        let graph = self
            .pipeline
            .bulk_graph(&slices, trim, layout, rv.format, part.path());
        let ctl = RunControl::new(cancel, cmd.deadlines.process);

        let mut discard = tokio::io::sink();
        self.runner.run(&graph, &mut discard, &ctl).await?;
        part.persist(&final_path).await?;

        tracing::info!(
            mission = rv.mission,
            path = %final_path.display(),
            "Audio saved"
        );

        Ok(SavedArtifact {
            path: final_path,
            slices: slices.len(),
            warnings: cmd.warnings,
        })
    }
}

/// 临时文件保留真实扩展名，ffmpeg 不会因此误判容器
fn part_path(dir: &Path, name: &str, ext: &str) -> PathBuf {
    let stem = name.strip_suffix(&format!(".{}", ext)).unwrap_or(name);
    dir.join(format!("{}.{}.part.{}", stem, uuid::Uuid::new_v4(), ext))
}

/// 未完成的输出文件
///
/// 除非 `persist` 成功，否则在丢弃时删除，包括 handler future 被中途丢弃的情况
struct PartFile {
    path: PathBuf,
    persisted: bool,
}

impl PartFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            persisted: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// 重命名到最终路径（覆盖已有文件）
    async fn persist(mut self, target: &Path) -> std::io::Result<()> {
        tokio::fs::rename(&self.path, target).await?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.persisted {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Partial output removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "Failed to remove partial output: {}", e)
            }
        }
    }
}
