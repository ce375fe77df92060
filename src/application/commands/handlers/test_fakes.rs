//! 处理器测试用的内存替身

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::application::discovery::SliceDiscovery;
use crate::application::pipeline::{
    AudioPipelineBuilder, GraphOutput, PcmLayout, ProcessGraph, ToolPaths,
};
use crate::application::ports::*;
use crate::domain::SegmentRow;

pub fn row(start: i64, end: i64, channel: &str) -> SegmentRow {
    SegmentRow {
        start,
        end,
        locator: format!("http://archive/{}/{}.wav", channel, start),
        channel: channel.to_string(),
    }
}

pub fn pipeline_builder() -> AudioPipelineBuilder {
    AudioPipelineBuilder::new(ToolPaths {
        sox: PathBuf::from("/usr/bin/sox"),
        ffmpeg: PathBuf::from("/usr/bin/ffmpeg"),
    })
}

pub struct FakeIndex {
    rows: Vec<SegmentRow>,
    fail: bool,
}

#[async_trait]
impl SegmentIndexPort for FakeIndex {
    async fn find_overlapping(
        &self,
        channels: &[String],
        window_start: i64,
        window_end: i64,
    ) -> Result<Vec<SegmentRow>, IndexError> {
        if self.fail {
            return Err(IndexError::DatabaseError("database is locked".to_string()));
        }
        Ok(self
            .rows
            .iter()
            .filter(|r| channels.contains(&r.channel))
            .filter(|r| r.end > window_start && r.start < window_end)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct FakeFetcher {
    calls: Mutex<Vec<String>>,
    failing: Mutex<Option<String>>,
}

impl FakeFetcher {
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn fail_locator(&self, locator: &str) {
        *self.failing.lock().unwrap() = Some(locator.to_string());
    }
}

#[async_trait]
impl SegmentFetcherPort for FakeFetcher {
    async fn fetch(&self, locator: &str, _target: &Path) -> Result<FetchOutcome, FetchError> {
        self.calls.lock().unwrap().push(locator.to_string());
        if self.failing.lock().unwrap().as_deref() == Some(locator) {
            return Err(FetchError::Status {
                status: 404,
                locator: locator.to_string(),
            });
        }
        Ok(FetchOutcome::Downloaded { bytes: 44 })
    }
}

/// 记录收到的进程图
///
/// Sink 输出时写入 `[slice-N]`；Discard 输出时在转码阶段的目标路径写一个文件
#[derive(Default)]
pub struct FakeRunner {
    graphs: Mutex<Vec<ProcessGraph>>,
    failures: Mutex<HashMap<usize, PipelineError>>,
    stall: AtomicBool,
}

impl FakeRunner {
    pub fn graphs(&self) -> Vec<ProcessGraph> {
        self.graphs.lock().unwrap().clone()
    }

    pub fn fail_on_call(&self, call: usize, err: PipelineError) {
        self.failures.lock().unwrap().insert(call, err);
    }

    /// 写出部分文件后一直运行，直到被取消
    pub fn stall(&self) {
        self.stall.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProcessRunnerPort for FakeRunner {
    async fn run(
        &self,
        graph: &ProcessGraph,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
        ctl: &RunControl,
    ) -> Result<u64, PipelineError> {
        let call = {
            let mut graphs = self.graphs.lock().unwrap();
            graphs.push(graph.clone());
            graphs.len() - 1
        };

        let target = graph
            .chain
            .last()
            .and_then(|stage| stage.args.last())
            .map(PathBuf::from);

        if let Some(err) = self.failures.lock().unwrap().remove(&call) {
            // 模拟 ffmpeg 失败前已写出部分文件
            if graph.output == GraphOutput::Discard {
                if let Some(target) = target {
                    std::fs::write(target, b"partial").unwrap();
                }
            }
            return Err(err);
        }

        if self.stall.load(Ordering::SeqCst) {
            if let Some(target) = &target {
                std::fs::write(target, b"partial").unwrap();
            }
            ctl.cancel.cancelled().await;
            return Err(PipelineError::Cancelled);
        }

        match graph.output {
            GraphOutput::Sink => {
                let chunk = format!("[slice-{}]", call);
                sink.write_all(chunk.as_bytes()).await.unwrap();
                Ok(chunk.len() as u64)
            }
            GraphOutput::Discard => {
                if let Some(target) = target {
                    std::fs::write(target, b"encoded").unwrap();
                }
                Ok(0)
            }
        }
    }
}

pub struct FakeProbe {
    pub layout: PcmLayout,
    pub probed: Mutex<Vec<PathBuf>>,
}

impl Default for FakeProbe {
    fn default() -> Self {
        Self {
            layout: PcmLayout {
                sample_rate: 8000,
                channels: 1,
            },
            probed: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AudioProbePort for FakeProbe {
    async fn probe_layout(&self, path: &Path) -> Result<PcmLayout, ProbeError> {
        self.probed.lock().unwrap().push(path.to_path_buf());
        Ok(self.layout)
    }
}

pub struct Fakes {
    pub index: Arc<FakeIndex>,
    pub fetcher: Arc<FakeFetcher>,
    pub runner: Arc<FakeRunner>,
    pub probe: Arc<FakeProbe>,
}

impl Fakes {
    pub fn with_rows(rows: Vec<SegmentRow>) -> Self {
        Self::build(FakeIndex { rows, fail: false })
    }

    pub fn failing_index() -> Self {
        Self::build(FakeIndex {
            rows: Vec::new(),
            fail: true,
        })
    }

    fn build(index: FakeIndex) -> Self {
        Self {
            index: Arc::new(index),
            fetcher: Arc::new(FakeFetcher::default()),
            runner: Arc::new(FakeRunner::default()),
            probe: Arc::new(FakeProbe::default()),
        }
    }

    pub fn discovery(&self) -> Arc<SliceDiscovery> {
        Arc::new(SliceDiscovery::new(self.index.clone(), "/clips"))
    }
}
