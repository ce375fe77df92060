//! Application State
//!
//! 请求处理器共享的组装处理器与截止时间

use std::path::PathBuf;
use std::sync::Arc;

use crate::application::{
    AudioPipelineBuilder, AudioProbePort, Deadlines, ProcessRunnerPort, SaveAudioHandler,
    SegmentFetcherPort, SliceDiscovery, StreamAudioHandler,
};

/// 应用状态
pub struct AppState {
    pub stream_handler: StreamAudioHandler,
    pub save_handler: SaveAudioHandler,
    /// 每个请求使用的截止时间
    pub deadlines: Deadlines,
}

impl AppState {
    /// 创建应用状态
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        discovery: Arc<SliceDiscovery>,
        fetcher: Arc<dyn SegmentFetcherPort>,
        runner: Arc<dyn ProcessRunnerPort>,
        probe: Arc<dyn AudioProbePort>,
        pipeline: AudioPipelineBuilder,
        output_dir: PathBuf,
        max_concurrent_fetches: usize,
        deadlines: Deadlines,
    ) -> Self {
        Self {
            stream_handler: StreamAudioHandler::new(
                discovery.clone(),
                fetcher.clone(),
                runner.clone(),
                pipeline.clone(),
                max_concurrent_fetches,
            ),
            save_handler: SaveAudioHandler::new(
                discovery,
                fetcher,
                runner,
                probe,
                pipeline,
                output_dir,
                max_concurrent_fetches,
            ),
            deadlines,
        }
    }
}
