//! WAV Probe - 基于 symphonia 读取音频参数
//!
//! 只探测容器与轨道参数，不解码样本

use async_trait::async_trait;
use std::fs::File;
use std::path::Path;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::application::pipeline::PcmLayout;
use crate::application::ports::{AudioProbePort, ProbeError};

/// 同步探测一个本地音频文件
pub fn probe_file(path: &Path) -> Result<PcmLayout, ProbeError> {
    let file = File::open(path).map_err(|e| ProbeError::IoError(e.to_string()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    hint.with_extension("wav");

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| ProbeError::DecodingError(format!("Probe failed: {}", e)))?;

    let track = probed
        .format
        .default_track()
        .ok_or_else(|| ProbeError::DecodingError("No audio track found".to_string()))?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| ProbeError::DecodingError("Unknown sample rate".to_string()))?;

    let channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .ok_or_else(|| ProbeError::DecodingError("Unknown channel count".to_string()))?;

    Ok(PcmLayout {
        sample_rate,
        channels,
    })
}

/// symphonia 探测器
#[derive(Debug, Default, Clone)]
pub struct WavProbe;

impl WavProbe {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AudioProbePort for WavProbe {
    async fn probe_layout(&self, path: &Path) -> Result<PcmLayout, ProbeError> {
        let path = path.to_path_buf();
        let layout = tokio::task::spawn_blocking(move || probe_file(&path))
            .await
            .map_err(|e| ProbeError::IoError(format!("probe task failed: {}", e)))??;

        tracing::debug!(
            sample_rate = layout.sample_rate,
            channels = layout.channels,
            "Probed PCM layout"
        );
        Ok(layout)
    }
}
