//! Audio Probe Port - 读取本地音频文件的 PCM 参数

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

use crate::application::pipeline::PcmLayout;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),
}

#[async_trait]
pub trait AudioProbePort: Send + Sync {
    async fn probe_layout(&self, path: &Path) -> Result<PcmLayout, ProbeError>;
}
