//! Data Transfer Objects

use serde::{Deserialize, Serialize};

use crate::application::SavedArtifact;

// ============================================================================
// 统一响应结构
// ============================================================================

/// 统一 API 响应格式
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub errno: i32,
    pub error: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    /// 成功响应
    pub fn success(data: T) -> Self {
        Self {
            errno: 0,
            error: String::new(),
            data: Some(data),
        }
    }
}

// ============================================================================
// Audio DTOs
// ============================================================================

/// `GET /api/audio/stream` 查询参数
#[derive(Debug, Deserialize)]
pub struct StreamAudioParams {
    pub mission: i64,
    /// 逗号分隔的频道列表
    pub channels: String,
    #[serde(default)]
    pub format: String,
    pub start: i64,
    pub duration: i64,
}

impl StreamAudioParams {
    pub fn channel_list(&self) -> Vec<String> {
        self.channels
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct SaveAudioRequest {
    pub mission: i64,
    pub channels: Vec<String>,
    #[serde(default)]
    pub format: String,
    pub start: i64,
    pub duration: i64,
}

#[derive(Debug, Serialize)]
pub struct SaveAudioResponse {
    pub path: String,
    pub slices: usize,
    pub warnings: Vec<String>,
}

impl From<SavedArtifact> for SaveAudioResponse {
    fn from(artifact: SavedArtifact) -> Self {
        Self {
            path: artifact.path.display().to_string(),
            slices: artifact.slices,
            warnings: artifact.warnings.iter().map(ToString::to_string).collect(),
        }
    }
}
