//! Request Vars - 请求参数

use serde::{Deserialize, Serialize};

use super::DomainError;

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Aac,
    M4a,
    Ogg,
    /// 不支持的格式统一回退到 MP3
    Mp3,
}

/// 格式选择结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSelection {
    pub format: OutputFormat,
    /// 触发回退时记录原始请求的格式
    pub fallback_from: Option<String>,
}

impl OutputFormat {
    /// 从请求字符串选择输出格式
    ///
    /// 只识别 aac / m4a / ogg，其余一律回退到 MP3 并标记 `fallback_from`
    pub fn select(requested: &str) -> FormatSelection {
        let format = match requested.trim().to_ascii_lowercase().as_str() {
            "aac" => Some(OutputFormat::Aac),
            "m4a" => Some(OutputFormat::M4a),
            "ogg" => Some(OutputFormat::Ogg),
            _ => None,
        };

        match format {
            Some(format) => FormatSelection {
                format,
                fallback_from: None,
            },
            None => {
                tracing::warn!(
                    requested = %requested,
                    "Unsupported output format requested, falling back to mp3"
                );
                FormatSelection {
                    format: OutputFormat::Mp3,
                    fallback_from: Some(requested.to_string()),
                }
            }
        }
    }

    /// 文件扩展名
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Aac | OutputFormat::M4a => "m4a",
            OutputFormat::Ogg => "ogg",
            OutputFormat::Mp3 => "mp3",
        }
    }

    /// HTTP Content-Type
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Aac | OutputFormat::M4a => "audio/mp4",
            OutputFormat::Ogg => "audio/ogg",
            OutputFormat::Mp3 => "audio/mpeg",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Aac => write!(f, "aac"),
            OutputFormat::M4a => write!(f, "m4a"),
            OutputFormat::Ogg => write!(f, "ogg"),
            OutputFormat::Mp3 => write!(f, "mp3"),
        }
    }
}

/// 单次请求的不可变参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestVars {
    pub mission: i64,
    /// 去重并排序后的频道集合
    pub channels: Vec<String>,
    pub format: OutputFormat,
    /// 起始时间（毫秒）
    pub start: i64,
    /// 时长（毫秒）
    pub duration: i64,
}

impl RequestVars {
    pub fn new(
        mission: i64,
        channels: impl IntoIterator<Item = impl Into<String>>,
        format: OutputFormat,
        start: i64,
        duration: i64,
    ) -> Result<Self, DomainError> {
        if start < 0 {
            return Err(DomainError::InvalidStart(start));
        }
        if duration <= 0 {
            return Err(DomainError::InvalidDuration(duration));
        }

        let mut channels: Vec<String> = channels.into_iter().map(Into::into).collect();
        if channels.is_empty() {
            return Err(DomainError::NoChannels);
        }
        // 频道标识会成为本地文件名的一部分
        if let Some(bad) = channels.iter().find(|c| !is_valid_channel(c)) {
            return Err(DomainError::InvalidChannel(bad.clone()));
        }
        channels.sort();
        channels.dedup();

        Ok(Self {
            mission,
            channels,
            format,
            start,
            duration,
        })
    }

    /// 请求窗口结束时间（不含）
    pub fn request_end(&self) -> i64 {
        self.start + self.duration
    }

    /// 半开区间 [start, end)
    pub fn window(&self) -> (i64, i64) {
        (self.start, self.request_end())
    }
}

fn is_valid_channel(channel: &str) -> bool {
    !channel.is_empty()
        && channel
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
