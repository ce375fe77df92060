//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,

    /// 片段索引数据库配置
    #[serde(default)]
    pub database: DatabaseConfig,

    /// 工作目录配置
    #[serde(default)]
    pub storage: StorageConfig,

    /// 片段取回配置
    #[serde(default)]
    pub fetch: FetchConfig,

    /// 外部工具配置
    #[serde(default)]
    pub tools: ToolsConfig,

    /// 组装配置
    #[serde(default)]
    pub assembly: AssemblyConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,

    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5070
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// 获取服务器地址
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// 数据库文件路径
    #[serde(default = "default_db_path")]
    pub path: String,

    /// 最大连接数
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    "data/segments.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// 工作目录配置
///
/// 片段缓存与输出文件都在 `work_dir` 之下，归本服务实例所有
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("mission-audio")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
        }
    }
}

impl StorageConfig {
    /// 下载的片段
    pub fn clip_dir(&self) -> PathBuf {
        self.work_dir.join("clips")
    }

    /// 文件模式的输出
    pub fn output_dir(&self) -> PathBuf {
        self.work_dir.join("output")
    }
}

/// 片段取回配置
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// 单个片段的截止时间（秒）
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    /// 最大并发取回数
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// 落盘前校验音频
    #[serde(default = "default_validate")]
    pub validate: bool,
}

fn default_fetch_timeout() -> u64 {
    60
}

fn default_max_concurrent() -> usize {
    4
}

fn default_validate() -> bool {
    true
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            max_concurrent: default_max_concurrent(),
            validate: default_validate(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// 外部工具配置
///
/// 未设置时在 PATH 中查找
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub sox: Option<PathBuf>,

    #[serde(default)]
    pub ffmpeg: Option<PathBuf>,
}

/// 组装配置
#[derive(Debug, Clone, Deserialize)]
pub struct AssemblyConfig {
    /// 单次合并+转码进程组的截止时间（秒）
    #[serde(default = "default_process_timeout")]
    pub process_timeout_secs: u64,
}

fn default_process_timeout() -> u64 {
    600
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            process_timeout_secs: default_process_timeout(),
        }
    }
}

impl AssemblyConfig {
    pub fn process_timeout(&self) -> Duration {
        Duration::from_secs(self.process_timeout_secs)
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LogConfig {
    /// `RUST_LOG` 未设置时使用的过滤规则
    pub fn filter(&self) -> String {
        format!(
            "{},mission_audio={},tower_http=debug",
            self.level, self.level
        )
    }
}
