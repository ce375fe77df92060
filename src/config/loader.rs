//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（config.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::AppConfig;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 环境变量前缀
const ENV_PREFIX: &str = "MISSION_AUDIO";

/// 加载应用配置
///
/// # 环境变量示例
/// - `MISSION_AUDIO_SERVER__PORT=8080`
/// - `MISSION_AUDIO_DATABASE__PATH=/data/segments.db`
/// - `MISSION_AUDIO_STORAGE__WORK_DIR=/var/lib/mission-audio`
/// - `MISSION_AUDIO_TOOLS__FFMPEG=/opt/ffmpeg/bin/ffmpeg`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// `config_path` 为 None 时搜索默认配置文件（可不存在）
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 默认值由各结构体的 serde default 提供
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 层级分隔符: __ (双下划线)，环境变量名会被转换为小写
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// 验证配置有效性
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "Server port cannot be 0".to_string(),
        ));
    }

    if config.database.path.is_empty() {
        return Err(ConfigError::ValidationError(
            "Database path cannot be empty".to_string(),
        ));
    }

    if config.fetch.max_concurrent == 0 {
        return Err(ConfigError::ValidationError(
            "fetch.max_concurrent must be at least 1".to_string(),
        ));
    }

    if config.fetch.timeout_secs == 0 || config.assembly.process_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "Timeouts must be at least 1 second".to_string(),
        ));
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Server: {}", config.server.addr());
    tracing::info!("Database: {}", config.database.path);
    tracing::info!("Database Max Connections: {}", config.database.max_connections);
    tracing::info!("Work Directory: {:?}", config.storage.work_dir);
    tracing::info!(
        "Fetch: timeout {}s, max concurrent {}, validate {}",
        config.fetch.timeout_secs,
        config.fetch.max_concurrent,
        config.fetch.validate
    );
    match (&config.tools.sox, &config.tools.ffmpeg) {
        (None, None) => tracing::info!("Tools: from PATH"),
        (sox, ffmpeg) => tracing::info!("Tools: sox {:?}, ffmpeg {:?}", sox, ffmpeg),
    }
    tracing::info!("Process Timeout: {}s", config.assembly.process_timeout_secs);
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}
