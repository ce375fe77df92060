//! Mission Audio - 任务音频切片组装服务
//!
//! 架构设计: Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - 请求参数、片段行、时间切片与裁剪计算
//!
//! 应用层 (application/):
//! - Ports: 端口定义（SegmentIndex, SegmentFetcher, AudioProbe, ProcessRunner）
//! - Pipeline: sox / ffmpeg 进程图构建
//! - Commands: 流式与文件模式组装处理器
//!
//! 基础设施层 (infrastructure/):
//! - HTTP: RESTful API + 流式音频响应
//! - Persistence: SQLite 片段索引
//! - Adapters: 片段取回、WAV 探测、外部进程执行

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{load_config, AppConfig};
