//! 应用层 - 命令
//!
//! 流式组装与文件组装两种命令

mod audio_commands;

pub mod handlers;

pub use audio_commands::*;
