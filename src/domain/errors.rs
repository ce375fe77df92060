//! Domain Errors

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("无效的起始时间: {0}ms")]
    InvalidStart(i64),

    #[error("无效的时长: {0}ms")]
    InvalidDuration(i64),

    #[error("未指定频道")]
    NoChannels,

    #[error("无效的频道标识: {0:?}")]
    InvalidChannel(String),
}
