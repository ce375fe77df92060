//! Command Handlers 实现
//!
//! 流式组装与文件组装两个处理器

mod save_handler;
mod stream_handler;

#[cfg(test)]
pub(crate) mod test_fakes;

pub use save_handler::*;
pub use stream_handler::*;
