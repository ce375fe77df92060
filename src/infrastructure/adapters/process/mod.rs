//! Process Adapters - 外部工具定位与进程图执行

mod runner;
mod tools;

pub use runner::*;
pub use tools::*;
