//! Infrastructure Adapters
//!
//! 六边形架构的适配器实现

pub mod fetcher;
pub mod probe;
pub mod process;

pub use fetcher::*;
pub use probe::*;
pub use process::*;
