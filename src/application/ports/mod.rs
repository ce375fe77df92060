//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod audio_probe;
mod process_runner;
mod segment_fetcher;
mod segment_index;

pub use audio_probe::{AudioProbePort, ProbeError};
pub use process_runner::{PipelineError, ProcessRunnerPort, RunControl};
pub use segment_fetcher::{FetchError, FetchOutcome, SegmentFetcherPort};
pub use segment_index::{IndexError, SegmentIndexPort};
