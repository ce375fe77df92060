//! Domain Layer - 领域层
//!
//! 纯数据与算法，不涉及 IO:
//! - request: 请求参数与输出格式
//! - slice: 音频片段、时间切片及切片构建
//! - trim: 边界裁剪计算

mod errors;
mod request;
mod slice;
mod trim;

pub use errors::DomainError;
pub use request::{FormatSelection, OutputFormat, RequestVars};
pub use slice::{AudioSegment, SegmentRow, SliceBuilder, TimeSlice};
pub use trim::{bulk_trim, format_seconds, slice_trim, TrimInstruction};
