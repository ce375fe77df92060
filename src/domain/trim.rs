//! Trim Calculator - 边界裁剪计算
//!
//! 所有毫秒值在交给合并工具前统一转为 4 位小数的秒

use super::{RequestVars, TimeSlice};

/// 裁剪指令: `trim <offset> [<duration>]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrimInstruction {
    pub offset_ms: Option<i64>,
    pub duration_ms: Option<i64>,
}

impl TrimInstruction {
    pub fn is_empty(&self) -> bool {
        self.offset_ms.is_none() && self.duration_ms.is_none()
    }

    /// 转换为 sox 的 trim 参数
    pub fn to_args(&self) -> Vec<String> {
        match (self.offset_ms, self.duration_ms) {
            (None, None) => Vec::new(),
            (Some(offset), None) => vec!["trim".to_string(), format_seconds(offset)],
            (Some(offset), Some(duration)) => vec![
                "trim".to_string(),
                format_seconds(offset),
                format_seconds(duration),
            ],
            (None, Some(duration)) => vec![
                "trim".to_string(),
                "0".to_string(),
                format_seconds(duration),
            ],
        }
    }
}

/// 毫秒 -> 秒，固定 4 位小数
pub fn format_seconds(ms: i64) -> String {
    format!("{:.4}", ms as f64 / 1000.0)
}

/// 流式模式下第 `index` 个切片的裁剪
///
/// 首切片裁掉请求起点之前的部分，末切片限制到请求终点，中间切片不裁剪。
pub fn slice_trim(index: usize, slices: &[TimeSlice], rv: &RequestVars) -> TrimInstruction {
    let mut trim = TrimInstruction::default();
    let Some(slice) = slices.get(index) else {
        return trim;
    };

    if index == 0 && rv.start > slice.start {
        let offset = rv.start - slice.start;
        tracing::debug!(offset = %format_seconds(offset), "Trimming first slice");
        trim.offset_ms = Some(offset);
    }

    let request_end = rv.request_end();
    if index == slices.len() - 1 && slice.end > request_end {
        let duration = request_end - rv.start.max(slice.start);
        tracing::debug!(duration = %format_seconds(duration), "Capping last slice");
        trim.duration_ms = Some(duration);
    }

    trim
}

/// 文件模式的整体裁剪
///
/// 只裁首切片的前沿，随后整体限制为请求时长
pub fn bulk_trim(slices: &[TimeSlice], rv: &RequestVars) -> TrimInstruction {
    let offset = slices
        .first()
        .map(|first| (rv.start - first.start).max(0))
        .unwrap_or(0);

    tracing::debug!(
        offset = %format_seconds(offset),
        duration = %format_seconds(rv.duration),
        "Bulk trim"
    );

    TrimInstruction {
        offset_ms: Some(offset),
        duration_ms: Some(rv.duration),
    }
}
