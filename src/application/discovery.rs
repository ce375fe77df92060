//! Slice Discovery - 查询片段索引并构建切片

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::application::error::AssemblyError;
use crate::application::ports::SegmentIndexPort;
use crate::domain::{RequestVars, SliceBuilder, TimeSlice};

pub struct SliceDiscovery {
    index: Arc<dyn SegmentIndexPort>,
    clip_dir: PathBuf,
}

impl SliceDiscovery {
    pub fn new(index: Arc<dyn SegmentIndexPort>, clip_dir: impl Into<PathBuf>) -> Self {
        Self {
            index,
            clip_dir: clip_dir.into(),
        }
    }

    pub fn clip_dir(&self) -> &Path {
        &self.clip_dir
    }

    /// 返回覆盖请求窗口的有序切片
    ///
    /// 索引查询失败直接返回错误，不返回部分结果；没有任何片段时返回 `NoData`
    pub async fn discover(&self, rv: &RequestVars) -> Result<Vec<TimeSlice>, AssemblyError> {
        let (start, end) = rv.window();
        let rows = self
            .index
            .find_overlapping(&rv.channels, start, end)
            .await?;
        let row_count = rows.len();

        let slices = SliceBuilder::build(rv.mission, &self.clip_dir, rows);
        if slices.is_empty() {
            tracing::info!(
                mission = rv.mission,
                channels = ?rv.channels,
                start,
                end,
                "No archived audio overlaps request window"
            );
            return Err(AssemblyError::NoData { start, end });
        }

        let covered: i64 = slices
            .iter()
            .map(|s| s.end.min(end) - s.start.max(start))
            .sum();
        if covered < rv.duration {
            // 归档缺口不补静音，输出会比请求短
            tracing::info!(
                mission = rv.mission,
                requested_ms = rv.duration,
                covered_ms = covered,
                "Archive has gaps inside request window"
            );
        }

        tracing::debug!(
            mission = rv.mission,
            rows = row_count,
            slices = slices.len(),
            "Built time slices"
        );

        Ok(slices)
    }
}
