//! Time Slices - 时间切片
//!
//! 把按起始时间排序的片段行构建为对齐的 TimeSlice 序列

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// 片段索引返回的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRow {
    pub start: i64,
    pub end: i64,
    /// 源定位符（URL 或本地路径）
    pub locator: String,
    pub channel: String,
}

/// 某个频道在某个时间窗口内的音频片段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSegment {
    pub start: i64,
    pub end: i64,
    pub locator: String,
    pub channel: String,
    /// 本地落盘路径，取回前确定
    pub local_path: PathBuf,
    materialized: bool,
}

impl AudioSegment {
    pub fn new(row: SegmentRow, mission: i64, clip_dir: &Path) -> Self {
        let local_path = clip_dir.join(Self::local_name(mission, &row.channel, row.start));
        Self {
            start: row.start,
            end: row.end,
            locator: row.locator,
            channel: row.channel,
            local_path,
            materialized: false,
        }
    }

    /// 本地文件名: mission_{mission}_channel_{channel}_{start}.wav
    pub fn local_name(mission: i64, channel: &str, start: i64) -> String {
        format!("mission_{}_channel_{}_{}.wav", mission, channel, start)
    }

    pub fn is_materialized(&self) -> bool {
        self.materialized
    }

    /// 取回完成后调用一次
    pub fn mark_materialized(&mut self) {
        self.materialized = true;
    }
}

/// 跨频道对齐的时间窗口
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSlice {
    pub start: i64,
    pub end: i64,
    /// channel -> segment，按频道排序保证合并输入顺序稳定
    pub segments: BTreeMap<String, AudioSegment>,
}

impl TimeSlice {
    pub fn new(start: i64, end: i64) -> Self {
        Self {
            start,
            end,
            segments: BTreeMap::new(),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.segments.len()
    }

    pub fn local_paths(&self) -> Vec<PathBuf> {
        self.segments.values().map(|s| s.local_path.clone()).collect()
    }

    pub fn duration_ms(&self) -> i64 {
        self.end - self.start
    }
}

/// Slice Builder
///
/// 输入必须按 start 升序。start 超过水位线时开启新切片，
/// 否则按 (start, end) 精确匹配放入已有切片。
pub struct SliceBuilder<'a> {
    mission: i64,
    clip_dir: &'a Path,
    slices: Vec<TimeSlice>,
    by_bounds: HashMap<(i64, i64), usize>,
    last_start: Option<i64>,
}

impl<'a> SliceBuilder<'a> {
    pub fn new(mission: i64, clip_dir: &'a Path) -> Self {
        Self {
            mission,
            clip_dir,
            slices: Vec::new(),
            by_bounds: HashMap::new(),
            last_start: None,
        }
    }

    pub fn push(&mut self, row: SegmentRow) {
        if row.end <= row.start {
            tracing::warn!(
                channel = %row.channel,
                start = row.start,
                end = row.end,
                "Skipping segment with empty interval"
            );
            return;
        }

        if self.last_start.map_or(true, |last| row.start > last) {
            self.by_bounds.insert((row.start, row.end), self.slices.len());
            self.slices.push(TimeSlice::new(row.start, row.end));
            self.last_start = Some(row.start);
        }

        let Some(&index) = self.by_bounds.get(&(row.start, row.end)) else {
            tracing::warn!(
                channel = %row.channel,
                start = row.start,
                end = row.end,
                "Skipping segment not aligned with any slice"
            );
            return;
        };

        let slice = &mut self.slices[index];
        if slice.segments.contains_key(&row.channel) {
            tracing::warn!(
                channel = %row.channel,
                start = row.start,
                "Skipping duplicate segment for channel"
            );
            return;
        }

        let segment = AudioSegment::new(row, self.mission, self.clip_dir);
        slice.segments.insert(segment.channel.clone(), segment);
    }

    pub fn finish(self) -> Vec<TimeSlice> {
        self.slices
    }

    /// 一次性构建
    pub fn build(
        mission: i64,
        clip_dir: &Path,
        rows: impl IntoIterator<Item = SegmentRow>,
    ) -> Vec<TimeSlice> {
        let mut builder = SliceBuilder::new(mission, clip_dir);
        for row in rows {
            builder.push(row);
        }
        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(start: i64, end: i64, channel: &str) -> SegmentRow {
        SegmentRow {
            start,
            end,
            locator: format!("http://archive/{}/{}.wav", channel, start),
            channel: channel.to_string(),
        }
    }

    #[test]
    fn test_one_slice_per_distinct_bounds() {
        let rows = vec![
            row(0, 3000, "a"),
            row(0, 3000, "b"),
            row(3000, 7000, "a"),
            row(3000, 7000, "b"),
            row(7000, 9000, "b"),
        ];
        let slices = SliceBuilder::build(11, Path::new("/clips"), rows);

        assert_eq!(slices.len(), 3);
        assert_eq!((slices[0].start, slices[0].end), (0, 3000));
        assert_eq!((slices[1].start, slices[1].end), (3000, 7000));
        assert_eq!((slices[2].start, slices[2].end), (7000, 9000));
        assert_eq!(slices[0].channel_count(), 2);
        assert_eq!(slices[1].channel_count(), 2);
        assert_eq!(slices[2].channel_count(), 1);

        for slice in &slices {
            for segment in slice.segments.values() {
                assert_eq!((segment.start, segment.end), (slice.start, slice.end));
            }
        }
    }

    #[test]
    fn test_local_path_is_deterministic() {
        let slices = SliceBuilder::build(11, Path::new("/clips"), vec![row(500, 900, "ch7")]);
        let segment = &slices[0].segments["ch7"];
        assert_eq!(
            segment.local_path,
            PathBuf::from("/clips/mission_11_channel_ch7_500.wav")
        );
        assert!(!segment.is_materialized());
    }

    #[test]
    fn test_misaligned_row_is_skipped() {
        let rows = vec![row(0, 3000, "a"), row(0, 2500, "b")];
        let slices = SliceBuilder::build(1, Path::new("/clips"), rows);
        assert_eq!(slices.len(), 1);
        assert!(slices[0].segments.contains_key("a"));
        assert!(!slices[0].segments.contains_key("b"));
    }

    #[test]
    fn test_duplicate_and_empty_rows_are_skipped() {
        let mut first = row(0, 3000, "a");
        first.locator = "first".to_string();
        let rows = vec![first, row(0, 3000, "a"), row(4000, 4000, "b")];
        let slices = SliceBuilder::build(1, Path::new("/clips"), rows);
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].segments["a"].locator, "first");
    }

    #[test]
    fn test_empty_input() {
        let slices = SliceBuilder::build(1, Path::new("/clips"), Vec::new());
        assert!(slices.is_empty());
    }
}
