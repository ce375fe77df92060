//! Slice Prefetcher - 有界并发的片段预取
//!
//! 取回任务在信号量限定的并发度下运行，并提前一个切片启动，
//! 让下一个切片的下载与当前切片的合并/转码重叠。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;

use crate::application::error::AssemblyError;
use crate::application::ports::{FetchError, FetchOutcome, SegmentFetcherPort};
use crate::domain::TimeSlice;

/// 句柄被丢弃时取回任务随之中止
type FetchHandle = AbortOnDropHandle<Result<FetchOutcome, FetchError>>;

/// 单个片段的取回任务
struct PendingFetch {
    channel: String,
    locator: String,
    handle: FetchHandle,
}

pub struct SlicePrefetcher {
    fetcher: Arc<dyn SegmentFetcherPort>,
    semaphore: Arc<Semaphore>,
    timeout: Option<Duration>,
    /// slice index -> 该切片的取回任务
    pending: HashMap<usize, Vec<PendingFetch>>,
}

impl SlicePrefetcher {
    pub fn new(
        fetcher: Arc<dyn SegmentFetcherPort>,
        max_concurrent: usize,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            fetcher,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            timeout,
            pending: HashMap::new(),
        }
    }

    fn spawn_slice(&mut self, slices: &[TimeSlice], index: usize) {
        let Some(slice) = slices.get(index) else {
            return;
        };
        if self.pending.contains_key(&index) || slice.segments.values().all(|s| s.is_materialized())
        {
            return;
        }

        let fetches = slice
            .segments
            .values()
            .filter(|segment| !segment.is_materialized())
            .map(|segment| {
                let fetcher = self.fetcher.clone();
                let semaphore = self.semaphore.clone();
                let timeout = self.timeout;
                let locator = segment.locator.clone();
                let target = segment.local_path.clone();

                let handle = AbortOnDropHandle::new(tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| FetchError::IoError(e.to_string()))?;

                    let fetch = fetcher.fetch(&locator, &target);
                    match timeout {
                        Some(limit) => tokio::time::timeout(limit, fetch)
                            .await
                            .map_err(|_| FetchError::Timeout)?,
                        None => fetch.await,
                    }
                }));

                PendingFetch {
                    channel: segment.channel.clone(),
                    locator: segment.locator.clone(),
                    handle,
                }
            })
            .collect();

        tracing::debug!(slice = index, "Prefetch started");
        self.pending.insert(index, fetches);
    }

    /// 等待第 `index` 个切片的所有片段落盘，同时启动下一个切片的预取
    ///
    /// 任一片段失败即整个请求失败。
    pub async fn ready(
        &mut self,
        slices: &mut [TimeSlice],
        index: usize,
        cancel: &CancellationToken,
    ) -> Result<(), AssemblyError> {
        self.spawn_slice(slices, index);
        self.spawn_slice(slices, index + 1);

        let Some(fetches) = self.pending.remove(&index) else {
            return Ok(());
        };

        // 提前返回时剩余句柄随迭代器一起丢弃并中止
        for PendingFetch {
            channel,
            locator,
            mut handle,
        } in fetches
        {
            let joined = tokio::select! {
                _ = cancel.cancelled() => return Err(AssemblyError::Cancelled),
                joined = &mut handle => joined,
            };

            let outcome = joined
                .map_err(|e| AssemblyError::internal(format!("fetch task failed: {}", e)))?
                .map_err(|e| AssemblyError::fetch(locator.clone(), e))?;

            tracing::debug!(
                slice = index,
                channel = %channel,
                outcome = ?outcome,
                "Segment ready"
            );

            if let Some(segment) = slices[index].segments.get_mut(&channel) {
                segment.mark_materialized();
            }
        }

        Ok(())
    }
}
