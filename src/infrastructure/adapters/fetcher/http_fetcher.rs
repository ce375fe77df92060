//! HTTP Segment Fetcher - 片段源音频取回
//!
//! 支持的定位符:
//! - `http://` / `https://`: 流式下载
//! - `file://` 或绝对路径: 本地复制
//!
//! 先写 `<target>.<uuid>.part`，校验后重命名到目标路径。
//! 同一目标路径的并发调用通过路径锁串行化。

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::application::ports::{FetchError, FetchOutcome, SegmentFetcherPort};
use crate::infrastructure::adapters::probe::probe_file;

/// 取回器配置
#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    /// 单次请求超时（秒）
    pub timeout_secs: u64,
    /// 落盘前校验是否为可解析的音频
    pub validate: bool,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            validate: true,
        }
    }
}

enum Locator<'a> {
    Http(&'a str),
    Local(PathBuf),
}

impl<'a> Locator<'a> {
    fn parse(locator: &'a str) -> Result<Self, FetchError> {
        if locator.starts_with("http://") || locator.starts_with("https://") {
            return Ok(Locator::Http(locator));
        }
        if let Some(path) = locator.strip_prefix("file://") {
            return Ok(Locator::Local(PathBuf::from(path)));
        }
        if Path::new(locator).is_absolute() {
            return Ok(Locator::Local(PathBuf::from(locator)));
        }
        Err(FetchError::UnsupportedLocator(locator.to_string()))
    }
}

pub struct HttpSegmentFetcher {
    client: Client,
    config: HttpFetcherConfig,
    /// 目标路径 -> 路径锁
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl HttpSegmentFetcher {
    pub fn new(config: HttpFetcherConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FetchError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            config,
            locks: DashMap::new(),
        })
    }

    fn path_lock(&self, target: &Path) -> Arc<Mutex<()>> {
        self.locks
            .entry(target.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// 没有其它等待者时移除路径锁
    fn release_lock(&self, target: &Path) {
        // map 自身持有一份
        self.locks
            .remove_if(target, |_, lock| Arc::strong_count(lock) <= 1);
    }

    async fn download(&self, url: &str, part: &Path) -> Result<u64, FetchError> {
        let response = self.client.get(url).send().await.map_err(map_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                locator: url.to_string(),
            });
        }

        let mut file = tokio::fs::File::create(part)
            .await
            .map_err(|e| FetchError::IoError(e.to_string()))?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest)?;
            file.write_all(&chunk)
                .await
                .map_err(|e| FetchError::IoError(e.to_string()))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| FetchError::IoError(e.to_string()))?;

        Ok(written)
    }

    async fn materialize(&self, locator: &str, target: &Path, part: &Path) -> Result<u64, FetchError> {
        let bytes = match Locator::parse(locator)? {
            Locator::Http(url) => self.download(url, part).await?,
            Locator::Local(source) => tokio::fs::copy(&source, part)
                .await
                .map_err(|e| FetchError::IoError(format!("{}: {}", source.display(), e)))?,
        };

        if self.config.validate {
            let probe_path = part.to_path_buf();
            tokio::task::spawn_blocking(move || probe_file(&probe_path))
                .await
                .map_err(|e| FetchError::IoError(format!("validate task failed: {}", e)))?
                .map_err(|e| FetchError::InvalidAudio(format!("{}: {}", locator, e)))?;
        }

        tokio::fs::rename(part, target)
            .await
            .map_err(|e| FetchError::IoError(e.to_string()))?;

        Ok(bytes)
    }

    async fn fetch_locked(&self, locator: &str, target: &Path) -> Result<FetchOutcome, FetchError> {
        if tokio::fs::try_exists(target).await.unwrap_or(false) {
            return Ok(FetchOutcome::AlreadyPresent);
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::IoError(e.to_string()))?;
        }

        let part = part_path(target);
        match self.materialize(locator, target, &part).await {
            Ok(bytes) => {
                tracing::info!(
                    locator = %locator,
                    target = %target.display(),
                    bytes,
                    "Segment fetched"
                );
                Ok(FetchOutcome::Downloaded { bytes })
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&part).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(part = %part.display(), "Failed to remove part file: {}", rm);
                    }
                }
                tracing::warn!(locator = %locator, "Segment fetch failed: {}", e);
                Err(e)
            }
        }
    }
}

fn map_reqwest(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::NetworkError(e.to_string())
    }
}

fn part_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!("{}.{}.part", name, uuid::Uuid::new_v4()))
}

#[async_trait]
impl SegmentFetcherPort for HttpSegmentFetcher {
    async fn fetch(&self, locator: &str, target: &Path) -> Result<FetchOutcome, FetchError> {
        let lock = self.path_lock(target);
        let guard = lock.lock().await;
        let result = self.fetch_locked(locator, target).await;

        drop(guard);
        drop(lock);
        self.release_lock(target);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::wav_bytes;
    use axum::{routing::get, Router};

    fn fetcher(validate: bool) -> Arc<HttpSegmentFetcher> {
        Arc::new(
            HttpSegmentFetcher::new(HttpFetcherConfig {
                timeout_secs: 5,
                validate,
            })
            .unwrap(),
        )
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    async fn serve_archive() -> String {
        let app = Router::new().route("/a/0.wav", get(|| async { wav_bytes(8000, 1, 80) }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_local_copy_is_idempotent() {
        let src = tempfile::tempdir().unwrap();
        let clips = tempfile::tempdir().unwrap();
        let source = src.path().join("seg.wav");
        std::fs::write(&source, wav_bytes(8000, 1, 80)).unwrap();
        let target = clips.path().join("mission_1_channel_a_0.wav");
        let f = fetcher(true);

        let first = f.fetch(source.to_str().unwrap(), &target).await.unwrap();
        assert_eq!(first, FetchOutcome::Downloaded { bytes: 44 + 160 });

        let locator = format!("file://{}", source.display());
        let second = f.fetch(&locator, &target).await.unwrap();
        assert_eq!(second, FetchOutcome::AlreadyPresent);

        assert_eq!(dir_entries(clips.path()), vec!["mission_1_channel_a_0.wav"]);
        assert!(f.locks.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_fetches_download_once() {
        let src = tempfile::tempdir().unwrap();
        let clips = tempfile::tempdir().unwrap();
        let source = src.path().join("seg.wav");
        std::fs::write(&source, wav_bytes(8000, 1, 8000)).unwrap();
        let target = clips.path().join("seg.wav");
        let f = fetcher(true);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let f = f.clone();
                let locator = source.display().to_string();
                let target = target.clone();
                tokio::spawn(async move { f.fetch(&locator, &target).await.unwrap() })
            })
            .collect();

        let mut downloaded = 0;
        for task in tasks {
            if matches!(task.await.unwrap(), FetchOutcome::Downloaded { .. }) {
                downloaded += 1;
            }
        }
        assert_eq!(downloaded, 1);
        assert_eq!(dir_entries(clips.path()), vec!["seg.wav"]);
    }

    #[tokio::test]
    async fn test_invalid_audio_leaves_nothing_behind() {
        let src = tempfile::tempdir().unwrap();
        let clips = tempfile::tempdir().unwrap();
        let source = src.path().join("seg.wav");
        std::fs::write(&source, b"<html>error page</html>").unwrap();
        let target = clips.path().join("seg.wav");

        let err = fetcher(true)
            .fetch(source.to_str().unwrap(), &target)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidAudio(_)));
        assert!(dir_entries(clips.path()).is_empty());

        // 关闭校验时原样落盘
        let outcome = fetcher(false)
            .fetch(source.to_str().unwrap(), &target)
            .await
            .unwrap();
        assert!(matches!(outcome, FetchOutcome::Downloaded { .. }));
    }

    #[tokio::test]
    async fn test_missing_source_and_unsupported_locator() {
        let clips = tempfile::tempdir().unwrap();
        let target = clips.path().join("seg.wav");
        let f = fetcher(true);

        let err = f.fetch("/nonexistent/seg.wav", &target).await.unwrap_err();
        assert!(matches!(err, FetchError::IoError(_)));

        let err = f.fetch("ftp://archive/seg.wav", &target).await.unwrap_err();
        assert!(matches!(err, FetchError::UnsupportedLocator(_)));
        assert!(dir_entries(clips.path()).is_empty());
    }

    #[tokio::test]
    async fn test_http_download_and_status() {
        let base = serve_archive().await;
        let clips = tempfile::tempdir().unwrap();
        let f = fetcher(true);

        let target = clips.path().join("nested").join("a_0.wav");
        let outcome = f
            .fetch(&format!("{}/a/0.wav", base), &target)
            .await
            .unwrap();
        assert_eq!(outcome, FetchOutcome::Downloaded { bytes: 44 + 160 });
        assert!(target.exists());

        let missing = clips.path().join("b_0.wav");
        let err = f
            .fetch(&format!("{}/b/0.wav", base), &missing)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
        assert!(!missing.exists());
    }
}
