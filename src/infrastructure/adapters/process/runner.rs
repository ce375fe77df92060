//! Tokio Process Runner - 执行进程图
//!
//! - 单个 source: 与第一级 chain 之间直接用 OS 管道连接
//! - 多个 source: 依次启动，stdout 在进程内串接后写入第一级 chain 的 stdin
//! - chain: 相邻阶段 stdout -> stdin 用 OS 管道连接
//! - 最后一级的 stdout 复制到调用方 sink（或丢弃）
//!
//! 所有子进程都以 `kill_on_drop` 启动，执行 future 被丢弃（取消、超时、出错）即全部终止。

use async_trait::async_trait;
use futures_util::future::join_all;
use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;

use crate::application::pipeline::{GraphOutput, ProcessGraph, Stage, StageKind};
use crate::application::ports::{PipelineError, ProcessRunnerPort, RunControl};

/// 错误信息中保留的 stderr 行数
const STDERR_TAIL_LINES: usize = 20;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

#[cfg(unix)]
const SIGPIPE: i32 = 13;

fn io_error(e: std::io::Error) -> PipelineError {
    PipelineError::IoError(e.to_string())
}

/// 运行中的阶段
struct RunningStage {
    kind: StageKind,
    child: Child,
    stderr: JoinHandle<String>,
}

impl RunningStage {
    fn spawn(stage: &Stage, stdin: Stdio, stdout: Stdio) -> Result<Self, PipelineError> {
        tracing::info!(stage = %stage.kind, command = %stage.command_line(), "Spawning process");

        let mut child = Command::new(&stage.program)
            .args(&stage.args)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PipelineError::Spawn {
                kind: stage.kind,
                program: stage.program.display().to_string(),
                message: e.to_string(),
            })?;

        let stderr = drain_stderr(stage.kind, child.stderr.take());
        Ok(Self {
            kind: stage.kind,
            child,
            stderr,
        })
    }

    /// 把 stdout 转成下一级进程的 stdin
    fn stdout_as_stdio(&mut self) -> Result<Stdio, PipelineError> {
        let stdout = self
            .child
            .stdout
            .take()
            .ok_or_else(|| PipelineError::IoError(format!("{} stage has no stdout", self.kind)))?;
        stdout.try_into().map_err(io_error)
    }
}

/// 已结束的阶段
struct Finished {
    kind: StageKind,
    status: ExitStatus,
    stderr: String,
    /// 下游已不再读取，由执行器主动终止
    stopped_by_runner: bool,
}

impl Finished {
    fn failed(&self) -> bool {
        if self.status.success() || self.stopped_by_runner {
            return false;
        }
        // 被下游关闭管道终止的阶段不算失败，下游自身的结果决定成败
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if self.status.signal() == Some(SIGPIPE) {
                return false;
            }
        }
        true
    }

    fn into_error(self) -> PipelineError {
        PipelineError::StageFailed {
            kind: self.kind,
            code: self.status.code(),
            stderr: self.stderr,
        }
    }
}

/// 后台读取 stderr，只保留最后几行
fn drain_stderr<R>(kind: StageKind, stderr: Option<R>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(stderr) = stderr else {
            return String::new();
        };
        let mut lines = BufReader::new(stderr).lines();
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(stage = %kind, "{}", line);
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
        Vec::from(tail).join("\n")
    })
}

/// 依次运行各 source，把输出串接写入 `stdin`
///
/// 下游提前关闭管道时终止当前 source 并停止；某个 source 失败时不再启动后续 source。
async fn concat_sources(
    sources: &[Stage],
    mut stdin: ChildStdin,
) -> Result<Vec<Finished>, PipelineError> {
    let mut finished = Vec::with_capacity(sources.len());

    for stage in sources {
        let mut running = RunningStage::spawn(stage, Stdio::null(), Stdio::piped())?;
        let mut stdout = running
            .child
            .stdout
            .take()
            .ok_or_else(|| PipelineError::IoError(format!("{} stage has no stdout", stage.kind)))?;

        let mut stopped_by_runner = false;
        match tokio::io::copy(&mut stdout, &mut stdin).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                tracing::debug!(stage = %stage.kind, "Downstream closed, stopping source");
                let _ = running.child.start_kill();
                stopped_by_runner = true;
            }
            Err(e) => return Err(io_error(e)),
        }
        drop(stdout);

        let status = running.child.wait().await.map_err(io_error)?;
        let done = Finished {
            kind: running.kind,
            status,
            stderr: running.stderr.await.unwrap_or_default(),
            stopped_by_runner,
        };
        let stop = stopped_by_runner || done.failed();
        finished.push(done);
        if stop {
            break;
        }
    }

    // 关闭 stdin，下游读到 EOF
    drop(stdin);
    Ok(finished)
}

/// 最后一级输出复制到 sink
async fn pump_to_sink<R>(
    stdout: &mut R,
    sink: &mut (dyn AsyncWrite + Send + Unpin),
) -> Result<u64, PipelineError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = stdout.read(&mut buf).await.map_err(io_error)?;
        if n == 0 {
            break;
        }
        sink.write_all(&buf[..n])
            .await
            .map_err(|e| PipelineError::SinkClosed(e.to_string()))?;
        total += n as u64;
    }
    sink.flush()
        .await
        .map_err(|e| PipelineError::SinkClosed(e.to_string()))?;
    Ok(total)
}

/// tokio 进程执行器
#[derive(Debug, Default, Clone)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }

    async fn execute(
        &self,
        graph: &ProcessGraph,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, PipelineError> {
        graph.validate().map_err(PipelineError::InvalidGraph)?;

        let mut running: Vec<RunningStage> = Vec::with_capacity(graph.chain.len() + 1);
        let mut upstream: Option<Stdio> = None;

        let concat = graph.sources.len() > 1;
        if let [source] = graph.sources.as_slice() {
            let mut stage = RunningStage::spawn(source, Stdio::null(), Stdio::piped())?;
            upstream = Some(stage.stdout_as_stdio()?);
            running.push(stage);
        }

        let last = graph.chain.len() - 1;
        let mut concat_stdin = None;
        let mut output = None;

        for (i, stage) in graph.chain.iter().enumerate() {
            let stdin = upstream.take().unwrap_or_else(Stdio::piped);
            let stdout = if i < last || graph.output == GraphOutput::Sink {
                Stdio::piped()
            } else {
                Stdio::null()
            };

            let mut spawned = RunningStage::spawn(stage, stdin, stdout)?;
            if i == 0 && concat {
                concat_stdin = spawned.child.stdin.take();
            }
            if i < last {
                upstream = Some(spawned.stdout_as_stdio()?);
            } else if graph.output == GraphOutput::Sink {
                output = spawned.child.stdout.take();
            }
            running.push(spawned);
        }

        let sources: &[Stage] = if concat { &graph.sources } else { &[] };

        let copy = async move {
            match output {
                Some(mut stdout) => pump_to_sink(&mut stdout, sink).await,
                None => Ok(0),
            }
        };
        let feed = async move {
            match concat_stdin {
                Some(stdin) => concat_sources(sources, stdin).await,
                None => Ok(Vec::new()),
            }
        };
        let waits = async {
            Ok::<_, PipelineError>(join_all(running.iter_mut().map(|s| s.child.wait())).await)
        };

        let (bytes, mut finished, statuses) = tokio::try_join!(copy, feed, waits)?;

        // 按管道顺序排列: 串接的 sources 在前
        for (stage, status) in running.into_iter().zip(statuses) {
            finished.push(Finished {
                kind: stage.kind,
                status: status.map_err(io_error)?,
                stderr: stage.stderr.await.unwrap_or_default(),
                stopped_by_runner: false,
            });
        }

        if let Some(failed) = finished.into_iter().find(Finished::failed) {
            tracing::warn!(
                stage = %failed.kind,
                code = ?failed.status.code(),
                stderr = %failed.stderr,
                "Pipeline stage failed"
            );
            return Err(failed.into_error());
        }

        Ok(bytes)
    }
}

#[async_trait]
impl ProcessRunnerPort for TokioProcessRunner {
    async fn run(
        &self,
        graph: &ProcessGraph,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
        ctl: &RunControl,
    ) -> Result<u64, PipelineError> {
        if ctl.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let deadline = async {
            match ctl.timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            result = self.execute(graph, sink) => result,
            _ = ctl.cancel.cancelled() => {
                tracing::info!("Pipeline cancelled, killing stages");
                Err(PipelineError::Cancelled)
            }
            _ = deadline => {
                tracing::warn!(timeout = ?ctl.timeout, "Pipeline deadline exceeded, killing stages");
                Err(PipelineError::Timeout)
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::{Duration, Instant};
    use tokio_util::sync::CancellationToken;

    fn sh(kind: StageKind, script: &str) -> Stage {
        Stage::new(kind, "/bin/sh").args(["-c", script])
    }

    fn graph(sources: Vec<Stage>, chain: Vec<Stage>) -> ProcessGraph {
        ProcessGraph {
            sources,
            chain,
            output: GraphOutput::Sink,
        }
    }

    fn cat() -> Stage {
        Stage::new(StageKind::Transcode, "cat")
    }

    async fn run(graph: &ProcessGraph, ctl: &RunControl) -> (Result<u64, PipelineError>, Vec<u8>) {
        let mut sink = Vec::new();
        let result = TokioProcessRunner::new().run(graph, &mut sink, ctl).await;
        (result, sink)
    }

    struct ClosedSink;

    impl AsyncWrite for ClosedSink {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_single_source_pipes_to_sink() {
        let g = graph(vec![sh(StageKind::Merge, "printf hello")], vec![cat()]);
        let (result, sink) = run(&g, &RunControl::default()).await;
        assert_eq!(result.unwrap(), 5);
        assert_eq!(sink, b"hello");
    }

    #[tokio::test]
    async fn test_multiple_sources_are_concatenated_in_order() {
        let g = graph(
            vec![
                sh(StageKind::Merge, "printf a"),
                sh(StageKind::Merge, "sleep 0.05; printf b"),
                sh(StageKind::Merge, "printf c"),
            ],
            vec![Stage::new(StageKind::Trim, "cat"), cat()],
        );
        let (result, sink) = run(&g, &RunControl::default()).await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(sink, b"abc");
    }

    #[tokio::test]
    async fn test_source_failure_reported_even_if_transcoder_succeeds() {
        let g = graph(
            vec![sh(StageKind::Merge, "printf x; echo 'sox FAIL' >&2; exit 3")],
            vec![cat()],
        );
        let (result, _) = run(&g, &RunControl::default()).await;
        match result.unwrap_err() {
            PipelineError::StageFailed { kind, code, stderr } => {
                assert_eq!(kind, StageKind::Merge);
                assert_eq!(code, Some(3));
                assert!(stderr.contains("sox FAIL"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_source_stops_concatenation() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("third-ran");
        let g = graph(
            vec![
                sh(StageKind::Merge, "printf a"),
                sh(StageKind::Merge, "exit 2"),
                sh(StageKind::Merge, &format!("touch {}", marker.display())),
            ],
            vec![cat()],
        );
        let (result, _) = run(&g, &RunControl::default()).await;
        assert!(matches!(
            result.unwrap_err(),
            PipelineError::StageFailed {
                kind: StageKind::Merge,
                code: Some(2),
                ..
            }
        ));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_chain_failure() {
        let g = graph(
            vec![sh(StageKind::Merge, "printf data")],
            vec![sh(StageKind::Transcode, "cat >/dev/null; exit 4")],
        );
        let (result, _) = run(&g, &RunControl::default()).await;
        assert!(matches!(
            result.unwrap_err(),
            PipelineError::StageFailed {
                kind: StageKind::Transcode,
                code: Some(4),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_downstream_closing_early_is_not_a_failure() {
        let g = graph(
            vec![
                Stage::new(StageKind::Merge, "yes"),
                Stage::new(StageKind::Merge, "yes"),
            ],
            vec![Stage::new(StageKind::Trim, "head").args(["-c", "4"])],
        );
        let (result, sink) = run(&g, &RunControl::default()).await;
        assert_eq!(result.unwrap(), 4);
        assert_eq!(sink, b"y\ny\n");
    }

    #[tokio::test]
    async fn test_discard_output_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.bin");
        let g = ProcessGraph {
            sources: vec![
                sh(StageKind::Merge, "printf 12"),
                sh(StageKind::Merge, "printf 34"),
            ],
            chain: vec![sh(
                StageKind::Transcode,
                &format!("cat > {}", out.display()),
            )],
            output: GraphOutput::Discard,
        };
        let (result, sink) = run(&g, &RunControl::default()).await;
        assert_eq!(result.unwrap(), 0);
        assert!(sink.is_empty());
        assert_eq!(std::fs::read(&out).unwrap(), b"1234");
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let g = graph(
            vec![Stage::new(StageKind::Merge, "/nonexistent/sox")],
            vec![cat()],
        );
        let (result, _) = run(&g, &RunControl::default()).await;
        assert!(matches!(
            result.unwrap_err(),
            PipelineError::Spawn {
                kind: StageKind::Merge,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_invalid_graph() {
        let g = graph(Vec::new(), vec![cat()]);
        let (result, _) = run(&g, &RunControl::default()).await;
        assert!(matches!(result.unwrap_err(), PipelineError::InvalidGraph(_)));
    }

    #[tokio::test]
    async fn test_deadline_kills_stages() {
        let g = graph(vec![sh(StageKind::Merge, "sleep 5")], vec![cat()]);
        let ctl = RunControl::new(CancellationToken::new(), Some(Duration::from_millis(100)));

        let started = Instant::now();
        let (result, _) = run(&g, &ctl).await;
        assert!(matches!(result.unwrap_err(), PipelineError::Timeout));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_cancel_kills_stages() {
        let g = graph(vec![sh(StageKind::Merge, "sleep 5")], vec![cat()]);
        let cancel = CancellationToken::new();
        let ctl = RunControl::new(cancel.clone(), None);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let started = Instant::now();
        let (result, _) = run(&g, &ctl).await;
        assert!(matches!(result.unwrap_err(), PipelineError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_closed_sink() {
        let g = graph(vec![sh(StageKind::Merge, "printf hello")], vec![cat()]);
        let mut sink = ClosedSink;
        let err = TokioProcessRunner::new()
            .run(&g, &mut sink, &RunControl::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::SinkClosed(_)));
    }

    /// 用 ffprobe 读取容器时长（秒）
    async fn media_duration(ffprobe: &std::path::Path, path: &std::path::Path) -> f64 {
        let output = tokio::process::Command::new(ffprobe)
            .args(["-v", "error", "-show_entries", "format=duration"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(path)
            .output()
            .await
            .unwrap();
        assert!(output.status.success());
        String::from_utf8_lossy(&output.stdout).trim().parse().unwrap()
    }

    #[tokio::test]
    async fn test_saved_artifact_matches_requested_duration() {
        use crate::application::{
            AssembleAudio, AudioPipelineBuilder, Deadlines, SaveAudioHandler, SliceDiscovery,
        };
        use crate::domain::OutputFormat;
        use crate::infrastructure::adapters::{
            discover_tools, HttpFetcherConfig, HttpSegmentFetcher, WavProbe,
        };
        use crate::infrastructure::persistence::sqlite::{
            create_pool, run_migrations, DatabaseConfig, SqliteSegmentIndex,
        };
        use crate::test_support::wav_bytes;
        use std::sync::Arc;

        let Ok(tools) = discover_tools(None, None) else {
            eprintln!("sox/ffmpeg not installed, skipping");
            return;
        };
        let ffprobe = tools.ffmpeg.with_file_name("ffprobe");
        if !ffprobe.exists() {
            eprintln!("ffprobe not installed, skipping");
            return;
        }

        const RATE: u32 = 16000;
        let archive = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();

        // 切片 [0, 3000) 有两个频道，[3000, 7000) 只有一个
        let clip = |name: &str, ms: u32| {
            let path = archive.path().join(name);
            std::fs::write(&path, wav_bytes(RATE, 1, RATE * ms / 1000)).unwrap();
            path.display().to_string()
        };
        let a0 = clip("a_0.wav", 3000);
        let b0 = clip("b_0.wav", 3000);
        let a1 = clip("a_3000.wav", 4000);

        let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let index = SqliteSegmentIndex::new(pool);
        index.insert_segment("a", 0, 3000, &a0).await.unwrap();
        index.insert_segment("b", 0, 3000, &b0).await.unwrap();
        index.insert_segment("a", 3000, 7000, &a1).await.unwrap();

        let handler = SaveAudioHandler::new(
            Arc::new(SliceDiscovery::new(Arc::new(index), work.path().join("clips"))),
            Arc::new(HttpSegmentFetcher::new(HttpFetcherConfig::default()).unwrap()),
            Arc::new(TokioProcessRunner::new()),
            Arc::new(WavProbe::new()),
            AudioPipelineBuilder::new(tools),
            work.path(),
            2,
        );
        let cmd = AssembleAudio::from_selection(
            11,
            ["a", "b"],
            OutputFormat::select("m4a"),
            1000,
            5000,
            Deadlines {
                fetch: Some(Duration::from_secs(10)),
                process: Some(Duration::from_secs(60)),
            },
        )
        .unwrap();

        let artifact = handler.handle(cmd, CancellationToken::new()).await.unwrap();
        assert_eq!(artifact.slices, 2);
        assert_eq!(
            artifact.path,
            work.path().join("mission_11_channels_a.b_1000_5000.m4a")
        );

        // 允许一个 AAC 帧（1024 个采样）的误差
        let frame = 1024.0 / RATE as f64;
        let duration = media_duration(&ffprobe, &artifact.path).await;
        assert!(
            (duration - 5.0).abs() <= frame,
            "artifact lasts {}s, expected 5s",
            duration
        );
    }
}

