//! Audio Handlers
//!
//! 流式接口先完成切片发现再开始响应，因此 "没有数据" 等错误仍以 JSON 返回；
//! 组装中途失败时响应体以错误结束，客户端看到不完整的传输。
//! 保存接口在客户端断开时取消组装，未完成的输出文件被删除。

use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::Response,
    Json,
};
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

use crate::application::{AssembleAudio, AssemblyError, AssemblyWarning};
use crate::domain::OutputFormat;
use crate::infrastructure::http::dto::{
    ApiResponse, SaveAudioRequest, SaveAudioResponse, StreamAudioParams,
};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

/// 回退格式提示头
pub const FORMAT_FALLBACK_HEADER: &str = "x-audio-format-fallback";

/// 组装任务与响应体之间的管道容量
const STREAM_BUFFER_SIZE: usize = 256 * 1024;

pub async fn stream_audio(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StreamAudioParams>,
) -> Result<Response, ApiError> {
    let cmd = AssembleAudio::from_selection(
        params.mission,
        params.channel_list(),
        OutputFormat::select(&params.format),
        params.start,
        params.duration,
        state.deadlines,
    )
    .map_err(AssemblyError::from)?;

    let format = cmd.vars.format;
    let fallback = cmd.warnings.iter().find_map(|w| match w {
        AssemblyWarning::FormatFallback { requested } => Some(requested.clone()),
    });

    let prepared = state.stream_handler.prepare(cmd).await?;

    let (mut writer, reader) = tokio::io::duplex(STREAM_BUFFER_SIZE);
    let cancel = CancellationToken::new();
    // 响应体被丢弃（客户端断开）即取消组装
    let guard = cancel.clone().drop_guard();
    let (done_tx, done_rx) = oneshot::channel::<Result<(), String>>();

    let task_state = state.clone();
    tokio::spawn(async move {
        let result = task_state
            .stream_handler
            .stream(prepared, &mut writer, cancel)
            .await;
        let _ = writer.shutdown().await;
        drop(writer);

        let result = match result {
            Ok(report) => {
                tracing::info!(
                    slices = report.slices,
                    bytes = report.bytes_written,
                    "Audio stream finished"
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Audio stream aborted: {}", e);
                Err(e.to_string())
            }
        };
        let _ = done_tx.send(result);
    });

    let trailer = futures_util::stream::once(async move {
        match done_rx.await {
            Ok(Ok(())) => None::<Result<Bytes, std::io::Error>>,
            Ok(Err(msg)) => Some(Err(std::io::Error::new(std::io::ErrorKind::Other, msg))),
            Err(_) => Some(Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "assembly task ended unexpectedly",
            ))),
        }
    })
    .filter_map(futures_util::future::ready);

    let body = ReaderStream::new(reader)
        .chain(trailer)
        .map(move |chunk: Result<Bytes, std::io::Error>| {
            let _keep_alive = &guard;
            chunk
        });

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, format.content_type())
        .body(Body::from_stream(body))
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    if let Some(requested) = fallback {
        if let Ok(value) = HeaderValue::from_str(&requested) {
            response.headers_mut().insert(FORMAT_FALLBACK_HEADER, value);
        }
    }

    Ok(response)
}

pub async fn save_audio(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SaveAudioRequest>,
) -> Result<Json<ApiResponse<SaveAudioResponse>>, ApiError> {
    let cmd = AssembleAudio::from_selection(
        req.mission,
        req.channels,
        OutputFormat::select(&req.format),
        req.start,
        req.duration,
        state.deadlines,
    )
    .map_err(AssemblyError::from)?;

    // 客户端断开时 axum 丢弃本 future，守卫随之取消组装
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let artifact = state.save_handler.handle(cmd, cancel).await?;

    Ok(Json(ApiResponse::success(artifact.into())))
}
