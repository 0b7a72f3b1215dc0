//! HTTP handlers

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use std::convert::Infallible;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::audio::{list_input_devices, AudioDeviceInfo};
use crate::constants::MJPEG_BOUNDARY;
use crate::media::MediaKind;
use crate::pipeline::PipelineStatus;
use crate::session::{ChannelTransport, SessionStatus, StreamFormat, StreamSession};
use crate::ui::server::AppState;

/// Framed items buffered between a session thread and the response body
const BODY_BUFFER: usize = 4;

/// API response wrapper
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// System status
#[derive(serde::Serialize)]
pub struct SystemStatus {
    pub uptime_seconds: u64,
    pub shutting_down: bool,
    pub pipelines: Vec<PipelineStatus>,
    pub sessions: Vec<SessionStatus>,
}

/// `GET /video.stream`
pub async fn video_stream(State(state): State<Arc<AppState>>) -> Response {
    open_stream(&state, MediaKind::Video, StreamFormat::mjpeg(MJPEG_BOUNDARY), None)
}

/// `GET /audio.stream`
pub async fn audio_stream(State(state): State<Arc<AppState>>) -> Response {
    open_stream(
        &state,
        MediaKind::Audio,
        StreamFormat::Raw,
        Some("attachment; filename=audio.raw"),
    )
}

/// Spawn a session thread for this client and stream its output as the body
fn open_stream(
    state: &Arc<AppState>,
    kind: MediaKind,
    format: StreamFormat,
    disposition: Option<&'static str>,
) -> Response {
    let pipeline = match state.pipelines.get(kind) {
        Some(pipeline) if pipeline.is_available() && !state.shutdown.is_triggered() => pipeline,
        _ => {
            tracing::warn!(%kind, "Stream requested but capture is not running");
            let label = match kind {
                MediaKind::Audio => "Audio",
                MediaKind::Video => "Video",
            };
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                format!(
                    "{} capture failed to start or has stopped. Check server console.",
                    label
                ),
            )
                .into_response();
        }
    };

    let (tx, rx) = mpsc::channel::<Bytes>(BODY_BUFFER);
    let poll = Duration::from_millis(state.config.server.session_poll_timeout_ms);
    let session = StreamSession::new(
        kind,
        pipeline.channel().clone(),
        format.clone(),
        ChannelTransport::new(tx, state.shutdown.clone()),
        state.shutdown.clone(),
    )
    .with_poll_timeout(poll);

    let id = session.id();
    state.sessions.register(id, kind, session.stats());

    let thread_state = state.clone();
    let spawned = thread::Builder::new()
        .name(format!("stream-{}", kind))
        .spawn(move || {
            let report = session.run();
            thread_state.sessions.remove(&id);
            tracing::debug!(
                session = %id,
                end = ?report.end,
                items = report.items_sent,
                bytes = report.bytes_sent,
                "Session finished"
            );
        });

    if let Err(e) = spawned {
        state.sessions.remove(&id);
        tracing::error!(%kind, "Failed to spawn session thread: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to start stream").into_response();
    }

    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (Ok::<_, Infallible>(chunk), rx))
    });

    let mut response = Body::from_stream(stream).into_response();
    let headers = response.headers_mut();
    if let Ok(content_type) = HeaderValue::from_str(&format.response_content_type()) {
        headers.insert(header::CONTENT_TYPE, content_type);
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    if let Some(disposition) = disposition {
        headers.insert(header::CONTENT_DISPOSITION, HeaderValue::from_static(disposition));
    }
    response
}

/// Get system status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<SystemStatus>> {
    let uptime = chrono::Utc::now() - state.started_at;
    let status = SystemStatus {
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        shutting_down: state.shutdown.is_triggered(),
        pipelines: state.pipelines.iter().map(|p| p.status()).collect(),
        sessions: state.sessions.snapshot(),
    };

    Json(ApiResponse::ok(status))
}

/// Get available audio input devices
pub async fn get_devices() -> (StatusCode, Json<ApiResponse<Vec<AudioDeviceInfo>>>) {
    match tokio::task::spawn_blocking(list_input_devices).await {
        Ok(devices) => (StatusCode::OK, Json(ApiResponse::ok(devices))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        ),
    }
}

/// `GET /` status page
pub async fn index(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Html<String> {
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| {
            format!("YOUR_HOST_IP:{}", state.config.server.http_port)
        });

    Html(render_index(&state, &host))
}

fn availability(state: &AppState, kind: MediaKind) -> &'static str {
    match state.pipelines.get(kind) {
        Some(p) if p.is_available() => "running",
        Some(_) => "stopped",
        None => "not configured",
    }
}

fn render_index(state: &AppState, host: &str) -> String {
    let audio = &state.config.audio;
    let video = &state.config.video;
    let audio_device = state
        .pipelines
        .audio
        .as_ref()
        .map(|p| p.source().to_string())
        .unwrap_or_else(|| "Not Found/Set".to_string());

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Live A/V Stream</title>
    <style> body {{ font-family: sans-serif; }} code {{ background-color: #f0f0f0; padding: 2px 5px; border-radius: 3px; }} </style>
</head>
<body>
    <h1>Live Stream Status</h1>

    <h2>Video Feed (MJPEG) &mdash; {video_state}</h2>
    <img src="/video.stream" width="{width}" height="{height}" alt="Live video stream">
    <p>Video Device Index: <code>{video_idx}</code> | Resolution: <code>{width}x{height}</code> | Target FPS: <code>{fps}</code></p>

    <h2>Audio Feed (Raw PCM) &mdash; {audio_state}</h2>
    <p>Raw audio stream URL: <a href="/audio.stream" target="_blank"><code>/audio.stream</code></a></p>
    <p>Audio Device: <code>{audio_device}</code> | Format: <code>{channels} channel(s), {rate} Hz, 16-bit Signed Int (pcm_s16le)</code></p>
    <p>
        <b>Listen using <code>aplay</code>:</b><br>
        <code>curl -N http://{host}/audio.stream | aplay -r {rate} -f S16_LE -c {channels} -</code>
    </p>

    <p>Active viewers: video <code>{video_sessions}</code>, audio <code>{audio_sessions}</code> | <a href="/api/status">JSON status</a></p>
</body>
</html>
"#,
        video_state = availability(state, MediaKind::Video),
        audio_state = availability(state, MediaKind::Audio),
        width = video.width,
        height = video.height,
        fps = video.fps,
        video_idx = video.device_index,
        audio_device = audio_device,
        channels = audio.channels,
        rate = audio.sample_rate,
        host = host,
        video_sessions = state.sessions.count(MediaKind::Video),
        audio_sessions = state.sessions.count(MediaKind::Audio),
    )
}
