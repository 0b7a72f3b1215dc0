//! HTTP dispatcher tests against synthetic pipelines.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use bytes::Bytes;
use futures_util::StreamExt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tower::ServiceExt;

use lan_av_streamer::capture::{CaptureHandle, CaptureSource, WorkerState};
use lan_av_streamer::codec::Encoder;
use lan_av_streamer::config::{AppConfig, SourceKind};
use lan_av_streamer::error::{CaptureError, CodecError};
use lan_av_streamer::media::MediaKind;
use lan_av_streamer::pipeline::{Pipeline, Pipelines, RetryPolicy};
use lan_av_streamer::shutdown::{ShutdownReason, ShutdownSignal};
use lan_av_streamer::ui::{router, serve_until_shutdown, AppState};

/// Yields `items` payloads of `size` bytes (forever if `None`), then fails
/// for good
struct FiniteSource {
    items: Option<u64>,
    size: usize,
    interval: Duration,
}

struct FiniteHandle {
    left: Option<u64>,
    size: usize,
    interval: Duration,
}

impl CaptureSource for FiniteSource {
    type Sample = usize;
    type Handle = FiniteHandle;

    fn describe(&self) -> String {
        "finite test source".to_string()
    }

    fn open(&mut self) -> Result<FiniteHandle, CaptureError> {
        Ok(FiniteHandle {
            left: self.items,
            size: self.size,
            interval: self.interval,
        })
    }
}

impl CaptureHandle for FiniteHandle {
    type Sample = usize;

    fn read(&mut self) -> Result<usize, CaptureError> {
        match self.left {
            Some(0) => return Err(CaptureError::UnrecoverableRead("source exhausted".into())),
            Some(ref mut n) => *n -= 1,
            None => {}
        }
        if !self.interval.is_zero() {
            thread::sleep(self.interval);
        }
        Ok(self.size)
    }
}

struct FillEncoder;

impl Encoder for FillEncoder {
    type Input = usize;

    fn encode(&mut self, size: &usize) -> Result<Bytes, CodecError> {
        Ok(Bytes::from(vec![0xAB; *size]))
    }
}

/// Video pipeline whose worker has already stopped, leaving `items` behind.
///
/// The worker gets its own signal so the server's stays clear.
fn stopped_video(items: u64) -> Pipelines {
    let worker_signal = ShutdownSignal::new();
    let pipeline = Pipeline::start(
        MediaKind::Video,
        4,
        FiniteSource {
            items: Some(items),
            size: 16,
            interval: Duration::ZERO,
        },
        FillEncoder,
        worker_signal.clone(),
        RetryPolicy::default(),
    )
    .unwrap();

    let outcome = pipeline.join(Duration::from_secs(2)).expect("worker stops");
    assert!(outcome.is_err());
    assert_eq!(pipeline.state(), WorkerState::Stopped);
    assert_eq!(pipeline.channel().len() as u64, items);
    assert!(worker_signal.is_triggered());

    Pipelines {
        audio: None,
        video: Some(Arc::new(pipeline)),
    }
}

fn synthetic_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.audio.source = SourceKind::Synthetic;
    config.audio.chunk_frames = 480;
    config.video.source = SourceKind::Synthetic;
    config.video.width = 64;
    config.video.height = 48;
    config.video.fps = 30;
    config.server.session_poll_timeout_ms = 100;
    config
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_missing_pipeline_returns_503() {
    let state = Arc::new(AppState::new(
        AppConfig::default(),
        Pipelines::default(),
        ShutdownSignal::new(),
    ));

    for uri in ["/video.stream", "/audio.stream", "/video.mjpeg", "/audio.raw"] {
        let response = router(state.clone()).oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE, "{}", uri);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_video_stream_serves_multipart_jpeg() {
    let shutdown = ShutdownSignal::new();
    let config = synthetic_config();
    let pipelines = Pipelines::start(&config, &shutdown).unwrap();
    let state = Arc::new(AppState::new(config, pipelines.clone(), shutdown.clone()));

    let response = router(state.clone())
        .oneshot(get("/video.stream"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "multipart/x-mixed-replace; boundary=frame"
    );

    let mut body = response.into_body().into_data_stream();
    let first = tokio::time::timeout(Duration::from_secs(3), body.next())
        .await
        .expect("a frame within three seconds")
        .expect("stream still open")
        .unwrap();

    let header_part = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
    assert!(first.starts_with(header_part));
    assert_eq!(&first[header_part.len()..header_part.len() + 2], &[0xFF, 0xD8]);
    assert!(first.ends_with(b"\r\n"));
    assert_eq!(state.sessions.len(), 1);

    // Shutdown ends the body within one poll window
    shutdown.trigger(ShutdownReason::Requested);
    let drained = tokio::time::timeout(Duration::from_secs(3), async {
        while let Some(chunk) = body.next().await {
            chunk.unwrap();
        }
    })
    .await;
    assert!(drained.is_ok(), "stream should end after shutdown");

    let workers = pipelines.clone();
    tokio::task::spawn_blocking(move || workers.join_all(Duration::from_secs(2)))
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_audio_stream_headers_and_status() {
    let shutdown = ShutdownSignal::new();
    let mut config = synthetic_config();
    config.video.enabled = false;
    let pipelines = Pipelines::start(&config, &shutdown).unwrap();
    let state = Arc::new(AppState::new(config, pipelines.clone(), shutdown.clone()));

    let response = router(state.clone())
        .oneshot(get("/audio.stream"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/octet-stream");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=audio.raw"
    );

    let mut body = response.into_body().into_data_stream();
    let chunk = tokio::time::timeout(Duration::from_secs(3), body.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(chunk.len(), 480 * 2);

    let status = router(state.clone())
        .oneshot(get("/api/status"))
        .await
        .unwrap();
    assert_eq!(status.status(), StatusCode::OK);
    let bytes = to_bytes(status.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["pipelines"][0]["kind"], "audio");
    assert_eq!(json["data"]["sessions"].as_array().unwrap().len(), 1);

    let video = router(state.clone())
        .oneshot(get("/video.stream"))
        .await
        .unwrap();
    assert_eq!(video.status(), StatusCode::SERVICE_UNAVAILABLE);

    drop(body);
    shutdown.trigger(ShutdownReason::Requested);
    let workers = pipelines.clone();
    tokio::task::spawn_blocking(move || workers.join_all(Duration::from_secs(2)))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_index_page_describes_streams() {
    let mut config = AppConfig::default();
    config.audio.sample_rate = 44100;
    let state = Arc::new(AppState::new(config, Pipelines::default(), ShutdownSignal::new()));

    let request = Request::builder()
        .uri("/")
        .header(header::HOST, "pi.local:5000")
        .body(Body::empty())
        .unwrap();
    let response = router(state).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let html = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(html.to_vec()).unwrap();
    assert!(html.contains("/video.stream"));
    assert!(html.contains("curl -N http://pi.local:5000/audio.stream | aplay -r 44100 -f S16_LE -c 1 -"));
    assert!(html.contains("not configured"));
    assert!(html.contains("Audio Device: <code>Not Found/Set</code>"));
}

#[tokio::test]
async fn test_stopped_worker_with_empty_channel_returns_503() {
    let state = Arc::new(AppState::new(
        AppConfig::default(),
        stopped_video(0),
        ShutdownSignal::new(),
    ));

    let response = router(state.clone()).oneshot(get("/video.stream")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(state.sessions.len(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stopped_worker_with_leftover_items_is_still_served() {
    let mut config = AppConfig::default();
    config.server.session_poll_timeout_ms = 50;
    let state = Arc::new(AppState::new(config, stopped_video(3), ShutdownSignal::new()));

    let response = router(state.clone()).oneshot(get("/video.stream")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body().into_data_stream();
    let first = tokio::time::timeout(Duration::from_secs(2), body.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let header_part = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
    assert!(first.starts_with(header_part));
    assert_eq!(&first[header_part.len()..first.len() - 2], &[0xAB; 16]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_streams_refused_once_shutdown_is_triggered() {
    let shutdown = ShutdownSignal::new();
    let config = synthetic_config();
    let pipelines = Pipelines::start(&config, &shutdown).unwrap();
    let state = Arc::new(AppState::new(config, pipelines.clone(), shutdown.clone()));

    shutdown.trigger(ShutdownReason::Requested);
    for uri in ["/video.stream", "/audio.stream"] {
        let response = router(state.clone()).oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE, "{}", uri);
    }

    let workers = pipelines.clone();
    tokio::task::spawn_blocking(move || workers.join_all(Duration::from_secs(2)))
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_audio_input_only_disables_audio() {
    let shutdown = ShutdownSignal::new();
    let mut config = synthetic_config();
    config.audio.source = SourceKind::Device;
    let pipelines = Pipelines::start_with_lookup(&config, &shutdown, |_| None).unwrap();
    assert!(pipelines.audio.is_none());

    // Past the startup grace period nothing has failed
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!shutdown.is_triggered());

    let state = Arc::new(AppState::new(config, pipelines.clone(), shutdown.clone()));
    let audio = router(state.clone()).oneshot(get("/audio.stream")).await.unwrap();
    assert_eq!(audio.status(), StatusCode::SERVICE_UNAVAILABLE);

    let video = router(state.clone()).oneshot(get("/video.stream")).await.unwrap();
    assert_eq!(video.status(), StatusCode::OK);
    drop(video);

    shutdown.trigger(ShutdownReason::Requested);
    let workers = pipelines.clone();
    tokio::task::spawn_blocking(move || workers.join_all(Duration::from_secs(2)))
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_viewer_that_stops_reading_cannot_hold_shutdown() {
    let shutdown = ShutdownSignal::new();
    let pipeline = Pipeline::start(
        MediaKind::Audio,
        2,
        FiniteSource {
            items: None,
            size: 256 * 1024,
            interval: Duration::from_millis(2),
        },
        FillEncoder,
        shutdown.clone(),
        RetryPolicy::default(),
    )
    .unwrap();
    let pipelines = Pipelines {
        audio: Some(Arc::new(pipeline)),
        video: None,
    };

    let mut config = AppConfig::default();
    config.server.session_poll_timeout_ms = 100;
    config.server.shutdown_poll_ms = 20;
    config.server.drain_timeout_ms = 300;
    let state = Arc::new(AppState::new(config, pipelines.clone(), shutdown.clone()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(serve_until_shutdown(listener, state.clone()));

    // Request the stream, then never read from the socket
    let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
    client
        .write_all(b"GET /audio.stream HTTP/1.1\r\nHost: test\r\n\r\n")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(state.sessions.len(), 1);

    shutdown.trigger(ShutdownReason::Signal);
    let stopped = tokio::time::timeout(Duration::from_secs(3), server).await;
    assert!(stopped.is_ok(), "server should stop by the drain deadline");
    assert!(stopped.unwrap().unwrap().is_ok());

    drop(client);
    let workers = pipelines.clone();
    tokio::task::spawn_blocking(move || workers.join_all(Duration::from_secs(2)))
        .await
        .unwrap();
}
