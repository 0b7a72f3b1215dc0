//! Per-client stream sessions
//!
//! A [`StreamSession`] pulls items from a shared channel and forwards them,
//! framed for its stream, to one client until the client goes away or the
//! process shuts down. Sessions never retry or replay: the stream is live.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::buffer::SharedChannel;
use crate::constants::SESSION_POLL_TIMEOUT_MS;
use crate::error::ClientDisconnected;
use crate::media::{MediaItem, MediaKind};
use crate::shutdown::ShutdownSignal;

/// Pause between attempts to write into a full response body
const SEND_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Where a session writes its framed output
pub trait Transport: Send {
    /// Write one framed item; an error means the client is gone
    fn send(&mut self, frame: Bytes) -> Result<(), ClientDisconnected>;

    /// Whether the client is still there, checked between items
    fn is_open(&self) -> bool {
        true
    }
}

/// Feeds an HTTP response body through a tokio channel.
///
/// The body stream owns the receiver; when the client disconnects hyper
/// drops the body and every later send fails. A client that stays
/// connected but stops reading fills the channel; `send` then waits for
/// room, giving up once shutdown is triggered.
pub struct ChannelTransport {
    tx: mpsc::Sender<Bytes>,
    shutdown: ShutdownSignal,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::Sender<Bytes>, shutdown: ShutdownSignal) -> Self {
        Self { tx, shutdown }
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, frame: Bytes) -> Result<(), ClientDisconnected> {
        let mut frame = frame;
        loop {
            match self.tx.try_send(frame) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Closed(_)) => return Err(ClientDisconnected),
                Err(TrySendError::Full(back)) => {
                    if self.shutdown.is_triggered() {
                        return Err(ClientDisconnected);
                    }
                    frame = back;
                    thread::sleep(SEND_RETRY_INTERVAL);
                }
            }
        }
    }

    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Wire framing for one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFormat {
    /// Bare payload bytes, back to back
    Raw,
    /// `multipart/x-mixed-replace` parts with a fixed boundary
    Multipart {
        boundary: String,
        content_type: String,
    },
}

impl StreamFormat {
    pub fn mjpeg(boundary: impl Into<String>) -> Self {
        StreamFormat::Multipart {
            boundary: boundary.into(),
            content_type: "image/jpeg".to_string(),
        }
    }

    /// `Content-Type` of the whole HTTP response
    pub fn response_content_type(&self) -> String {
        match self {
            StreamFormat::Raw => "application/octet-stream".to_string(),
            StreamFormat::Multipart { boundary, .. } => {
                format!("multipart/x-mixed-replace; boundary={}", boundary)
            }
        }
    }

    /// Frame one item for the wire
    pub fn frame(&self, item: &MediaItem) -> Bytes {
        match self {
            StreamFormat::Raw => item.payload().clone(),
            StreamFormat::Multipart {
                boundary,
                content_type,
            } => {
                let header = format!("--{}\r\nContent-Type: {}\r\n\r\n", boundary, content_type);
                let mut part = BytesMut::with_capacity(header.len() + item.len() + 2);
                part.put_slice(header.as_bytes());
                part.put_slice(item.payload());
                part.put_slice(b"\r\n");
                part.freeze()
            }
        }
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEnd {
    ClientDisconnected,
    Shutdown,
}

/// Live counters for one session
#[derive(Debug, Default)]
pub struct SessionStats {
    items_sent: AtomicU64,
    bytes_sent: AtomicU64,
}

impl SessionStats {
    pub fn items_sent(&self) -> u64 {
        self.items_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }
}

/// Summary returned when a session ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub end: SessionEnd,
    pub items_sent: u64,
    pub bytes_sent: u64,
}

/// One viewer's pull loop over a shared channel
pub struct StreamSession<T: Transport> {
    id: Uuid,
    kind: MediaKind,
    channel: SharedChannel<MediaItem>,
    format: StreamFormat,
    transport: T,
    shutdown: ShutdownSignal,
    poll_timeout: Duration,
    stats: Arc<SessionStats>,
}

impl<T: Transport> StreamSession<T> {
    pub fn new(
        kind: MediaKind,
        channel: SharedChannel<MediaItem>,
        format: StreamFormat,
        transport: T,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            channel,
            format,
            transport,
            shutdown,
            poll_timeout: Duration::from_millis(SESSION_POLL_TIMEOUT_MS),
            stats: Arc::new(SessionStats::default()),
        }
    }

    /// How long to wait on an empty channel before re-checking shutdown
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn stats(&self) -> Arc<SessionStats> {
        self.stats.clone()
    }

    /// Forward items until the client disconnects or shutdown is triggered
    pub fn run(mut self) -> SessionReport {
        tracing::info!(session = %self.id, kind = %self.kind, "Client connected");

        let end = loop {
            if self.shutdown.is_triggered() {
                break SessionEnd::Shutdown;
            }
            if !self.transport.is_open() {
                break SessionEnd::ClientDisconnected;
            }

            let Some(item) = self.channel.pop(self.poll_timeout) else {
                continue;
            };

            let frame = self.format.frame(&item);
            let len = frame.len() as u64;
            if self.transport.send(frame).is_err() {
                if self.shutdown.is_triggered() {
                    break SessionEnd::Shutdown;
                }
                break SessionEnd::ClientDisconnected;
            }
            self.stats.items_sent.fetch_add(1, Ordering::Relaxed);
            self.stats.bytes_sent.fetch_add(len, Ordering::Relaxed);
        };

        match end {
            SessionEnd::Shutdown => {
                tracing::info!(session = %self.id, kind = %self.kind, "Capture stopped, closing stream for client")
            }
            SessionEnd::ClientDisconnected => {
                tracing::info!(session = %self.id, kind = %self.kind, "Client disconnected")
            }
        }

        SessionReport {
            end,
            items_sent: self.stats.items_sent(),
            bytes_sent: self.stats.bytes_sent(),
        }
    }
}

/// Registry entry for an active session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub kind: MediaKind,
    pub started_at: DateTime<Utc>,
    pub stats: Arc<SessionStats>,
}

/// Serializable snapshot of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub id: Uuid,
    pub kind: MediaKind,
    pub started_at: DateTime<Utc>,
    pub items_sent: u64,
    pub bytes_sent: u64,
}

/// Active sessions, keyed by session id
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<Uuid, SessionInfo>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: Uuid, kind: MediaKind, stats: Arc<SessionStats>) {
        self.sessions.insert(
            id,
            SessionInfo {
                kind,
                started_at: Utc::now(),
                stats,
            },
        );
    }

    pub fn remove(&self, id: &Uuid) -> Option<SessionInfo> {
        self.sessions.remove(id).map(|(_, info)| info)
    }

    pub fn count(&self, kind: MediaKind) -> usize {
        self.sessions.iter().filter(|s| s.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn snapshot(&self) -> Vec<SessionStatus> {
        let mut sessions: Vec<SessionStatus> = self
            .sessions
            .iter()
            .map(|entry| SessionStatus {
                id: *entry.key(),
                kind: entry.kind,
                started_at: entry.started_at,
                items_sent: entry.stats.items_sent(),
                bytes_sent: entry.stats.bytes_sent(),
            })
            .collect();
        sessions.sort_by_key(|s| s.started_at);
        sessions
    }
}
