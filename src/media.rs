//! Encoded media items flowing from capture workers to stream sessions

use bytes::Bytes;
use serde::Serialize;
use std::fmt;

/// Which pipeline an item belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One encoded audio chunk or video frame.
///
/// Items are immutable once produced; cloning only bumps the payload's
/// reference count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    kind: MediaKind,
    sequence: u64,
    payload: Bytes,
}

impl MediaItem {
    pub fn new(kind: MediaKind, sequence: u64, payload: Bytes) -> Self {
        Self {
            kind,
            sequence,
            payload,
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Position in the producing worker's output, starting at 0
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
