//! Process-wide cooperative shutdown signal
//!
//! Every loop polls [`ShutdownSignal::is_triggered`] once per iteration. The
//! flag only ever goes from running to stopping; nothing waits on a lock.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Why the process is stopping
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ShutdownReason {
    /// Ctrl+C / SIGTERM
    Signal,
    /// A capture worker hit a fatal device error
    CaptureFailed(String),
    /// Explicit stop requested by the operator or the embedding code
    Requested,
}

#[derive(Debug, Default)]
struct Inner {
    triggered: AtomicBool,
    reason: OnceLock<ShutdownReason>,
}

/// Clonable handle to the one-way stop flag
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the flag to stopping.
    ///
    /// Returns `true` for the single call that performed the transition;
    /// later calls are no-ops and keep the first reason.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let first = self
            .inner
            .triggered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if first {
            let _ = self.inner.reason.set(reason.clone());
            tracing::info!(?reason, "Shutdown triggered");
        }
        first
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::Acquire)
    }

    /// Reason recorded by the call that triggered shutdown
    pub fn reason(&self) -> Option<ShutdownReason> {
        self.inner.reason.get().cloned()
    }

    /// Resolve once shutdown has been triggered, checking every `poll`.
    pub async fn wait(&self, poll: Duration) {
        while !self.is_triggered() {
            tokio::time::sleep(poll).await;
        }
    }
}
