//! Capture workers
//!
//! A [`CaptureWorker`] owns one hardware source. It runs on a dedicated
//! thread, pulling raw samples, encoding them and pushing the result into
//! its [`BoundedChannel`] until shutdown or a fatal device error.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::buffer::SharedChannel;
use crate::codec::Encoder;
use crate::error::CaptureError;
use crate::media::{MediaItem, MediaKind};
use crate::shutdown::{ShutdownReason, ShutdownSignal};

/// Something that can be opened to produce a capture handle
///
/// Opening happens on the worker thread, so the handle itself does not need
/// to be `Send` (cpal streams and camera handles often are not).
pub trait CaptureSource: Send + 'static {
    type Sample;
    type Handle: CaptureHandle<Sample = Self::Sample>;

    /// Human-readable device description for logs
    fn describe(&self) -> String;

    fn open(&mut self) -> Result<Self::Handle, CaptureError>;
}

/// An opened hardware handle
pub trait CaptureHandle {
    type Sample;

    /// Read one raw sample. May block for up to the device's read timeout.
    fn read(&mut self) -> Result<Self::Sample, CaptureError>;

    /// Release the device. Called exactly once, on every exit path.
    fn close(&mut self) {}
}

/// Closes the wrapped handle when dropped
struct HandleGuard<H: CaptureHandle>(H);

impl<H: CaptureHandle> Drop for HandleGuard<H> {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Worker lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum WorkerState {
    Init = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Init,
            1 => WorkerState::Running,
            2 => WorkerState::Stopping,
            _ => WorkerState::Stopped,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    state: AtomicU8,
    pushed: AtomicU64,
    transient_errors: AtomicU64,
    encode_errors: AtomicU64,
}

/// Lock-free view of a worker, shared with the HTTP layer
#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    counters: Arc<Counters>,
}

impl WorkerStatus {
    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.counters.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        self.counters.state.store(state as u8, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.state() == WorkerState::Running
    }

    pub fn report(&self) -> CaptureReport {
        CaptureReport {
            pushed: self.counters.pushed.load(Ordering::Relaxed),
            transient_errors: self.counters.transient_errors.load(Ordering::Relaxed),
            encode_errors: self.counters.encode_errors.load(Ordering::Relaxed),
        }
    }
}

/// Counters for one worker run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CaptureReport {
    /// Items pushed into the channel
    pub pushed: u64,
    /// Reads that failed but were retried
    pub transient_errors: u64,
    /// Samples dropped because encoding failed
    pub encode_errors: u64,
}

/// Read → encode → push loop for one source
pub struct CaptureWorker<S, E> {
    kind: MediaKind,
    source: S,
    encoder: E,
    channel: SharedChannel<MediaItem>,
    shutdown: ShutdownSignal,
    status: WorkerStatus,
    retry_delay: Duration,
    max_consecutive_failures: u32,
}

impl<S, E> CaptureWorker<S, E>
where
    S: CaptureSource,
    E: Encoder<Input = S::Sample>,
{
    pub fn new(
        kind: MediaKind,
        source: S,
        encoder: E,
        channel: SharedChannel<MediaItem>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            kind,
            source,
            encoder,
            channel,
            shutdown,
            status: WorkerStatus::default(),
            retry_delay: Duration::ZERO,
            max_consecutive_failures: 0,
        }
    }

    /// Pause after a transient read error before reading again
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Treat this many transient failures in a row as an unrecoverable
    /// error. `0` retries forever.
    pub fn with_max_consecutive_failures(mut self, limit: u32) -> Self {
        self.max_consecutive_failures = limit;
        self
    }

    pub fn status(&self) -> WorkerStatus {
        self.status.clone()
    }

    /// Run the worker on the current thread until it stops.
    pub fn run(&mut self) -> Result<CaptureReport, CaptureError> {
        self.status.set_state(WorkerState::Init);
        let device = self.source.describe();
        tracing::info!(kind = %self.kind, %device, "Opening capture device");

        let handle = match self.source.open() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(kind = %self.kind, %device, "Failed to initialize capture: {}", e);
                self.shutdown
                    .trigger(ShutdownReason::CaptureFailed(format!("{}: {}", self.kind, e)));
                self.status.set_state(WorkerState::Stopped);
                return Err(e);
            }
        };

        let mut handle = HandleGuard(handle);
        self.status.set_state(WorkerState::Running);
        tracing::info!(kind = %self.kind, %device, "Capture started");

        let result = self.capture_loop(&mut handle.0);

        self.status.set_state(WorkerState::Stopping);
        tracing::info!(kind = %self.kind, "Stopping capture...");
        drop(handle);
        self.status.set_state(WorkerState::Stopped);

        result.map(|()| self.status.report())
    }

    fn capture_loop(&mut self, handle: &mut S::Handle) -> Result<(), CaptureError> {
        let counters = &self.status.counters;
        let mut sequence: u64 = 0;
        let mut consecutive_failures: u32 = 0;

        while !self.shutdown.is_triggered() {
            let sample = match handle.read() {
                Ok(sample) => {
                    consecutive_failures = 0;
                    sample
                }
                Err(e) if !e.is_fatal() => {
                    counters.transient_errors.fetch_add(1, Ordering::Relaxed);
                    consecutive_failures += 1;

                    if self.max_consecutive_failures > 0
                        && consecutive_failures >= self.max_consecutive_failures
                    {
                        let fatal = CaptureError::UnrecoverableRead(format!(
                            "{} consecutive read failures, last: {}",
                            consecutive_failures, e
                        ));
                        return Err(self.escalate(fatal));
                    }

                    tracing::warn!(kind = %self.kind, "{}", e);
                    if !self.retry_delay.is_zero() {
                        thread::sleep(self.retry_delay);
                    }
                    continue;
                }
                Err(e) => return Err(self.escalate(e)),
            };

            // The read may have blocked across a shutdown request
            if self.shutdown.is_triggered() {
                break;
            }

            let payload = match self.encoder.encode(&sample) {
                Ok(payload) => payload,
                Err(e) => {
                    counters.encode_errors.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(kind = %self.kind, "Dropping sample: {}", e);
                    continue;
                }
            };

            self.channel
                .push(MediaItem::new(self.kind, sequence, payload));
            sequence += 1;
            counters.pushed.fetch_add(1, Ordering::Relaxed);
        }

        Ok(())
    }

    fn escalate(&self, error: CaptureError) -> CaptureError {
        tracing::error!(kind = %self.kind, "Capture failed: {}", error);
        self.shutdown
            .trigger(ShutdownReason::CaptureFailed(format!("{}: {}", self.kind, error)));
        error
    }

    /// Run the worker on its own named thread
    pub fn spawn(mut self) -> std::io::Result<WorkerHandle> {
        let (done_tx, done_rx) = bounded(1);
        let status = self.status.clone();
        let kind = self.kind;

        let thread = thread::Builder::new()
            .name(format!("capture-{}", kind))
            .spawn(move || {
                let result = self.run();
                let _ = done_tx.send(result);
            })?;

        Ok(WorkerHandle {
            kind,
            status,
            done_rx,
            thread: Some(thread),
            outcome: None,
        })
    }
}

/// Supervises a spawned worker thread
pub struct WorkerHandle {
    kind: MediaKind,
    status: WorkerStatus,
    done_rx: Receiver<Result<CaptureReport, CaptureError>>,
    thread: Option<JoinHandle<()>>,
    outcome: Option<Result<CaptureReport, CaptureError>>,
}

impl WorkerHandle {
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn status(&self) -> &WorkerStatus {
        &self.status
    }

    /// Wait up to `timeout` for the worker to finish.
    ///
    /// Returns `None` if it is still running; the thread is left detached
    /// in that case and may be joined again later.
    pub fn join_timeout(
        &mut self,
        timeout: Duration,
    ) -> Option<Result<CaptureReport, CaptureError>> {
        if self.outcome.is_none() {
            match self.done_rx.recv_timeout(timeout) {
                Ok(result) => self.outcome = Some(result),
                Err(RecvTimeoutError::Timeout) => return None,
                Err(RecvTimeoutError::Disconnected) => {
                    // The thread died without reporting
                    self.outcome = Some(Err(CaptureError::UnrecoverableRead(format!(
                        "{} capture thread panicked",
                        self.kind
                    ))));
                }
            }
        }

        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        self.outcome.clone()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Scripted capture sources for tests

    use super::*;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicBool;

    use crate::error::CodecError;

    pub type Step = Result<u32, CaptureError>;

    /// Plays back a fixed script, then repeats `tail` forever
    pub struct ScriptedSource {
        pub open_error: Option<CaptureError>,
        pub script: Arc<Mutex<VecDeque<Step>>>,
        pub tail: Option<u32>,
        pub read_delay: Duration,
        pub closed: Arc<AtomicBool>,
    }

    impl ScriptedSource {
        pub fn new(script: Vec<Step>) -> Self {
            Self {
                open_error: None,
                script: Arc::new(Mutex::new(script.into())),
                tail: None,
                read_delay: Duration::ZERO,
                closed: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    pub struct ScriptedHandle {
        script: Arc<Mutex<VecDeque<Step>>>,
        tail: Option<u32>,
        read_delay: Duration,
        closed: Arc<AtomicBool>,
    }

    impl CaptureSource for ScriptedSource {
        type Sample = u32;
        type Handle = ScriptedHandle;

        fn describe(&self) -> String {
            "scripted".to_string()
        }

        fn open(&mut self) -> Result<ScriptedHandle, CaptureError> {
            if let Some(e) = self.open_error.take() {
                return Err(e);
            }
            Ok(ScriptedHandle {
                script: self.script.clone(),
                tail: self.tail,
                read_delay: self.read_delay,
                closed: self.closed.clone(),
            })
        }
    }

    impl CaptureHandle for ScriptedHandle {
        type Sample = u32;

        fn read(&mut self) -> Result<u32, CaptureError> {
            if !self.read_delay.is_zero() {
                thread::sleep(self.read_delay);
            }
            match self.script.lock().pop_front() {
                Some(step) => step,
                None => self
                    .tail
                    .ok_or_else(|| CaptureError::UnrecoverableRead("script exhausted".into())),
            }
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Encodes a number as its big-endian bytes; rejects `reject`
    pub struct NumberEncoder {
        pub reject: Option<u32>,
    }

    impl Encoder for NumberEncoder {
        type Input = u32;

        fn encode(&mut self, input: &u32) -> Result<Bytes, CodecError> {
            if Some(*input) == self.reject {
                return Err(CodecError::EncodingFailed(format!("cannot encode {}", input)));
            }
            Ok(Bytes::copy_from_slice(&input.to_be_bytes()))
        }
    }

    pub fn decode(item: &MediaItem) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(item.payload());
        u32::from_be_bytes(raw)
    }
}
