//! Clipboard capture source.
//!
//! A [`ClipboardBackend`] knows how to read the clipboard; the
//! [`ClipboardMonitor`] drives a backend on a fixed tick, filters out
//! unusable payloads, and forwards each new value once.
//!
//! Two backends exist: [`ImmediateBackend`] reads the clipboard on every
//! tick, and on Linux the watch-notified backend only reads after a
//! `wl-paste --watch` signal. [`select_backend`] picks one from the session
//! type and falls back to immediate reads when the watcher cannot start.
//!
//! Reads may block on a misbehaving selection owner. The monitor bounds each
//! read with a timeout and abandons it as soon as the stop signal fires.

mod immediate;
#[cfg(target_os = "linux")]
mod watch;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch as signal};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::capture::{bytes_hash, text_hash, ClipboardSnapshot, RawCapture};
use crate::config::{BackendKind, CaptureConfig};

pub use immediate::ImmediateBackend;
#[cfg(target_os = "linux")]
pub use watch::WatchBackend;

/// Errors raised while reading the clipboard.
///
/// These never stop the monitor: a failed read skips the tick.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The clipboard could not be opened or read.
    #[error("clipboard access failed: {0}")]
    AccessFailed(String),

    /// The backend failed to start.
    #[error("failed to start backend: {0}")]
    StartFailed(String),

    /// The read was abandoned after the timeout.
    #[error("clipboard read timed out after {0:?}")]
    TimedOut(Duration),

    /// The backend is not available on this platform.
    #[error("backend '{0}' is not supported on this platform")]
    Unsupported(&'static str),
}

/// Result type for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// A cloneable cancellation handle shared by the pipeline tasks.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    stop_tx: Arc<signal::Sender<bool>>,
    stop_rx: signal::Receiver<bool>,
}

impl MonitorHandle {
    /// Create a new handle in the running state.
    #[must_use]
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = signal::channel(false);
        Self {
            stop_tx: Arc::new(stop_tx),
            stop_rx,
        }
    }

    /// Signal every task holding this handle to stop.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Check if the stop signal has been sent.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        *self.stop_rx.borrow()
    }

    /// Resolve once the stop signal has been sent.
    pub async fn stopped(&self) {
        let mut rx = self.stop_rx.clone();
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for MonitorHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// A source of clipboard contents.
#[async_trait::async_trait]
pub trait ClipboardBackend: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// How often the monitor ticks.
    fn poll_interval(&self) -> Duration;

    /// Whether the clipboard should be read on this tick.
    fn should_read(&mut self) -> bool {
        true
    }

    /// Read the current clipboard contents.
    ///
    /// Implementations must not block the runtime; the monitor may drop the
    /// returned future at any await point.
    ///
    /// # Errors
    ///
    /// Returns an error if the clipboard cannot be read. The monitor treats
    /// this as "no change".
    async fn read(&mut self) -> Result<ClipboardSnapshot>;

    /// Release any resources held by the backend.
    async fn shutdown(&mut self) {}
}

/// The kind of graphical session we are running in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionType {
    /// A Wayland compositor.
    Wayland,
    /// An X11 server.
    X11,
    /// No display session detected, or a non-Linux desktop.
    Other,
}

impl SessionType {
    /// Detect the session type from the environment.
    #[must_use]
    pub fn detect() -> Self {
        Self::from_env_values(
            std::env::var("WAYLAND_DISPLAY").ok().as_deref(),
            std::env::var("XDG_SESSION_TYPE").ok().as_deref(),
            std::env::var("DISPLAY").ok().as_deref(),
        )
    }

    /// Decide the session type from the relevant environment values.
    #[must_use]
    pub fn from_env_values(
        wayland_display: Option<&str>,
        xdg_session_type: Option<&str>,
        display: Option<&str>,
    ) -> Self {
        let set = |value: Option<&str>| value.is_some_and(|v| !v.is_empty());

        if set(wayland_display) || xdg_session_type.is_some_and(|t| t.eq_ignore_ascii_case("wayland"))
        {
            Self::Wayland
        } else if set(display) || xdg_session_type.is_some_and(|t| t.eq_ignore_ascii_case("x11")) {
            Self::X11
        } else {
            Self::Other
        }
    }
}

impl std::fmt::Display for SessionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wayland => write!(f, "wayland"),
            Self::X11 => write!(f, "x11"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Pick and start a backend for the given session.
///
/// `auto` uses the watch-notified backend on Wayland and immediate reads
/// everywhere else. If the watcher cannot start, immediate reads are used
/// instead.
pub async fn select_backend(
    config: &CaptureConfig,
    session: SessionType,
) -> Box<dyn ClipboardBackend> {
    let immediate =
        || -> Box<dyn ClipboardBackend> { Box::new(ImmediateBackend::new(config.poll_interval())) };

    let want_watch = match config.backend {
        BackendKind::Immediate => false,
        BackendKind::Watch => true,
        BackendKind::Auto => session == SessionType::Wayland,
    };

    if !want_watch {
        debug!(%session, "Using immediate clipboard backend");
        return immediate();
    }

    match start_watch_backend(config.watch_poll_interval()).await {
        Ok(backend) => {
            info!(%session, "Using watch-notified clipboard backend");
            backend
        }
        Err(e) => {
            warn!(error = %e, "Clipboard watcher unavailable, falling back to immediate reads");
            immediate()
        }
    }
}

#[cfg(target_os = "linux")]
async fn start_watch_backend(poll_interval: Duration) -> Result<Box<dyn ClipboardBackend>> {
    let backend = WatchBackend::spawn(poll_interval).await?;
    Ok(Box::new(backend))
}

#[cfg(not(target_os = "linux"))]
async fn start_watch_backend(_poll_interval: Duration) -> Result<Box<dyn ClipboardBackend>> {
    Err(MonitorError::Unsupported("watch"))
}

/// Limits applied to clipboard payloads before they are forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFilter {
    /// Image payloads of this many bytes or fewer are ignored.
    pub min_image_bytes: usize,
    /// Longer text is truncated to this many bytes.
    pub max_content_length: usize,
    /// A read taking longer than this is abandoned.
    pub read_timeout: Duration,
}

impl Default for CaptureFilter {
    fn default() -> Self {
        Self::from(&CaptureConfig::default())
    }
}

impl From<&CaptureConfig> for CaptureFilter {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            min_image_bytes: config.min_image_bytes,
            max_content_length: config.max_content_length,
            read_timeout: config.read_timeout(),
        }
    }
}

/// Truncate `text` to at most `max` bytes on a char boundary.
fn truncate_to_boundary(mut text: String, max: usize) -> String {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    text
}

/// Polls a backend and forwards changed clipboard values.
pub struct ClipboardMonitor {
    backend: Box<dyn ClipboardBackend>,
    filter: CaptureFilter,
    last_text_hash: Option<String>,
    last_image_hash: Option<String>,
}

impl std::fmt::Debug for ClipboardMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipboardMonitor")
            .field("backend", &self.backend.name())
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

impl ClipboardMonitor {
    /// Create a monitor over the given backend.
    #[must_use]
    pub fn new(backend: Box<dyn ClipboardBackend>, filter: CaptureFilter) -> Self {
        Self {
            backend,
            filter,
            last_text_hash: None,
            last_image_hash: None,
        }
    }

    /// Name of the backend in use.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Turn a snapshot into the values that changed since the last one.
    pub fn process(&mut self, snapshot: ClipboardSnapshot) -> Vec<RawCapture> {
        let mut changes = Vec::new();

        if let Some(text) = snapshot.text {
            if text.trim().is_empty() {
                trace!("Clipboard text is blank, skipping");
            } else {
                let text = if text.len() > self.filter.max_content_length {
                    debug!(
                        len = text.len(),
                        max = self.filter.max_content_length,
                        "Truncating clipboard content"
                    );
                    truncate_to_boundary(text, self.filter.max_content_length)
                } else {
                    text
                };

                let hash = text_hash(&text);
                if self.last_text_hash.as_ref() == Some(&hash) {
                    trace!("Clipboard text unchanged");
                } else {
                    debug!(hash = %hash, len = text.len(), "New clipboard text detected");
                    self.last_text_hash = Some(hash);
                    changes.push(RawCapture::Text(text));
                }
            }
        }

        if let Some(image) = snapshot.image {
            if image.len() <= self.filter.min_image_bytes {
                trace!(len = image.len(), "Clipboard image too small, skipping");
            } else {
                let hash = bytes_hash(&image);
                if self.last_image_hash.as_ref() == Some(&hash) {
                    trace!("Clipboard image unchanged");
                } else {
                    debug!(hash = %hash, len = image.len(), "New clipboard image detected");
                    self.last_image_hash = Some(hash);
                    changes.push(RawCapture::Image(image));
                }
            }
        }

        changes
    }

    /// Poll until stopped or until the receiver is dropped.
    pub async fn run(mut self, tx: mpsc::Sender<RawCapture>, handle: MonitorHandle) {
        debug!(
            backend = self.backend.name(),
            interval_ms = self.backend.poll_interval().as_millis(),
            "Starting clipboard monitor"
        );

        let mut ticker = interval(self.backend.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        'poll: loop {
            tokio::select! {
                biased;
                () = handle.stopped() => break,
                _ = ticker.tick() => {}
            }

            if !self.backend.should_read() {
                continue;
            }

            let read_timeout = self.filter.read_timeout;
            let outcome = tokio::select! {
                biased;
                () = handle.stopped() => break,
                outcome = timeout(read_timeout, self.backend.read()) => outcome,
            };

            let snapshot = match outcome {
                Ok(Ok(snapshot)) => snapshot,
                Ok(Err(e)) => {
                    debug!(error = %e, backend = self.backend.name(), "Clipboard read failed, skipping tick");
                    continue;
                }
                Err(_) => {
                    warn!(
                        error = %MonitorError::TimedOut(read_timeout),
                        backend = self.backend.name(),
                        "Clipboard read abandoned, skipping tick"
                    );
                    continue;
                }
            };

            for change in self.process(snapshot) {
                if tx.send(change).await.is_err() {
                    debug!("Capture channel closed, stopping monitor");
                    break 'poll;
                }
            }
        }

        self.backend.shutdown().await;
        debug!("Clipboard monitor stopped");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! A scripted backend for exercising the monitor and pipeline.

    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::{ClipboardBackend, MonitorError, Result};
    use crate::capture::ClipboardSnapshot;

    #[derive(Debug, Clone)]
    enum Step {
        Snapshot(ClipboardSnapshot),
        Fail,
        Hang,
    }

    /// Feeds queued snapshots; repeats the last one once the queue drains.
    #[derive(Debug, Clone)]
    pub struct ScriptedBackend {
        queue: Arc<Mutex<VecDeque<Step>>>,
        current: Arc<Mutex<ClipboardSnapshot>>,
        pub shutdowns: Arc<Mutex<u32>>,
        interval: Duration,
    }

    impl ScriptedBackend {
        pub fn new(interval: Duration) -> Self {
            Self {
                queue: Arc::default(),
                current: Arc::default(),
                shutdowns: Arc::default(),
                interval,
            }
        }

        /// Queue a snapshot for a future read.
        pub fn push(&self, snapshot: ClipboardSnapshot) {
            self.queue.lock().push_back(Step::Snapshot(snapshot));
        }

        /// Queue a failing read.
        pub fn push_failure(&self) {
            self.queue.lock().push_back(Step::Fail);
        }

        /// Queue a read that never completes.
        pub fn push_hang(&self) {
            self.queue.lock().push_back(Step::Hang);
        }
    }

    #[async_trait::async_trait]
    impl ClipboardBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn poll_interval(&self) -> Duration {
            self.interval
        }

        async fn read(&mut self) -> Result<ClipboardSnapshot> {
            let step = self.queue.lock().pop_front();
            match step {
                Some(Step::Snapshot(snapshot)) => {
                    *self.current.lock() = snapshot.clone();
                    Ok(snapshot)
                }
                Some(Step::Fail) => Err(MonitorError::AccessFailed("scripted failure".to_string())),
                Some(Step::Hang) => std::future::pending().await,
                None => Ok(self.current.lock().clone()),
            }
        }

        async fn shutdown(&mut self) {
            *self.shutdowns.lock() += 1;
        }
    }
}
