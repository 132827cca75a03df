//! Selection stabilization.
//!
//! Dragging a selection in a terminal copies every intermediate extension
//! ("n", "no", "not", "not found"). The [`Stabilizer`] coalesces such a burst
//! of related changes into the final value, and lets unrelated changes
//! through immediately.
//!
//! The state machine itself is synchronous and takes the current time as an
//! argument. [`run_stabilizer`] drives it from a single tokio task, so raw
//! changes and deadline expiry never touch the state concurrently.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

use crate::capture::RawCapture;
use crate::monitor::MonitorHandle;

/// Default quiet period before a buffered selection is emitted.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(500);

/// Default window for [`RelatedRule::ContainmentOrBurst`].
pub const DEFAULT_BURST_WINDOW: Duration = Duration::from_millis(200);

/// How to decide whether a new raw value continues the current selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelatedRule {
    /// One value is a strict substring of the other.
    #[default]
    Containment,
    /// Containment, or the change arrived within `window` of the previous
    /// raw change.
    ContainmentOrBurst {
        /// Changes closer together than this are related.
        window: Duration,
    },
}

impl RelatedRule {
    /// Whether `value` is related to `buffer`.
    ///
    /// `since_last_change` is the time since the previous raw change, if any.
    #[must_use]
    pub fn is_related(&self, buffer: &str, value: &str, since_last_change: Option<Duration>) -> bool {
        if strictly_contains(buffer, value) {
            return true;
        }
        match self {
            Self::Containment => false,
            Self::ContainmentOrBurst { window } => {
                since_last_change.is_some_and(|elapsed| elapsed < *window)
            }
        }
    }
}

/// One of the two strings contains the other and their lengths differ.
///
/// The empty string is contained in everything, so the first capture after
/// startup is always buffered.
fn strictly_contains(a: &str, b: &str) -> bool {
    a.len() != b.len() && (a.contains(b) || b.contains(a))
}

/// Debounce state for text captures.
#[derive(Debug)]
pub struct Stabilizer {
    window: Duration,
    rule: RelatedRule,
    pending: Option<String>,
    last_stable: String,
    last_raw: Option<String>,
    deadline: Option<Instant>,
    last_change_at: Option<Instant>,
}

impl Stabilizer {
    /// Create a stabilizer with the given quiet window and relatedness rule.
    #[must_use]
    pub fn new(window: Duration, rule: RelatedRule) -> Self {
        Self {
            window,
            rule,
            pending: None,
            last_stable: String::new(),
            last_raw: None,
            deadline: None,
            last_change_at: None,
        }
    }

    /// Feed a raw clipboard value observed at `now`.
    ///
    /// Returns the value to emit immediately, if any. Related values are
    /// buffered and the deadline is pushed back; an unrelated value discards
    /// whatever was buffered and is emitted straight away.
    pub fn on_raw(&mut self, value: String, now: Instant) -> Option<String> {
        if self.last_raw.as_deref() == Some(value.as_str()) {
            return None;
        }

        let since_last_change = self
            .last_change_at
            .map(|at| now.saturating_duration_since(at));
        self.last_change_at = Some(now);
        self.last_raw = Some(value.clone());

        let buffer = self.pending.as_deref().unwrap_or(&self.last_stable);
        if self.rule.is_related(buffer, &value, since_last_change) {
            trace!(len = value.len(), "Buffering related selection change");
            self.pending = Some(value);
            self.deadline = Some(now + self.window);
            return None;
        }

        if let Some(superseded) = self.pending.take() {
            debug!(len = superseded.len(), "Discarding superseded selection");
        }
        self.deadline = None;
        self.last_stable.clone_from(&value);
        Some(value)
    }

    /// Handle the deadline firing at `now`.
    ///
    /// Returns the buffered value if the deadline has passed.
    pub fn on_deadline(&mut self, now: Instant) -> Option<String> {
        match self.deadline {
            Some(deadline) if now >= deadline => {}
            _ => return None,
        }
        self.deadline = None;
        let value = self.pending.take()?;
        self.last_stable.clone_from(&value);
        Some(value)
    }

    /// When the buffered value becomes stable, if anything is buffered.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The value currently buffered.
    #[must_use]
    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// The most recently emitted value.
    #[must_use]
    pub fn last_stable(&self) -> &str {
        &self.last_stable
    }

    /// Drop the buffered value and deadline without emitting.
    pub fn cancel(&mut self) {
        self.pending = None;
        self.deadline = None;
    }

    /// Emit whatever is buffered regardless of the deadline.
    pub fn flush(&mut self) -> Option<String> {
        self.deadline = None;
        let value = self.pending.take()?;
        self.last_stable.clone_from(&value);
        Some(value)
    }
}

impl Default for Stabilizer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, RelatedRule::default())
    }
}

/// Drive a [`Stabilizer`] until cancelled or until either channel closes.
///
/// Text is debounced; images pass through in arrival order. On cancellation
/// the buffered value is dropped. When the raw channel closes, the buffered
/// value is flushed first.
pub async fn run_stabilizer(
    mut stabilizer: Stabilizer,
    mut raw_rx: mpsc::Receiver<RawCapture>,
    tx: mpsc::Sender<RawCapture>,
    handle: MonitorHandle,
) {
    debug!("Stabilizer started");

    loop {
        let deadline = stabilizer.deadline();

        let emit = tokio::select! {
            biased;

            () = handle.stopped() => {
                stabilizer.cancel();
                break;
            }

            () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                stabilizer.on_deadline(Instant::now()).map(RawCapture::Text)
            }

            received = raw_rx.recv() => match received {
                Some(RawCapture::Text(text)) => {
                    stabilizer.on_raw(text, Instant::now()).map(RawCapture::Text)
                }
                Some(image @ RawCapture::Image(_)) => Some(image),
                None => {
                    if let Some(value) = stabilizer.flush() {
                        let _ = tx.send(RawCapture::Text(value)).await;
                    }
                    break;
                }
            },
        };

        if let Some(capture) = emit {
            if tx.send(capture).await.is_err() {
                debug!("Stabilized channel closed, stopping stabilizer");
                break;
            }
        }
    }

    debug!("Stabilizer stopped");
}
