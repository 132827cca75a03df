//! Immediate-read backend built on `clipboard-rs`.

use std::time::Duration;

use clipboard_rs::common::RustImage;
use clipboard_rs::{Clipboard, ClipboardContext, ContentFormat};
use tracing::trace;

use super::{ClipboardBackend, MonitorError, Result};
use crate::capture::ClipboardSnapshot;

/// Reads the system clipboard directly on every tick.
///
/// A fresh [`ClipboardContext`] is opened per read, so a clipboard owner
/// going away never leaves us holding a stale handle. `clipboard-rs` is
/// synchronous, so each read runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct ImmediateBackend {
    poll_interval: Duration,
}

impl ImmediateBackend {
    /// Create a backend that ticks at `poll_interval`.
    #[must_use]
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    fn read_blocking() -> Result<ClipboardSnapshot> {
        let ctx = ClipboardContext::new().map_err(|e| MonitorError::AccessFailed(e.to_string()))?;

        let text = match ctx.get_text() {
            Ok(text) if !text.is_empty() => Some(text),
            // No text content or non-text clipboard is not an error
            Ok(_) | Err(_) => None,
        };

        let image = if text.is_none() {
            Self::read_image(&ctx)
        } else {
            None
        };

        Ok(ClipboardSnapshot { text, image })
    }

    fn read_image(ctx: &ClipboardContext) -> Option<Vec<u8>> {
        if !ctx.has(ContentFormat::Image) {
            return None;
        }
        let image = ctx.get_image().ok()?;
        match image.to_png() {
            Ok(png) => Some(png.get_bytes().to_vec()),
            Err(e) => {
                trace!(error = %e, "Clipboard image could not be encoded");
                None
            }
        }
    }
}

impl Default for ImmediateBackend {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

#[async_trait::async_trait]
impl ClipboardBackend for ImmediateBackend {
    fn name(&self) -> &'static str {
        "immediate"
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    async fn read(&mut self) -> Result<ClipboardSnapshot> {
        tokio::task::spawn_blocking(Self::read_blocking)
            .await
            .map_err(|e| MonitorError::AccessFailed(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immediate_backend_defaults() {
        let backend = ImmediateBackend::default();
        assert_eq!(backend.name(), "immediate");
        assert_eq!(backend.poll_interval(), Duration::from_millis(500));
    }

    #[tokio::test]
    #[ignore = "requires a system clipboard"]
    async fn test_immediate_backend_reads() {
        let mut backend = ImmediateBackend::default();
        assert!(backend.read().await.is_ok());
    }
}
