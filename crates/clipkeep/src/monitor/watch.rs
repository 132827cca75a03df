//! Watch-notified backend for Wayland sessions.

use std::time::Duration;

use clipkeep_linux::{ClipboardWatcher, WatchError};
use tracing::{debug, warn};

use super::{ClipboardBackend, MonitorError, Result};
use crate::capture::ClipboardSnapshot;

impl From<WatchError> for MonitorError {
    fn from(err: WatchError) -> Self {
        match err {
            WatchError::Spawn { .. } | WatchError::Exited(_) | WatchError::NoStdout => {
                Self::StartFailed(err.to_string())
            }
            WatchError::Stop(_) => Self::AccessFailed(err.to_string()),
        }
    }
}

/// Reads the clipboard with `wl-paste`, but only after the watcher has
/// signalled a change.
///
/// If the watcher process dies later on, every tick reads instead.
#[derive(Debug)]
pub struct WatchBackend {
    watcher: Option<ClipboardWatcher>,
    poll_interval: Duration,
    primed: bool,
    degraded: bool,
}

impl WatchBackend {
    /// Spawn the watcher and wrap it in a backend.
    ///
    /// # Errors
    ///
    /// Returns an error if `wl-paste --watch` is missing or exits during
    /// startup, typically because the compositor lacks data-control support.
    pub async fn spawn(poll_interval: Duration) -> Result<Self> {
        let watcher = ClipboardWatcher::spawn().await?;
        Ok(Self {
            watcher: Some(watcher),
            poll_interval,
            primed: false,
            degraded: false,
        })
    }
}

#[async_trait::async_trait]
impl ClipboardBackend for WatchBackend {
    fn name(&self) -> &'static str {
        "watch"
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn should_read(&mut self) -> bool {
        // Read once at startup so the current contents are known.
        if !self.primed {
            self.primed = true;
            return true;
        }

        let Some(watcher) = &self.watcher else {
            return true;
        };

        if watcher.take_change() {
            return true;
        }

        if !watcher.is_alive() {
            if !self.degraded {
                warn!("Clipboard watcher exited, reading on every tick");
                self.degraded = true;
            }
            return true;
        }

        false
    }

    async fn read(&mut self) -> Result<ClipboardSnapshot> {
        let text = clipkeep_linux::read_text()
            .await
            .map_err(|e| MonitorError::AccessFailed(e.to_string()))?;
        let image = if text.is_none() {
            clipkeep_linux::read_image()
                .await
                .map_err(|e| MonitorError::AccessFailed(e.to_string()))?
        } else {
            None
        };
        Ok(ClipboardSnapshot { text, image })
    }

    async fn shutdown(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            if let Err(e) = watcher.stop().await {
                warn!(error = %e, "Failed to stop clipboard watcher");
            }
        }
        debug!("Watch backend shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_error_maps_to_start_failed() {
        let err: MonitorError = WatchError::NoStdout.into();
        assert!(matches!(err, MonitorError::StartFailed(_)));
    }

    #[tokio::test]
    #[ignore = "requires a Wayland session with wl-clipboard installed"]
    async fn test_watch_backend_spawns() {
        let mut backend = WatchBackend::spawn(Duration::from_millis(100))
            .await
            .unwrap();
        assert!(backend.should_read());
        backend.shutdown().await;
    }
}
