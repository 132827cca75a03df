//! Long-lived clipboard change watcher.

use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// How long a freshly spawned watcher must survive before we trust it.
const DEFAULT_STARTUP_GRACE: Duration = Duration::from_millis(150);

/// Errors raised by the watcher subprocess plumbing.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The program could not be executed.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The watcher exited during startup, usually because the compositor
    /// does not support the data-control protocol.
    #[error("watcher exited during startup with {0}")]
    Exited(ExitStatus),

    /// The watcher did not expose a stdout pipe.
    #[error("watcher stdout unavailable")]
    NoStdout,

    /// Stopping the watcher failed.
    #[error("failed to stop watcher: {0}")]
    Stop(#[source] std::io::Error),
}

/// A running `wl-paste --watch` process that flags clipboard changes.
///
/// The watcher only says *that* the clipboard changed; callers read the
/// payload themselves. The child is killed when the watcher is stopped or
/// dropped.
#[derive(Debug)]
pub struct ClipboardWatcher {
    child: Child,
    changed: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl ClipboardWatcher {
    /// Spawn `wl-paste --watch echo`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if `wl-paste` is missing or exits right away.
    pub async fn spawn() -> Result<Self, WatchError> {
        Self::spawn_command("wl-paste", &["--watch", "echo"], DEFAULT_STARTUP_GRACE).await
    }

    /// Spawn an arbitrary line-emitting watcher command.
    ///
    /// Every line the command prints counts as one change signal. If the
    /// process exits within `startup_grace`, spawning fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be executed or exits during
    /// the startup grace period.
    pub async fn spawn_command(
        program: &str,
        args: &[&str],
        startup_grace: Duration,
    ) -> Result<Self, WatchError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| WatchError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or(WatchError::NoStdout)?;

        tokio::time::sleep(startup_grace).await;
        if let Ok(Some(status)) = child.try_wait() {
            return Err(WatchError::Exited(status));
        }

        let changed = Arc::new(AtomicBool::new(false));
        let alive = Arc::new(AtomicBool::new(true));

        let reader = {
            let changed = Arc::clone(&changed);
            let alive = Arc::clone(&alive);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(_)) => {
                            trace!("Clipboard change signalled");
                            changed.store(true, Ordering::SeqCst);
                        }
                        Ok(None) => {
                            debug!("Clipboard watcher closed its output");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "Error reading clipboard watcher output");
                            break;
                        }
                    }
                }
                alive.store(false, Ordering::SeqCst);
            })
        };

        debug!(program, "Clipboard watcher started");
        Ok(Self {
            child,
            changed,
            alive,
            reader,
        })
    }

    /// Consume the pending change signal, returning whether one was set.
    pub fn take_change(&self) -> bool {
        self.changed.swap(false, Ordering::SeqCst)
    }

    /// Whether the watcher process is still delivering signals.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Kill the watcher and reap the process.
    ///
    /// # Errors
    ///
    /// Returns an error if the process could not be killed.
    pub async fn stop(mut self) -> Result<(), WatchError> {
        if let Ok(None) = self.child.try_wait() {
            self.child.kill().await.map_err(WatchError::Stop)?;
        }
        self.reader.abort();
        debug!("Clipboard watcher stopped");
        Ok(())
    }
}
