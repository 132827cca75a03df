//! Linux-specific clipboard plumbing for clipkeep.
//!
//! Wayland compositors do not let ordinary clients read the clipboard in the
//! background, so on Wayland sessions clipkeep leans on `wl-clipboard`:
//!
//! - [`ClipboardWatcher`] keeps a long-lived `wl-paste --watch echo` process
//!   around and turns every line it prints into a "clipboard changed" signal.
//! - [`read_text`] and [`read_image`] fetch the actual payload with one-shot
//!   `wl-paste` invocations, since the watcher never delivers content.
//!
//! A non-zero exit from any of these tools means "feature unavailable" and is
//! reported as an error so the caller can fall back to another backend.
//!
//! The one-shot reads run as `tokio` child processes marked `kill_on_drop`,
//! so a caller that gives up on a read (a timeout, a shutdown) also reaps a
//! `wl-paste` stuck on an unresponsive selection owner.

#![cfg(target_os = "linux")]
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

mod watcher;

pub use watcher::{ClipboardWatcher, WatchError};

use std::process::Stdio;

use tokio::process::Command;

/// Image MIME types we accept from `wl-paste`, in order of preference.
const IMAGE_MIME_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/webp",
    "image/gif",
    "image/bmp",
];

/// Read the current clipboard text via `wl-paste`.
///
/// Returns `Ok(None)` when the clipboard is empty or does not offer text.
///
/// # Errors
///
/// Returns an error if `wl-paste` cannot be executed at all.
pub async fn read_text() -> Result<Option<String>, WatchError> {
    let Some(bytes) = run_wl_paste(&["--no-newline", "--type", "text"]).await? else {
        return Ok(None);
    };
    let text = String::from_utf8_lossy(&bytes).into_owned();
    if text.is_empty() {
        Ok(None)
    } else {
        Ok(Some(text))
    }
}

/// Read the current clipboard image via `wl-paste`.
///
/// Picks the first offered type from a fixed preference list. Returns
/// `Ok(None)` when no image type is on offer.
///
/// # Errors
///
/// Returns an error if `wl-paste` cannot be executed at all.
pub async fn read_image() -> Result<Option<Vec<u8>>, WatchError> {
    let Some(types) = run_wl_paste(&["--list-types"]).await? else {
        return Ok(None);
    };
    let types = String::from_utf8_lossy(&types);
    let Some(mime) = preferred_image_type(&types) else {
        return Ok(None);
    };
    run_wl_paste(&["--type", mime]).await
}

/// Choose the preferred image MIME type from `wl-paste --list-types` output.
#[must_use]
pub fn preferred_image_type(offered: &str) -> Option<&'static str> {
    IMAGE_MIME_TYPES
        .iter()
        .copied()
        .find(|mime| offered.lines().any(|line| line.trim() == *mime))
}

/// Run `wl-paste` with the given arguments and capture stdout.
///
/// A non-zero exit status maps to `Ok(None)`: `wl-paste` exits with an error
/// when the selection is empty or the requested type is missing.
async fn run_wl_paste(args: &[&str]) -> Result<Option<Vec<u8>>, WatchError> {
    run_capture("wl-paste", args).await
}

/// Run `program` to completion and return its stdout on success.
///
/// The child is killed if the returned future is dropped first.
async fn run_capture(program: &str, args: &[&str]) -> Result<Option<Vec<u8>>, WatchError> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| WatchError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if output.status.success() {
        Ok(Some(output.stdout))
    } else {
        tracing::trace!(program, ?args, status = %output.status, "Read returned no data");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    #[test]
    fn test_preferred_image_type_png_first() {
        let offered = "text/plain\nimage/jpeg\nimage/png\n";
        assert_eq!(preferred_image_type(offered), Some("image/png"));
    }

    #[test]
    fn test_preferred_image_type_fallback() {
        let offered = "TEXT\nimage/webp\n";
        assert_eq!(preferred_image_type(offered), Some("image/webp"));
    }

    #[test]
    fn test_preferred_image_type_none() {
        assert_eq!(preferred_image_type("text/plain\nUTF8_STRING"), None);
        assert_eq!(preferred_image_type(""), None);
    }

    #[test]
    fn test_preferred_image_type_requires_exact_line() {
        assert_eq!(preferred_image_type("image/png-ish"), None);
    }

    #[tokio::test]
    async fn test_run_capture_returns_stdout() {
        let output = run_capture("sh", &["-c", "printf hello"]).await.unwrap();
        assert_eq!(output.as_deref(), Some(b"hello".as_slice()));
    }

    #[tokio::test]
    async fn test_run_capture_failure_is_none() {
        assert_eq!(run_capture("sh", &["-c", "exit 1"]).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_run_capture_missing_program() {
        let err = run_capture("clipkeep-definitely-missing", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, WatchError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_run_capture_can_be_abandoned() {
        let started = Instant::now();
        let result =
            tokio::time::timeout(Duration::from_millis(100), run_capture("sleep", &["30"])).await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    #[ignore = "requires a Wayland session with wl-clipboard installed"]
    async fn test_read_text_on_wayland() {
        assert!(read_text().await.is_ok());
    }
}
