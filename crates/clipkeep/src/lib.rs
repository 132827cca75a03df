//! `clipkeep` - Clipboard history with selection stabilization
//!
//! This library watches the system clipboard, collapses the burst of partial
//! values produced by dragging a selection into the final one, flags
//! sensitive content, and keeps a deduplicated, retention-bounded history
//! with pinning and cached image payloads.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cache;
pub mod capture;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod pipeline;
pub mod security;
pub mod stabilize;
pub mod storage;

pub use cache::ItemCache;
pub use capture::{ClipboardItem, ContentType};
pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use pipeline::{CaptureEvent, CaptureEvents, Pipeline, PipelineHandle};
pub use security::{SecurityClassifier, Threat, ThreatLevel, ThreatMemory, ThreatType};
pub use storage::{AddOutcome, Storage, StorageStats};
