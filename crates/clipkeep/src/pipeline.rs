//! The capture pipeline.
//!
//! Three tasks connected by channels:
//!
//! ```text
//! monitor --raw--> stabilizer --stable--> processor --events--> CaptureEvents
//! ```
//!
//! The monitor polls the backend, the stabilizer debounces text selections,
//! and the processor classifies, persists and reports each stable capture.
//! All three share one [`MonitorHandle`]; the processor exits once the
//! stabilizer has, so nothing already stabilized is lost on shutdown.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::ItemCache;
use crate::capture::{describe_image, RawCapture};
use crate::config::{Config, SecurityConfig};
use crate::monitor::{CaptureFilter, ClipboardBackend, ClipboardMonitor, MonitorHandle};
use crate::security::{Threat, ThreatMemory};
use crate::stabilize::{run_stabilizer, RelatedRule, Stabilizer};
use crate::storage::Storage;

/// Capacity of the channels between pipeline stages.
const STAGE_CAPACITY: usize = 32;

/// Something the pipeline did with a stable capture.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaptureEvent {
    /// Text was stored or refreshed.
    Text {
        /// The history item.
        id: i64,
        /// The captured text.
        content: String,
    },
    /// An image was stored or refreshed.
    Image {
        /// The history item.
        id: i64,
        /// The PNG payload.
        #[serde(skip)]
        payload: Vec<u8>,
        /// Human-readable description, e.g. `Image (1.5 KB)`.
        description: String,
    },
    /// Captured text carries threats that have not been dismissed.
    SecurityThreat {
        /// The captured text.
        content: String,
        /// What the classifier found.
        threats: Vec<Threat>,
    },
}

/// Stream of [`CaptureEvent`]s from a running pipeline.
#[derive(Debug)]
pub struct CaptureEvents {
    rx: mpsc::UnboundedReceiver<CaptureEvent>,
}

impl CaptureEvents {
    /// Wait for the next event.
    ///
    /// Returns `None` once the pipeline has shut down and every event has
    /// been delivered.
    pub async fn next(&mut self) -> Option<CaptureEvent> {
        self.rx.recv().await
    }

    /// Take an event if one is ready.
    pub fn try_next(&mut self) -> Option<CaptureEvent> {
        self.rx.try_recv().ok()
    }
}

/// Controls a running pipeline.
#[derive(Debug)]
pub struct PipelineHandle {
    handle: MonitorHandle,
    backend: &'static str,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl PipelineHandle {
    /// Name of the clipboard backend in use.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend
    }

    /// A handle that stops the pipeline when signalled.
    #[must_use]
    pub fn monitor_handle(&self) -> MonitorHandle {
        self.handle.clone()
    }

    /// Whether any pipeline task is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|(_, task)| !task.is_finished())
    }

    /// Stop the pipeline and wait for every task to finish.
    ///
    /// The backend is shut down before this returns.
    pub async fn shutdown(self) {
        debug!("Shutting down capture pipeline");
        self.handle.stop();
        for (name, task) in self.tasks {
            if let Err(e) = task.await {
                warn!(task = name, error = %e, "Pipeline task failed");
            }
        }
        info!("Capture pipeline stopped");
    }
}

/// Builder for the capture pipeline.
#[derive(Debug)]
pub struct Pipeline {
    storage: Arc<Storage>,
    memory: Option<Arc<ThreatMemory>>,
    cache: Option<Arc<ItemCache>>,
    security: SecurityConfig,
    filter: CaptureFilter,
    window: Duration,
    rule: RelatedRule,
}

impl Pipeline {
    /// Create a pipeline that persists into `storage`.
    #[must_use]
    pub fn new(config: &Config, storage: Arc<Storage>) -> Self {
        Self {
            storage,
            memory: None,
            cache: None,
            security: config.security.clone(),
            filter: CaptureFilter::from(&config.capture),
            window: config.stabilize_window(),
            rule: config.related_rule(),
        }
    }

    /// Suppress threat events for content remembered in `memory`.
    #[must_use]
    pub fn with_memory(mut self, memory: Arc<ThreatMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Invalidate `cache` after every write.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<ItemCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Spawn the pipeline tasks on the current tokio runtime.
    #[must_use]
    pub fn start(self, backend: Box<dyn ClipboardBackend>) -> (PipelineHandle, CaptureEvents) {
        let handle = MonitorHandle::new();
        let (raw_tx, raw_rx) = mpsc::channel(STAGE_CAPACITY);
        let (stable_tx, stable_rx) = mpsc::channel(STAGE_CAPACITY);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let monitor = ClipboardMonitor::new(backend, self.filter);
        let backend_name = monitor.backend_name();
        let stabilizer = Stabilizer::new(self.window, self.rule);
        let processor = Processor {
            storage: self.storage,
            memory: self.memory,
            cache: self.cache,
            security: self.security,
            events: events_tx,
        };

        info!(
            backend = backend_name,
            window_ms = self.window.as_millis(),
            "Starting capture pipeline"
        );

        let tasks = vec![
            ("monitor", tokio::spawn(monitor.run(raw_tx, handle.clone()))),
            (
                "stabilizer",
                tokio::spawn(run_stabilizer(stabilizer, raw_rx, stable_tx, handle.clone())),
            ),
            ("processor", tokio::spawn(processor.run(stable_rx))),
        ];

        (
            PipelineHandle {
                handle,
                backend: backend_name,
                tasks,
            },
            CaptureEvents { rx: events_rx },
        )
    }
}

/// Classifies, persists and reports stable captures.
struct Processor {
    storage: Arc<Storage>,
    memory: Option<Arc<ThreatMemory>>,
    cache: Option<Arc<ItemCache>>,
    security: SecurityConfig,
    events: mpsc::UnboundedSender<CaptureEvent>,
}

impl Processor {
    async fn run(self, mut rx: mpsc::Receiver<RawCapture>) {
        while let Some(capture) = rx.recv().await {
            match capture {
                RawCapture::Text(content) => self.handle_text(content),
                RawCapture::Image(payload) => self.handle_image(payload),
            }
        }
        debug!("Capture processor stopped");
    }

    fn handle_text(&self, content: String) {
        let threats = if self.security.enabled {
            self.storage.classifier().classify(&content)
        } else {
            Vec::new()
        };

        let outcome = match self.storage.add_text_classified(&content, &threats) {
            Ok(Some(outcome)) => outcome,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Failed to store clipboard text");
                return;
            }
        };
        self.invalidate_cache(&outcome.evicted);

        debug!(
            id = outcome.id,
            inserted = outcome.inserted,
            threat_level = %outcome.threat_level,
            "Stored clipboard text"
        );
        self.emit(CaptureEvent::Text {
            id: outcome.id,
            content: content.clone(),
        });

        if threats.is_empty() || !self.security.notify_threats || self.is_dismissed(&content) {
            return;
        }
        info!(count = threats.len(), "Sensitive content captured");
        self.emit(CaptureEvent::SecurityThreat { content, threats });
    }

    fn handle_image(&self, payload: Vec<u8>) {
        let description = describe_image(&payload);
        let outcome = match self.storage.add_image(&payload, &description) {
            Ok(Some(outcome)) => outcome,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Failed to store clipboard image");
                return;
            }
        };
        self.invalidate_cache(&outcome.evicted);

        debug!(id = outcome.id, inserted = outcome.inserted, %description, "Stored clipboard image");
        self.emit(CaptureEvent::Image {
            id: outcome.id,
            payload,
            description,
        });
    }

    /// Whether the user has dismissed this content before.
    ///
    /// Lookup failures count as "not dismissed".
    fn is_dismissed(&self, content: &str) -> bool {
        let Some(memory) = &self.memory else {
            return false;
        };
        match memory.has(&ThreatMemory::content_hash(content)) {
            Ok(found) => {
                if found {
                    debug!("Threat previously dismissed, not notifying");
                }
                found
            }
            Err(e) => {
                warn!(error = %e, "Threat memory lookup failed");
                false
            }
        }
    }

    fn invalidate_cache(&self, evicted: &[i64]) {
        if let Some(cache) = &self.cache {
            cache.invalidate(evicted);
        }
    }

    fn emit(&self, event: CaptureEvent) {
        // Nobody listening is fine; the capture is already stored.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ClipboardSnapshot;
    use crate::monitor::testing::ScriptedBackend;
    use crate::security::{ThreatLevel, ThreatType};

    const TICK: Duration = Duration::from_millis(100);

    fn github_token() -> String {
        format!("ghp_{}", "k".repeat(36))
    }

    fn setup() -> (Arc<Storage>, ScriptedBackend) {
        let storage = Arc::new(Storage::open_in_memory(0).unwrap());
        (storage, ScriptedBackend::new(TICK))
    }

    async fn drain(handle: PipelineHandle, mut events: CaptureEvents) -> Vec<CaptureEvent> {
        handle.shutdown().await;
        let mut rest = Vec::new();
        while let Some(event) = events.next().await {
            rest.push(event);
        }
        rest
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_is_stored_after_window() {
        let (storage, backend) = setup();
        backend.push(ClipboardSnapshot::text("hello"));

        let (handle, mut events) =
            Pipeline::new(&Config::default(), Arc::clone(&storage)).start(Box::new(backend));
        assert_eq!(handle.backend_name(), "scripted");

        let event = events.next().await.unwrap();
        let CaptureEvent::Text { id, content } = event else {
            panic!("expected text event, got {event:?}");
        };
        assert_eq!(content, "hello");
        assert_eq!(storage.get_by_id(id).unwrap().unwrap().content, "hello");

        assert!(drain(handle, events).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drag_selection_collapses_to_final_value() {
        let (storage, backend) = setup();
        for value in ["n", "no", "not", "not found"] {
            backend.push(ClipboardSnapshot::text(value));
        }

        let (handle, mut events) =
            Pipeline::new(&Config::default(), Arc::clone(&storage)).start(Box::new(backend));

        let event = events.next().await.unwrap();
        assert!(matches!(event, CaptureEvent::Text { ref content, .. } if content == "not found"));
        assert!(drain(handle, events).await.is_empty());

        let items = storage.get_all_meta().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].content, "not found");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrelated_change_passes_through() {
        let (storage, backend) = setup();
        backend.push(ClipboardSnapshot::text("hello"));

        let (handle, mut events) =
            Pipeline::new(&Config::default(), Arc::clone(&storage)).start(Box::new(backend.clone()));
        events.next().await.unwrap();

        let start = tokio::time::Instant::now();
        backend.push(ClipboardSnapshot::text("goodbye"));
        let event = events.next().await.unwrap();
        assert!(matches!(event, CaptureEvent::Text { ref content, .. } if content == "goodbye"));
        // Emitted on the next tick, not after a full window.
        assert!(start.elapsed() <= TICK);

        drain(handle, events).await;
        assert_eq!(storage.count().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_threat_event_after_text() {
        let (storage, backend) = setup();
        backend.push(ClipboardSnapshot::text(github_token()));

        let (handle, mut events) =
            Pipeline::new(&Config::default(), Arc::clone(&storage)).start(Box::new(backend));

        let CaptureEvent::Text { id, .. } = events.next().await.unwrap() else {
            panic!("expected text event");
        };
        let CaptureEvent::SecurityThreat { content, threats } = events.next().await.unwrap()
        else {
            panic!("expected threat event");
        };
        assert_eq!(content, github_token());
        assert!(threats.iter().any(|t| t.threat_type == ThreatType::ApiKey));

        let item = storage.get_by_id(id).unwrap().unwrap();
        assert_eq!(item.threat_level, ThreatLevel::High);
        assert!(!item.safe_entry);

        drain(handle, events).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismissed_threat_is_not_reported() {
        let (storage, backend) = setup();
        let memory = Arc::new(ThreatMemory::open_in_memory().unwrap());
        let threats = storage.classifier().classify(&github_token());
        assert!(memory.dismiss(&github_token(), &threats).unwrap());
        backend.push(ClipboardSnapshot::text(github_token()));

        let (handle, mut events) = Pipeline::new(&Config::default(), Arc::clone(&storage))
            .with_memory(memory)
            .start(Box::new(backend));

        assert!(matches!(events.next().await.unwrap(), CaptureEvent::Text { .. }));
        assert!(drain(handle, events).await.is_empty());

        // Still stored with its threat level.
        assert_eq!(storage.stats().unwrap().unsafe_items, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_security_disabled_stores_as_safe() {
        let (storage, backend) = setup();
        backend.push(ClipboardSnapshot::text(github_token()));

        let mut config = Config::default();
        config.security.enabled = false;
        let (handle, mut events) =
            Pipeline::new(&config, Arc::clone(&storage)).start(Box::new(backend));

        let CaptureEvent::Text { id, .. } = events.next().await.unwrap() else {
            panic!("expected text event");
        };
        assert!(drain(handle, events).await.is_empty());

        let item = storage.get_by_id(id).unwrap().unwrap();
        assert_eq!(item.threat_level, ThreatLevel::None);
        assert!(item.safe_entry);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notifications_can_be_muted() {
        let (storage, backend) = setup();
        backend.push(ClipboardSnapshot::text(github_token()));

        let mut config = Config::default();
        config.security.notify_threats = false;
        let (handle, mut events) =
            Pipeline::new(&config, Arc::clone(&storage)).start(Box::new(backend));

        assert!(matches!(events.next().await.unwrap(), CaptureEvent::Text { .. }));
        assert!(drain(handle, events).await.is_empty());
        assert_eq!(storage.stats().unwrap().unsafe_items, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_is_stored_immediately() {
        let (storage, backend) = setup();
        let payload = vec![7u8; 64];
        backend.push(ClipboardSnapshot::image(payload.clone()));

        let (handle, mut events) =
            Pipeline::new(&Config::default(), Arc::clone(&storage)).start(Box::new(backend));

        let event = events.next().await.unwrap();
        let CaptureEvent::Image {
            id,
            payload: received,
            description,
        } = event
        else {
            panic!("expected image event, got {event:?}");
        };
        assert_eq!(received, payload);
        assert_eq!(description, "Image (64 B)");
        assert_eq!(storage.get_image(id).unwrap(), Some(payload));

        drain(handle, events).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_invalidated_on_write() {
        let (storage, backend) = setup();
        let cache = Arc::new(ItemCache::new(
            Arc::clone(&storage),
            Duration::from_secs(3600),
            8,
        ));
        assert!(cache.metadata().get().unwrap().is_empty());
        backend.push(ClipboardSnapshot::text("cached"));

        let (handle, mut events) = Pipeline::new(&Config::default(), Arc::clone(&storage))
            .with_cache(Arc::clone(&cache))
            .start(Box::new(backend));
        events.next().await.unwrap();

        assert!(!cache.metadata().is_fresh());
        assert_eq!(cache.metadata().get().unwrap().len(), 1);
        drain(handle, events).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_failure_is_skipped() {
        let (storage, backend) = setup();
        backend.push_failure();
        backend.push(ClipboardSnapshot::text("after failure"));

        let (handle, mut events) =
            Pipeline::new(&Config::default(), Arc::clone(&storage)).start(Box::new(backend));

        let event = events.next().await.unwrap();
        assert!(matches!(event, CaptureEvent::Text { ref content, .. } if content == "after failure"));
        drain(handle, events).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_backend_and_drops_pending() {
        let (storage, backend) = setup();
        let shutdowns = Arc::clone(&backend.shutdowns);
        backend.push(ClipboardSnapshot::text("pending"));

        let (handle, events) =
            Pipeline::new(&Config::default(), Arc::clone(&storage)).start(Box::new(backend));
        assert!(handle.is_running());

        // Let the first read land in the stabilizer, well inside the window.
        tokio::time::sleep(TICK).await;
        assert!(drain(handle, events).await.is_empty());

        assert_eq!(*shutdowns.lock(), 1);
        assert_eq!(storage.count().unwrap(), 0);
    }
}
