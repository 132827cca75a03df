//! In-memory caches in front of the history store.
//!
//! Readers such as a UI render loop hit these instead of the database:
//!
//! - [`MetadataCache`] holds a snapshot of every item without image payloads
//!   and reloads it once it is older than its TTL or has been invalidated.
//! - [`ImageCache`] holds decoded-size image payloads in an LRU keyed by item
//!   id, loading from the store on a miss.
//!
//! Both hand out owned copies so callers never hold a lock.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, trace};

use crate::capture::ClipboardItem;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::storage::Storage;

/// Default time-to-live for the metadata snapshot.
pub const DEFAULT_METADATA_TTL: Duration = Duration::from_secs(5);

/// Default number of cached image payloads.
pub const DEFAULT_IMAGE_CAPACITY: usize = 50;

struct Snapshot {
    items: Vec<ClipboardItem>,
    loaded_at: Instant,
}

impl Snapshot {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.loaded_at.elapsed() < ttl
    }
}

/// A TTL-bounded snapshot of item metadata.
pub struct MetadataCache {
    storage: Arc<Storage>,
    ttl: Duration,
    snapshot: RwLock<Option<Snapshot>>,
}

impl std::fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCache")
            .field("ttl", &self.ttl)
            .field("loaded", &self.snapshot.read().is_some())
            .finish_non_exhaustive()
    }
}

impl MetadataCache {
    /// Create an empty cache over `storage`.
    #[must_use]
    pub fn new(storage: Arc<Storage>, ttl: Duration) -> Self {
        Self {
            storage,
            ttl,
            snapshot: RwLock::new(None),
        }
    }

    /// The configured time-to-live.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get all items in display order, reloading if the snapshot is stale.
    ///
    /// # Errors
    ///
    /// Returns an error if a reload fails.
    pub fn get(&self) -> Result<Vec<ClipboardItem>> {
        {
            let guard = self.snapshot.read();
            if let Some(snapshot) = guard.as_ref().filter(|s| s.is_fresh(self.ttl)) {
                trace!("Metadata cache hit");
                return Ok(snapshot.items.clone());
            }
        }

        let mut guard = self.snapshot.write();
        // Another reader may have reloaded while we waited.
        if let Some(snapshot) = guard.as_ref().filter(|s| s.is_fresh(self.ttl)) {
            return Ok(snapshot.items.clone());
        }

        let items = self.storage.get_all_meta()?;
        debug!(count = items.len(), "Reloaded metadata cache");
        *guard = Some(Snapshot {
            items: items.clone(),
            loaded_at: Instant::now(),
        });
        Ok(items)
    }

    /// Reload the snapshot now.
    ///
    /// # Errors
    ///
    /// Returns an error if the reload fails; the old snapshot is kept.
    pub fn refresh(&self) -> Result<()> {
        // Hold the write lock across the load so a concurrent `invalidate`
        // cannot be overwritten by older rows.
        let mut guard = self.snapshot.write();
        let items = self.storage.get_all_meta()?;
        *guard = Some(Snapshot {
            items,
            loaded_at: Instant::now(),
        });
        Ok(())
    }

    /// Drop the snapshot so the next `get` reloads.
    pub fn invalidate(&self) {
        *self.snapshot.write() = None;
    }

    /// Whether a fresh snapshot is held.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.snapshot
            .read()
            .as_ref()
            .is_some_and(|s| s.is_fresh(self.ttl))
    }
}

/// Image cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImageCacheStats {
    /// Number of payloads cached.
    pub cached: usize,
    /// Maximum number of payloads.
    pub capacity: usize,
    /// `cached / capacity`.
    pub utilization: f64,
}

/// An LRU cache of image payloads keyed by item id.
pub struct ImageCache {
    storage: Arc<Storage>,
    entries: RwLock<LruCache<i64, Arc<[u8]>>>,
}

impl std::fmt::Debug for ImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.read();
        f.debug_struct("ImageCache")
            .field("cached", &entries.len())
            .field("capacity", &entries.cap())
            .finish_non_exhaustive()
    }
}

impl ImageCache {
    /// Create a cache holding at most `capacity` payloads (at least one).
    #[must_use]
    pub fn new(storage: Arc<Storage>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            storage,
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    /// Get the payload for an image item.
    ///
    /// A hit marks the entry most recently used. A miss loads from the store
    /// and may evict the least recently used entry. Returns `Ok(None)` for
    /// unknown ids and text items.
    ///
    /// # Errors
    ///
    /// Returns an error if loading from the store fails.
    pub fn get(&self, id: i64) -> Result<Option<Arc<[u8]>>> {
        if let Some(payload) = self.entries.write().get(&id) {
            trace!(id, "Image cache hit");
            return Ok(Some(Arc::clone(payload)));
        }

        let Some(payload) = self.storage.get_image(id)? else {
            return Ok(None);
        };
        let payload: Arc<[u8]> = payload.into();
        if let Some((evicted, _)) = self.entries.write().push(id, Arc::clone(&payload)) {
            if evicted != id {
                trace!(evicted, "Image cache evicted entry");
            }
        }
        Ok(Some(payload))
    }

    /// Load the given ids into the cache, skipping ones already present.
    ///
    /// Returns the number of payloads loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if loading from the store fails.
    pub fn preload(&self, ids: &[i64]) -> Result<usize> {
        let mut loaded = 0;
        for &id in ids {
            if self.contains(id) {
                continue;
            }
            if self.get(id)?.is_some() {
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    /// Remove an entry. Returns `true` if it was cached.
    pub fn evict(&self, id: i64) -> bool {
        self.entries.write().pop(&id).is_some()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Whether an id is cached. Does not change recency.
    #[must_use]
    pub fn contains(&self, id: i64) -> bool {
        self.entries.read().contains(&id)
    }

    /// Cached ids, most recently used first.
    #[must_use]
    pub fn cached_ids(&self) -> Vec<i64> {
        self.entries.read().iter().map(|(id, _)| *id).collect()
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> ImageCacheStats {
        let entries = self.entries.read();
        let cached = entries.len();
        let capacity = entries.cap().get();
        #[allow(clippy::cast_precision_loss)]
        let utilization = cached as f64 / capacity as f64;
        ImageCacheStats {
            cached,
            capacity,
            utilization,
        }
    }
}

/// Metadata and image caches over one store.
#[derive(Debug)]
pub struct ItemCache {
    metadata: MetadataCache,
    images: ImageCache,
}

impl ItemCache {
    /// Create both caches with the given settings.
    #[must_use]
    pub fn new(storage: Arc<Storage>, ttl: Duration, image_capacity: usize) -> Self {
        Self {
            metadata: MetadataCache::new(Arc::clone(&storage), ttl),
            images: ImageCache::new(storage, image_capacity),
        }
    }

    /// Create both caches from configuration.
    #[must_use]
    pub fn from_config(storage: Arc<Storage>, config: &CacheConfig) -> Self {
        Self::new(storage, config.metadata_ttl(), config.image_capacity)
    }

    /// The metadata cache.
    #[must_use]
    pub fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    /// The image cache.
    #[must_use]
    pub fn images(&self) -> &ImageCache {
        &self.images
    }

    /// Note a write to the store: drop the metadata snapshot and any cached
    /// payloads of removed items.
    pub fn invalidate(&self, removed: &[i64]) {
        self.metadata.invalidate();
        for &id in removed {
            self.images.evict(id);
        }
    }
}
