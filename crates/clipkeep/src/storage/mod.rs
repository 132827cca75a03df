//! Storage layer for clipkeep.
//!
//! This module provides the `SQLite`-backed clipboard history: a
//! deduplicated, retention-bounded log of text and image items with pinning
//! and threat-level annotation.
//!
//! Every write runs inside one critical section on the connection mutex, so
//! the duplicate lookup, the insert-or-refresh and the retention sweep for a
//! capture are atomic with respect to other writers.

mod maintenance;
pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::Serialize;
use tracing::{debug, info, trace};

use crate::capture::{bytes_hash, text_hash, ClipboardItem, ContentType};
use crate::error::{Error, Result};
use crate::security::{SecurityClassifier, Threat, ThreatLevel};

pub use maintenance::{LevelCounts, RescanReport};

/// Maximum number of pinned items.
pub const MAX_PINNED: u32 = 10;

/// Columns selected for a full item read, in `row_to_item` order.
const FULL_COLUMNS: &str = "id, content, content_type, image_payload, length(image_payload), \
     content_hash, created_at, last_seen_at, threat_level, safe_entry, is_pinned, pin_order";

/// Columns selected for a metadata read; the payload is left out.
const META_COLUMNS: &str = "id, content, content_type, NULL, length(image_payload), \
     content_hash, created_at, last_seen_at, threat_level, safe_entry, is_pinned, pin_order";

/// Display order: pinned first by pin order, then most recently seen.
const ORDER_BY: &str = "ORDER BY is_pinned DESC, pin_order ASC, last_seen_at DESC, id DESC";

/// Format a timestamp for storage.
///
/// Fixed-width microsecond RFC 3339 in UTC, so text order equals time order.
pub(crate) fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
pub(crate) fn parse_timestamp(value: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc))
}

/// A stored value that does not map back to a known variant.
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub(crate) struct UnknownValue {
    kind: &'static str,
    value: String,
}

impl UnknownValue {
    pub(crate) fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

pub(crate) fn conversion_error(
    column: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Result of adding content to the history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddOutcome {
    /// The item holding the content.
    pub id: i64,
    /// True if a new row was created; false if an existing one was refreshed.
    pub inserted: bool,
    /// The item's threat level.
    pub threat_level: ThreatLevel,
    /// Items removed by the retention cap as a result of this insert.
    pub evicted: Vec<i64>,
}

/// Statistics about the history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    /// Total number of items stored.
    pub total_items: usize,
    /// Number of text items.
    pub text_items: usize,
    /// Number of image items.
    pub image_items: usize,
    /// Number of pinned items.
    pub pinned_items: usize,
    /// Number of items not marked safe.
    pub unsafe_items: usize,
    /// Total size of stored image payloads in bytes.
    pub image_bytes: u64,
    /// When the oldest item was last seen.
    pub oldest_item: Option<DateTime<Utc>>,
    /// When the newest item was last seen.
    pub newest_item: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

struct Inner {
    conn: Connection,
    last_stamp: Option<DateTime<Utc>>,
}

impl Inner {
    /// Hand out a timestamp strictly later than any handed out before.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now().trunc_subsecs(6);
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + chrono::Duration::microseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }
}

/// The clipboard history store.
pub struct Storage {
    path: PathBuf,
    max_items: usize,
    classifier: SecurityClassifier,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.path)
            .field("max_items", &self.max_items)
            .finish_non_exhaustive()
    }
}

impl Storage {
    /// Open or create a history database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// `max_items` caps the number of unpinned items kept; 0 means unlimited.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>, max_items: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening history database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        let storage = Self::from_connection(path, conn, max_items)?;
        info!("History database opened at {}", storage.path.display());
        Ok(storage)
    }

    /// Create an in-memory store, mainly for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory(max_items: usize) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        migrations::initialize_schema(&conn)?;
        Self::from_connection(PathBuf::from(":memory:"), conn, max_items)
    }

    fn from_connection(path: PathBuf, conn: Connection, max_items: usize) -> Result<Self> {
        // Resume the clock after the newest stored timestamp.
        let newest: Option<String> = conn
            .query_row(
                "SELECT MAX(last_seen_at) FROM items",
                [],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        let last_stamp = newest.and_then(|s| parse_timestamp(&s).ok());

        Ok(Self {
            path,
            max_items,
            classifier: SecurityClassifier::new(),
            inner: Mutex::new(Inner { conn, last_stamp }),
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The retention cap; 0 means unlimited.
    #[must_use]
    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// The classifier used for new and edited text.
    #[must_use]
    pub fn classifier(&self) -> &SecurityClassifier {
        &self.classifier
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock()
    }

    /// Add text to the history, classifying it if it is new.
    ///
    /// Returns `Ok(None)` for blank text. Re-adding existing content only
    /// refreshes its `last_seen_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn add_text(&self, content: &str) -> Result<Option<AddOutcome>> {
        self.add_text_with(content, || {
            ThreatLevel::from_threats(&self.classifier.classify(content))
        })
    }

    /// Add text that has already been classified.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn add_text_classified(
        &self,
        content: &str,
        threats: &[Threat],
    ) -> Result<Option<AddOutcome>> {
        self.add_text_with(content, || ThreatLevel::from_threats(threats))
    }

    fn add_text_with(
        &self,
        content: &str,
        level: impl FnOnce() -> ThreatLevel,
    ) -> Result<Option<AddOutcome>> {
        if content.trim().is_empty() {
            return Ok(None);
        }
        let hash = text_hash(content);
        self.insert_or_refresh(ContentType::Text, content, &hash, None, level)
            .map(Some)
    }

    /// Add an image to the history.
    ///
    /// Returns `Ok(None)` for an empty payload. Images are never classified.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn add_image(&self, payload: &[u8], description: &str) -> Result<Option<AddOutcome>> {
        if payload.is_empty() {
            return Ok(None);
        }
        let hash = bytes_hash(payload);
        self.insert_or_refresh(
            ContentType::Image,
            description,
            &hash,
            Some(payload),
            || ThreatLevel::None,
        )
        .map(Some)
    }

    fn insert_or_refresh(
        &self,
        content_type: ContentType,
        content: &str,
        hash: &str,
        payload: Option<&[u8]>,
        level: impl FnOnce() -> ThreatLevel,
    ) -> Result<AddOutcome> {
        let mut inner = self.lock();
        let stamp = format_timestamp(inner.next_timestamp());
        let tx = inner.conn.transaction()?;

        let existing: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, threat_level FROM items WHERE content_type = ?1 AND content_hash = ?2 \
                 ORDER BY last_seen_at DESC LIMIT 1",
                params![content_type.as_str(), hash],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((id, level)) = existing {
            tx.execute(
                "UPDATE items SET last_seen_at = ?1 WHERE id = ?2",
                params![stamp, id],
            )?;
            tx.commit()?;
            trace!(id, "Refreshed existing item");
            return Ok(AddOutcome {
                id,
                inserted: false,
                threat_level: ThreatLevel::parse(&level).unwrap_or_default(),
                evicted: Vec::new(),
            });
        }

        let threat_level = level();
        tx.execute(
            "INSERT INTO items (content, content_type, image_payload, content_hash, \
             created_at, last_seen_at, threat_level, safe_entry, is_pinned, pin_order) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6, ?7, 0, 0)",
            params![
                content,
                content_type.as_str(),
                payload,
                hash,
                stamp,
                threat_level.as_str(),
                threat_level.is_safe(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        let evicted = self.enforce_retention(&tx)?;
        tx.commit()?;

        debug!(id, %content_type, %threat_level, "Inserted item");
        if !evicted.is_empty() {
            debug!(count = evicted.len(), "Evicted items past the retention cap");
        }
        Ok(AddOutcome {
            id,
            inserted: true,
            threat_level,
            evicted,
        })
    }

    /// Delete the oldest unpinned rows until the cap is met.
    fn enforce_retention(&self, tx: &Transaction<'_>) -> Result<Vec<i64>> {
        if self.max_items == 0 {
            return Ok(Vec::new());
        }

        let pinned: i64 = tx.query_row(
            "SELECT COUNT(*) FROM items WHERE is_pinned = 1",
            [],
            |row| row.get(0),
        )?;
        let keep = to_i64(self.max_items).saturating_sub(pinned).max(0);

        let evicted: Vec<i64> = tx
            .prepare(
                "SELECT id FROM items WHERE is_pinned = 0 \
                 ORDER BY last_seen_at DESC, id DESC LIMIT -1 OFFSET ?1",
            )?
            .query_map([keep], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;

        for id in &evicted {
            tx.execute("DELETE FROM items WHERE id = ?1", [id])?;
        }
        Ok(evicted)
    }

    /// Get every item, with image payloads, in display order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_all(&self) -> Result<Vec<ClipboardItem>> {
        self.query_items(&format!("SELECT {FULL_COLUMNS} FROM items {ORDER_BY}"), [])
    }

    /// Get every item without image payloads, in display order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_all_meta(&self) -> Result<Vec<ClipboardItem>> {
        self.query_items(&format!("SELECT {META_COLUMNS} FROM items {ORDER_BY}"), [])
    }

    /// Get a window of items without image payloads, in display order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_page(&self, offset: usize, limit: usize) -> Result<Vec<ClipboardItem>> {
        self.query_items(
            &format!("SELECT {META_COLUMNS} FROM items {ORDER_BY} LIMIT ?1 OFFSET ?2"),
            [to_i64(limit), to_i64(offset)],
        )
    }

    fn query_items<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<ClipboardItem>> {
        let inner = self.lock();
        let mut stmt = inner.conn.prepare(sql)?;
        let items = stmt
            .query_map(params, row_to_item)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Get an item, with its image payload, by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_by_id(&self, id: i64) -> Result<Option<ClipboardItem>> {
        let inner = self.lock();
        let item = inner
            .conn
            .query_row(
                &format!("SELECT {FULL_COLUMNS} FROM items WHERE id = ?1"),
                [id],
                row_to_item,
            )
            .optional()?;
        Ok(item)
    }

    /// Get only the image payload of an item.
    ///
    /// Returns `Ok(None)` if the item does not exist or is not an image.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_image(&self, id: i64) -> Result<Option<Vec<u8>>> {
        let inner = self.lock();
        let payload: Option<Option<Vec<u8>>> = inner
            .conn
            .query_row(
                "SELECT image_payload FROM items WHERE id = ?1 AND content_type = 'image'",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(payload.flatten())
    }

    /// Replace the content of an item.
    ///
    /// Text is reclassified and its safe flag reset from the new level.
    /// For images only the description changes.
    ///
    /// # Errors
    ///
    /// Returns `ItemNotFound` for an unknown id, `EmptyContent` for blank
    /// text, `DuplicateContent` if another item already holds the new text,
    /// or a database error.
    pub fn update(&self, id: i64, content: &str) -> Result<()> {
        let mut inner = self.lock();
        let tx = inner.conn.transaction()?;

        let content_type: Option<String> = tx
            .query_row("SELECT content_type FROM items WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()?;
        let content_type = content_type
            .as_deref()
            .and_then(ContentType::parse)
            .ok_or(Error::ItemNotFound { id })?;

        match content_type {
            ContentType::Image => {
                tx.execute(
                    "UPDATE items SET content = ?1 WHERE id = ?2",
                    params![content, id],
                )?;
            }
            ContentType::Text => {
                if content.trim().is_empty() {
                    return Err(Error::EmptyContent { id });
                }
                let hash = text_hash(content);
                let clash: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM items WHERE content_type = 'text' AND content_hash = ?1 \
                         AND id != ?2 LIMIT 1",
                        params![hash, id],
                        |row| row.get(0),
                    )
                    .optional()?;
                if let Some(existing_id) = clash {
                    return Err(Error::DuplicateContent { existing_id });
                }

                let level = ThreatLevel::from_threats(&self.classifier.classify(content));
                tx.execute(
                    "UPDATE items SET content = ?1, content_hash = ?2, threat_level = ?3, \
                     safe_entry = ?4 WHERE id = ?5",
                    params![content, hash, level.as_str(), level.is_safe(), id],
                )?;
            }
        }

        tx.commit()?;
        debug!(id, "Updated item content");
        Ok(())
    }

    /// Override the safe flag of an item.
    ///
    /// The override sticks until the item's threat level changes: a later
    /// [`update`](Self::update) or a rescan that moves the level recomputes
    /// the flag, while a rescan that agrees with the stored level leaves it
    /// alone. A `none` row marked unsafe therefore stays unsafe.
    ///
    /// # Errors
    ///
    /// Returns `ItemNotFound` for an unknown id, or a database error.
    pub fn update_safe_flag(&self, id: i64, safe: bool) -> Result<()> {
        let inner = self.lock();
        let affected = inner.conn.execute(
            "UPDATE items SET safe_entry = ?1 WHERE id = ?2",
            params![safe, id],
        )?;
        if affected == 0 {
            return Err(Error::ItemNotFound { id });
        }
        Ok(())
    }

    /// Delete an item by id, closing any gap in the pin order.
    ///
    /// Returns `true` if an item was deleted, `false` if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete(&self, id: i64) -> Result<bool> {
        let mut inner = self.lock();
        let tx = inner.conn.transaction()?;

        let pin: Option<(bool, u32)> = tx
            .query_row(
                "SELECT is_pinned, pin_order FROM items WHERE id = ?1",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((is_pinned, pin_order)) = pin else {
            return Ok(false);
        };

        tx.execute("DELETE FROM items WHERE id = ?1", [id])?;
        if is_pinned {
            close_pin_gap(&tx, pin_order)?;
        }
        tx.commit()?;

        debug!(id, "Deleted item");
        Ok(true)
    }

    /// Pin an item after the currently pinned ones.
    ///
    /// Pinning an already pinned item does nothing.
    ///
    /// # Errors
    ///
    /// Returns `ItemNotFound` for an unknown id, `PinLimit` when
    /// [`MAX_PINNED`] items are already pinned, or a database error.
    pub fn pin(&self, id: i64) -> Result<()> {
        let mut inner = self.lock();
        let tx = inner.conn.transaction()?;

        let is_pinned: bool = tx
            .query_row("SELECT is_pinned FROM items WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()?
            .ok_or(Error::ItemNotFound { id })?;
        if is_pinned {
            return Ok(());
        }

        let (count, max_order): (u32, u32) = tx.query_row(
            "SELECT COUNT(*), COALESCE(MAX(pin_order), 0) FROM items WHERE is_pinned = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        if count >= MAX_PINNED {
            return Err(Error::PinLimit { max: MAX_PINNED });
        }

        tx.execute(
            "UPDATE items SET is_pinned = 1, pin_order = ?1 WHERE id = ?2",
            params![max_order + 1, id],
        )?;
        tx.commit()?;

        debug!(id, pin_order = max_order + 1, "Pinned item");
        Ok(())
    }

    /// Unpin an item, closing the gap in the pin order.
    ///
    /// Unpinning an item that is not pinned does nothing.
    ///
    /// # Errors
    ///
    /// Returns `ItemNotFound` for an unknown id, or a database error.
    pub fn unpin(&self, id: i64) -> Result<()> {
        let mut inner = self.lock();
        let tx = inner.conn.transaction()?;

        let (is_pinned, pin_order): (bool, u32) = tx
            .query_row(
                "SELECT is_pinned, pin_order FROM items WHERE id = ?1",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or(Error::ItemNotFound { id })?;
        if !is_pinned {
            return Ok(());
        }

        tx.execute(
            "UPDATE items SET is_pinned = 0, pin_order = 0 WHERE id = ?1",
            [id],
        )?;
        close_pin_gap(&tx, pin_order)?;
        tx.commit()?;

        debug!(id, "Unpinned item");
        Ok(())
    }

    /// Count items in the history.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count(&self) -> Result<usize> {
        let inner = self.lock();
        let count: i64 = inner
            .conn
            .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Get history statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let inner = self.lock();

        let (total, text, image, pinned, unsafe_items, image_bytes, oldest, newest): (
            i64,
            i64,
            i64,
            i64,
            i64,
            i64,
            Option<String>,
            Option<String>,
        ) = inner.conn.query_row(
            r"
            SELECT
                COUNT(*),
                COALESCE(SUM(content_type = 'text'), 0),
                COALESCE(SUM(content_type = 'image'), 0),
                COALESCE(SUM(is_pinned), 0),
                COALESCE(SUM(safe_entry = 0), 0),
                COALESCE(SUM(length(image_payload)), 0),
                MIN(last_seen_at),
                MAX(last_seen_at)
            FROM items
            ",
            [],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            },
        )?;
        drop(inner);

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        let as_usize = |n: i64| usize::try_from(n).unwrap_or(0);
        Ok(StorageStats {
            total_items: as_usize(total),
            text_items: as_usize(text),
            image_items: as_usize(image),
            pinned_items: as_usize(pinned),
            unsafe_items: as_usize(unsafe_items),
            image_bytes: u64::try_from(image_bytes).unwrap_or(0),
            oldest_item: oldest.and_then(|s| parse_timestamp(&s).ok()),
            newest_item: newest.and_then(|s| parse_timestamp(&s).ok()),
            db_size_bytes,
        })
    }
}

/// Shift pinned items after `removed_order` up by one.
fn close_pin_gap(tx: &Transaction<'_>, removed_order: u32) -> Result<()> {
    tx.execute(
        "UPDATE items SET pin_order = pin_order - 1 WHERE is_pinned = 1 AND pin_order > ?1",
        [removed_order],
    )?;
    Ok(())
}

/// Convert a database row to a `ClipboardItem`.
fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<ClipboardItem> {
    let content_type_str: String = row.get(2)?;
    let content_type = ContentType::parse(&content_type_str).ok_or_else(|| {
        conversion_error(2, UnknownValue::new("content type", content_type_str.clone()))
    })?;

    let image_size: Option<i64> = row.get(4)?;
    let created_at: String = row.get(6)?;
    let last_seen_at: String = row.get(7)?;
    let threat_level_str: String = row.get(8)?;
    let threat_level = ThreatLevel::parse(&threat_level_str).ok_or_else(|| {
        conversion_error(8, UnknownValue::new("threat level", threat_level_str.clone()))
    })?;

    Ok(ClipboardItem {
        id: row.get(0)?,
        content: row.get(1)?,
        content_type,
        image_payload: row.get(3)?,
        image_size: image_size.and_then(|n| usize::try_from(n).ok()),
        content_hash: row.get(5)?,
        created_at: parse_timestamp(&created_at).map_err(|e| conversion_error(6, e))?,
        last_seen_at: parse_timestamp(&last_seen_at).map_err(|e| conversion_error(7, e))?,
        threat_level,
        safe_entry: row.get(9)?,
        is_pinned: row.get(10)?,
        pin_order: row.get(11)?,
    })
}
