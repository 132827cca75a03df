//! Persistent memory of dismissed threats.
//!
//! Content the user has explicitly dismissed is recorded by hash in its own
//! `SQLite` file. The pipeline consults it to keep already-dismissed content
//! from raising notifications again. Records are only ever created through
//! [`ThreatMemory::put`] or [`ThreatMemory::dismiss`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

use crate::capture::text_hash;
use crate::error::{Error, Result};
use crate::storage::{conversion_error, format_timestamp, parse_timestamp, UnknownValue};

use super::{highest_confidence, Threat, ThreatType, HIGH_RISK_CONFIDENCE};


const CREATE_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS security_hashes (
    hash TEXT PRIMARY KEY,
    threat_type TEXT NOT NULL,
    confidence REAL NOT NULL,
    reason TEXT NOT NULL,
    first_seen TEXT NOT NULL,
    last_seen TEXT NOT NULL,
    occurrence_count INTEGER NOT NULL DEFAULT 1
)
";

const CREATE_LAST_SEEN_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_security_hashes_last_seen ON security_hashes(last_seen)
";

/// A remembered threat.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreatRecord {
    /// Content digest; see [`ThreatMemory::content_hash`].
    pub hash: String,
    /// The kind of threat first recorded.
    pub threat_type: ThreatType,
    /// Highest confidence recorded.
    pub confidence: f32,
    /// Reason from the most recent sighting.
    pub reason: String,
    /// When the record was created.
    pub first_seen: DateTime<Utc>,
    /// When the record was last bumped.
    pub last_seen: DateTime<Utc>,
    /// Number of times the record was put.
    pub occurrence_count: u64,
}

/// Summary of the threat memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ThreatMemoryStats {
    /// Number of records.
    pub total: usize,
    /// Number of records per threat type.
    pub by_type: BTreeMap<ThreatType, usize>,
    /// Records with confidence above 0.8.
    pub high_confidence: usize,
}

/// Persistent memory of dismissed threats, keyed by content hash.
pub struct ThreatMemory {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for ThreatMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreatMemory")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl ThreatMemory {
    /// Open or create a threat memory database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::initialize(&conn)?;

        info!("Threat memory opened at {}", path.display());
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory threat memory, mainly for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        Self::initialize(&conn)?;
        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Mutex::new(conn),
        })
    }

    fn initialize(conn: &Connection) -> Result<()> {
        conn.execute(CREATE_TABLE, [])?;
        conn.execute(CREATE_LAST_SEEN_INDEX, [])?;
        Ok(())
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The key under which content is remembered: BLAKE3 of the trimmed text.
    #[must_use]
    pub fn content_hash(text: &str) -> String {
        text_hash(text)
    }

    /// Check whether a hash is remembered.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn has(&self, hash: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM security_hashes WHERE hash = ?1",
                [hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Get the record for a hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get(&self, hash: &str) -> Result<Option<ThreatRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                "SELECT hash, threat_type, confidence, reason, first_seen, last_seen, \
                 occurrence_count FROM security_hashes WHERE hash = ?1",
                [hash],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Remember a threat for a hash, or bump an existing record.
    ///
    /// A repeat put increments the count, keeps the highest confidence and
    /// replaces the reason with the latest one.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn put(&self, hash: &str, threat: &Threat) -> Result<()> {
        self.put_at(hash, threat, Utc::now())
    }

    /// Like [`put`](Self::put), with an explicit timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn put_at(&self, hash: &str, threat: &Threat, now: DateTime<Utc>) -> Result<()> {
        let now = format_timestamp(now);
        let conn = self.conn.lock();
        conn.execute(
            r"
            INSERT INTO security_hashes
                (hash, threat_type, confidence, reason, first_seen, last_seen, occurrence_count)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5, 1)
            ON CONFLICT(hash) DO UPDATE SET
                occurrence_count = occurrence_count + 1,
                confidence = MAX(confidence, excluded.confidence),
                reason = excluded.reason,
                last_seen = excluded.last_seen
            ",
            params![
                hash,
                threat.threat_type.as_str(),
                f64::from(threat.confidence),
                threat.reason,
                now,
            ],
        )?;
        debug!(hash, threat_type = %threat.threat_type, "Remembered threat");
        Ok(())
    }

    /// Remember `text` as dismissed, using its most confident threat.
    ///
    /// Returns `false` without writing anything when `threats` is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn dismiss(&self, text: &str, threats: &[Threat]) -> Result<bool> {
        let Some(threat) = highest_confidence(threats) else {
            return Ok(false);
        };
        self.put(&Self::content_hash(text), threat)?;
        Ok(true)
    }

    /// Forget a hash.
    ///
    /// Returns `true` if a record was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn remove(&self, hash: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let affected = conn.execute("DELETE FROM security_hashes WHERE hash = ?1", [hash])?;
        Ok(affected > 0)
    }

    /// List records, most recently seen first, optionally of one type.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_all(&self, threat_type: Option<ThreatType>) -> Result<Vec<ThreatRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT hash, threat_type, confidence, reason, first_seen, last_seen, \
             occurrence_count FROM security_hashes \
             WHERE ?1 IS NULL OR threat_type = ?1 \
             ORDER BY last_seen DESC, hash ASC",
        )?;
        let records = stmt
            .query_map([threat_type.map(|t| t.as_str())], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Remove records not seen within `age`.
    ///
    /// Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn cleanup_older_than(&self, age: Duration) -> Result<usize> {
        let cutoff = chrono::Duration::from_std(age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age));
        match cutoff {
            Some(cutoff) => self.cleanup_before(cutoff),
            None => Ok(0),
        }
    }

    /// Remove records last seen before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn cleanup_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM security_hashes WHERE last_seen < ?1",
            [format_timestamp(cutoff)],
        )?;
        if removed > 0 {
            info!(removed, "Cleaned up old threat records");
        }
        Ok(removed)
    }

    /// Summarize the memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<ThreatMemoryStats> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT threat_type, COUNT(*), SUM(confidence > ?1) \
             FROM security_hashes GROUP BY threat_type",
        )?;
        let rows = stmt
            // Stored values are widened from f32, so widen the threshold the
            // same way or a stored 0.8 compares above a literal 0.8.
            .query_map([f64::from(HIGH_RISK_CONFIDENCE)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut stats = ThreatMemoryStats::default();
        for (threat_type, count, high) in rows {
            let count = usize::try_from(count).unwrap_or(0);
            stats.total += count;
            stats.high_confidence += usize::try_from(high).unwrap_or(0);
            if let Some(threat_type) = ThreatType::parse(&threat_type) {
                *stats.by_type.entry(threat_type).or_default() += count;
            }
        }
        Ok(stats)
    }
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<ThreatRecord> {
    let threat_type: String = row.get(1)?;
    let confidence: f64 = row.get(2)?;
    let first_seen: String = row.get(4)?;
    let last_seen: String = row.get(5)?;
    let occurrence_count: i64 = row.get(6)?;
    #[allow(clippy::cast_possible_truncation)]
    let confidence = confidence as f32;

    Ok(ThreatRecord {
        hash: row.get(0)?,
        threat_type: ThreatType::parse(&threat_type).ok_or_else(|| {
            conversion_error(1, UnknownValue::new("threat type", threat_type.clone()))
        })?,
        confidence,
        reason: row.get(3)?,
        first_seen: parse_timestamp(&first_seen).map_err(|e| conversion_error(4, e))?,
        last_seen: parse_timestamp(&last_seen).map_err(|e| conversion_error(5, e))?,
        occurrence_count: u64::try_from(occurrence_count).unwrap_or(0),
    })
}
