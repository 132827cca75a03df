//! Bulk maintenance over the whole history.
//!
//! These run on demand from the CLI and take the writer lock for their full
//! duration.

use std::collections::HashSet;

use rusqlite::{params, Transaction};
use serde::Serialize;
use tracing::{debug, info};

use crate::capture::{text_hash, ContentType};
use crate::error::Result;
use crate::security::ThreatLevel;

use super::Storage;

/// Number of items at each threat level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LevelCounts {
    /// Items with no findings.
    pub none: usize,
    /// Low-risk items.
    pub low: usize,
    /// Medium-risk items.
    pub medium: usize,
    /// High-risk items.
    pub high: usize,
}

impl LevelCounts {
    fn record(&mut self, level: ThreatLevel) {
        match level {
            ThreatLevel::None => self.none += 1,
            ThreatLevel::Low => self.low += 1,
            ThreatLevel::Medium => self.medium += 1,
            ThreatLevel::High => self.high += 1,
        }
    }

    /// Total number of items counted.
    #[must_use]
    pub fn total(&self) -> usize {
        self.none + self.low + self.medium + self.high
    }
}

/// Outcome of reclassifying every stored text item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RescanReport {
    /// Text items examined.
    pub scanned: usize,
    /// Level distribution before the rescan.
    pub before: LevelCounts,
    /// Level distribution after the rescan.
    pub after: LevelCounts,
    /// Items whose level went up.
    pub upgraded: usize,
    /// Items whose level went down.
    pub downgraded: usize,
    /// Items whose level stayed the same.
    pub unchanged: usize,
}

impl RescanReport {
    /// Number of items whose level changed.
    #[must_use]
    pub fn changed(&self) -> usize {
        self.upgraded + self.downgraded
    }
}

impl Storage {
    /// Remove rows whose content duplicates a more recently seen row.
    ///
    /// Text hashes are recomputed from the stored content, so rows written
    /// with a stale key are caught too. Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn deduplicate_existing(&self) -> Result<usize> {
        let mut inner = self.lock();
        let tx = inner.conn.transaction()?;

        let rows: Vec<(i64, String, String, String)> = tx
            .prepare(
                "SELECT id, content_type, content, content_hash FROM items \
                 ORDER BY last_seen_at DESC, id DESC",
            )?
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))?
            .collect::<std::result::Result<_, _>>()?;

        let mut seen = HashSet::new();
        let mut removed = 0;
        for (id, content_type, content, stored_hash) in rows {
            let hash = if ContentType::parse(&content_type) == Some(ContentType::Text) {
                text_hash(&content)
            } else {
                stored_hash.clone()
            };

            if seen.insert((content_type, hash.clone())) {
                if hash != stored_hash {
                    tx.execute(
                        "UPDATE items SET content_hash = ?1 WHERE id = ?2",
                        params![hash, id],
                    )?;
                }
            } else {
                tx.execute("DELETE FROM items WHERE id = ?1", [id])?;
                removed += 1;
            }
        }

        if removed > 0 {
            renumber_pins(&tx)?;
        }
        tx.commit()?;

        info!(removed, "Deduplicated history");
        Ok(removed)
    }

    /// Remove empty and/or single-character text rows.
    ///
    /// Content is trimmed before measuring, so whitespace-only rows count as
    /// empty. Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn prune_database(&self, empty: bool, single_char: bool) -> Result<usize> {
        if !empty && !single_char {
            return Ok(0);
        }

        let mut inner = self.lock();
        let tx = inner.conn.transaction()?;

        let rows: Vec<(i64, String)> = tx
            .prepare("SELECT id, content FROM items WHERE content_type = 'text'")?
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<_, _>>()?;

        let mut removed = 0;
        for (id, content) in rows {
            let len = content.trim().chars().count();
            if (empty && len == 0) || (single_char && len == 1) {
                tx.execute("DELETE FROM items WHERE id = ?1", [id])?;
                removed += 1;
            }
        }

        if removed > 0 {
            renumber_pins(&tx)?;
        }
        tx.commit()?;

        info!(removed, empty, single_char, "Pruned history");
        Ok(removed)
    }

    /// Reclassify every text item with the current classifier.
    ///
    /// Rows are only written when their level changes, so a manual safe-flag
    /// override survives a rescan that agrees with the stored level.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn rescan_security_threats(&self) -> Result<RescanReport> {
        let mut inner = self.lock();
        let tx = inner.conn.transaction()?;

        let rows: Vec<(i64, String, String)> = tx
            .prepare("SELECT id, content, threat_level FROM items WHERE content_type = 'text'")?
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<std::result::Result<_, _>>()?;

        let mut report = RescanReport::default();
        for (id, content, stored) in rows {
            let before = ThreatLevel::parse(&stored).unwrap_or_default();
            let after = ThreatLevel::from_threats(&self.classifier.classify(&content));

            report.scanned += 1;
            report.before.record(before);
            report.after.record(after);

            if after == before {
                report.unchanged += 1;
                continue;
            }
            if after > before {
                report.upgraded += 1;
            } else {
                report.downgraded += 1;
            }
            tx.execute(
                "UPDATE items SET threat_level = ?1, safe_entry = ?2 WHERE id = ?3",
                params![after.as_str(), after.is_safe(), id],
            )?;
            debug!(id, %before, %after, "Threat level changed");
        }
        tx.commit()?;

        info!(
            scanned = report.scanned,
            upgraded = report.upgraded,
            downgraded = report.downgraded,
            "Rescanned history"
        );
        Ok(report)
    }
}

/// Reassign pin orders as 1..=n, keeping their relative order.
fn renumber_pins(tx: &Transaction<'_>) -> Result<()> {
    let pinned: Vec<i64> = tx
        .prepare("SELECT id FROM items WHERE is_pinned = 1 ORDER BY pin_order ASC, id ASC")?
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<_, _>>()?;

    for (order, id) in (1_i64..).zip(pinned) {
        tx.execute(
            "UPDATE items SET pin_order = ?1 WHERE id = ?2",
            params![order, id],
        )?;
    }
    Ok(())
}
