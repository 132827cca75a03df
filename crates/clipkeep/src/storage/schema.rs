//! `SQLite` schema definitions for the clipboard history.

/// SQL statement to create the items table.
pub const CREATE_ITEMS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content TEXT NOT NULL,
    content_type TEXT NOT NULL,
    image_payload BLOB,
    content_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL,
    threat_level TEXT NOT NULL DEFAULT 'none',
    safe_entry INTEGER NOT NULL DEFAULT 1,
    is_pinned INTEGER NOT NULL DEFAULT 0,
    pin_order INTEGER NOT NULL DEFAULT 0
)
";

/// Index backing the (content type, content hash) duplicate lookup.
///
/// Deliberately not unique: databases written before duplicate detection
/// may hold duplicates until `deduplicate_existing` runs.
pub const CREATE_HASH_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_items_hash ON items(content_type, content_hash)
";

/// Index for recency ordering and retention.
pub const CREATE_LAST_SEEN_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_items_last_seen ON items(last_seen_at DESC)
";

/// Index for pinned item ordering.
pub const CREATE_PIN_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_items_pin ON items(is_pinned, pin_order)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_ITEMS_TABLE,
    CREATE_HASH_INDEX,
    CREATE_LAST_SEEN_INDEX,
    CREATE_PIN_INDEX,
    CREATE_METADATA_TABLE,
];
