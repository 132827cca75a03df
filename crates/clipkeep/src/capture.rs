//! Core capture types for clipkeep.
//!
//! This module defines the records that flow through the pipeline: raw
//! clipboard snapshots read by a backend, and the [`ClipboardItem`] rows the
//! store keeps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::security::ThreatLevel;

/// The kind of payload a history item holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Plain text.
    Text,
    /// An image; `content` holds a human-readable description.
    Image,
}

impl ContentType {
    /// The string stored in the database.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
        }
    }

    /// Parse the database representation.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A captured clipboard history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardItem {
    /// Unique identifier, increasing with creation order.
    pub id: i64,

    /// Text payload, or a description for images.
    pub content: String,

    /// What kind of payload this is.
    pub content_type: ContentType,

    /// Image bytes; only loaded by full reads.
    #[serde(skip)]
    pub image_payload: Option<Vec<u8>>,

    /// Size of the image payload in bytes, if this is an image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_size: Option<usize>,

    /// BLAKE3 hash of the deduplication key.
    pub content_hash: String,

    /// When the content was first captured.
    pub created_at: DateTime<Utc>,

    /// When the content was last captured.
    pub last_seen_at: DateTime<Utc>,

    /// Classified sensitivity.
    pub threat_level: ThreatLevel,

    /// False for medium and high threat levels unless overridden.
    pub safe_entry: bool,

    /// Whether the item is pinned above the history.
    pub is_pinned: bool,

    /// Position among pinned items (1-based), 0 when unpinned.
    pub pin_order: u32,
}

impl ClipboardItem {
    /// Whether this item holds an image.
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.content_type == ContentType::Image
    }

    /// A single-line preview of the content, at most `max_chars` long.
    #[must_use]
    pub fn preview(&self, max_chars: usize) -> String {
        let line = self.content.trim().lines().next().unwrap_or_default();
        if line.chars().count() > max_chars {
            let mut cut: String = line.chars().take(max_chars.saturating_sub(1)).collect();
            cut.push('…');
            cut
        } else {
            line.to_string()
        }
    }
}

/// The clipboard contents read by a backend on one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClipboardSnapshot {
    /// Text on the clipboard, if any.
    pub text: Option<String>,
    /// Image bytes on the clipboard, if any.
    pub image: Option<Vec<u8>>,
}

impl ClipboardSnapshot {
    /// A snapshot holding only text.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            image: None,
        }
    }

    /// A snapshot holding only an image.
    #[must_use]
    pub fn image(bytes: Vec<u8>) -> Self {
        Self {
            text: None,
            image: Some(bytes),
        }
    }

    /// Whether the snapshot carries nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.image.is_none()
    }
}

/// A changed clipboard value forwarded by the monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawCapture {
    /// New clipboard text.
    Text(String),
    /// New clipboard image bytes.
    Image(Vec<u8>),
}

/// Normalize text for deduplication: surrounding whitespace is ignored.
#[must_use]
pub fn normalize_text(content: &str) -> &str {
    content.trim()
}

/// Compute the BLAKE3 hash of normalized text.
#[must_use]
pub fn text_hash(content: &str) -> String {
    blake3::hash(normalize_text(content).as_bytes())
        .to_hex()
        .to_string()
}

/// Compute the BLAKE3 hash of raw bytes.
#[must_use]
pub fn bytes_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Human-readable description used as the content of image items.
#[must_use]
pub fn describe_image(bytes: &[u8]) -> String {
    format!("Image ({})", format_size(bytes.len()))
}

#[allow(clippy::cast_precision_loss)]
fn format_size(len: usize) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    let size = len as f64;
    if size >= MB {
        format!("{:.1} MB", size / MB)
    } else if size >= KB {
        format!("{:.1} KB", size / KB)
    } else {
        format!("{len} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_item(content: &str) -> ClipboardItem {
        let now = Utc::now();
        ClipboardItem {
            id: 1,
            content: content.to_string(),
            content_type: ContentType::Text,
            image_payload: None,
            image_size: None,
            content_hash: text_hash(content),
            created_at: now,
            last_seen_at: now,
            threat_level: ThreatLevel::None,
            safe_entry: true,
            is_pinned: false,
            pin_order: 0,
        }
    }

    #[test]
    fn test_content_type_display() {
        assert_eq!(ContentType::Text.to_string(), "text");
        assert_eq!(ContentType::Image.to_string(), "image");
    }

    #[test]
    fn test_content_type_parse() {
        assert_eq!(ContentType::parse("text"), Some(ContentType::Text));
        assert_eq!(ContentType::parse("image"), Some(ContentType::Image));
        assert_eq!(ContentType::parse("video"), None);
    }

    #[test]
    fn test_text_hash_ignores_surrounding_whitespace() {
        assert_eq!(text_hash("hello"), text_hash("  hello\n"));
        assert_ne!(text_hash("hello"), text_hash("hello world"));
    }

    #[test]
    fn test_text_hash_keeps_inner_whitespace() {
        assert_ne!(text_hash("a b"), text_hash("a  b"));
    }

    #[test]
    fn test_bytes_hash_exact() {
        assert_eq!(bytes_hash(&[1, 2, 3]), bytes_hash(&[1, 2, 3]));
        assert_ne!(bytes_hash(&[1, 2, 3]), bytes_hash(&[1, 2, 3, 0]));
    }

    #[test]
    fn test_describe_image() {
        assert_eq!(describe_image(&[0; 512]), "Image (512 B)");
        assert_eq!(describe_image(&vec![0; 1536]), "Image (1.5 KB)");
        assert_eq!(describe_image(&vec![0; 3 * 1024 * 1024]), "Image (3.0 MB)");
    }

    #[test]
    fn test_snapshot_constructors() {
        assert!(ClipboardSnapshot::default().is_empty());
        assert_eq!(ClipboardSnapshot::text("x").text.as_deref(), Some("x"));
        assert!(ClipboardSnapshot::image(vec![1]).text.is_none());
    }

    #[test]
    fn test_item_preview() {
        let item = sample_item("  first line\nsecond line");
        assert_eq!(item.preview(40), "first line");

        let item = sample_item("abcdefghij");
        assert_eq!(item.preview(5), "abcd…");
    }

    #[test]
    fn test_item_serialization_skips_payload() {
        let mut item = sample_item("hello");
        item.image_payload = Some(vec![1, 2, 3]);
        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("\"content_type\":\"text\""));
        assert!(!json.contains("image_payload"));
        assert!(!json.contains("image_size"));
    }
}
