//! Marker grammar for pipeline result blocks.
//!
//! The backend encodes block type and storage location inside the
//! human-readable `content` string instead of structured fields. Two
//! generations of markers exist:
//!
//! - New format: `{{#T#:<filename>}}` for tables, `{{#I#:<filename>}}` for
//!   images, appended after a display phrase.
//! - Legacy format: a fixed display phrase (`📊 点击编辑关联表格 N (Excel)` /
//!   `🖼️ 点击查看高清原图 (Image)`) plus a `[#PDF-LOC:n#]` location marker.
//!
//! This module is the single parser for that grammar; one function per
//! production, so each can be tested independently and no call site inlines
//! its own regex.

use once_cell::sync::Lazy;
use regex::Regex;

/// New-format table marker: `{{#T#:<filename>}}`.
static TABLE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{#T#:(.*?)\}\}").unwrap());
/// New-format image marker: `{{#I#:<filename>}}`.
static IMAGE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{#I#:(.*?)\}\}").unwrap());
/// Legacy PDF location marker: `[#PDF-LOC:n#]`, 1-based.
static PDF_LOC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[#PDF-LOC:(\d+)#\]").unwrap());
/// Numeric table id inside the legacy table phrase.
static LEGACY_TABLE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"点击编辑关联表格\s*(\d+)").unwrap());
/// Leading section numbering on heading-derived names, e.g. `1.1.` or `2.3 `.
static NUMBERING_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\d+\.?\s*").unwrap());

/// Legacy image display phrase.
pub const LEGACY_IMAGE_PHRASE: &str = "🖼️ 点击查看高清原图";
/// New-format image display phrase.
pub const IMAGE_PHRASE: &str = "🖼️ 点击查看图片";
/// Legacy table display phrase (blocks start with it).
pub const LEGACY_TABLE_PHRASE: &str = "📊 点击编辑关联表格";
/// New-format table display phrase (blocks start with it).
pub const TABLE_PHRASE: &str = "📊 点击编辑表格";

/// Generic placeholder prefix the backend uses for unnamed tables.
pub const TABLE_PLACEHOLDER: &str = "表格";
/// Generic placeholder prefix the backend uses for unnamed images.
pub const IMAGE_PLACEHOLDER: &str = "图片";

/// Block kind recovered from a `content` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Text,
    Table,
    Image,
}

/// Classify a block's `content` string.
///
/// Precedence is fixed: image markers win over table markers, everything
/// unmarked is text. Exactly one kind per non-empty content.
pub fn classify(content: &str) -> BlockKind {
    if content.contains(LEGACY_IMAGE_PHRASE)
        || content.contains(IMAGE_PHRASE)
        || IMAGE_MARKER.is_match(content)
    {
        BlockKind::Image
    } else if content.starts_with(LEGACY_TABLE_PHRASE)
        || content.starts_with(TABLE_PHRASE)
        || TABLE_MARKER.is_match(content)
    {
        BlockKind::Table
    } else {
        BlockKind::Text
    }
}

/// Extract the filename from a new-format table marker.
pub fn table_marker_file(content: &str) -> Option<&str> {
    TABLE_MARKER
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty())
}

/// Extract the filename from a new-format image marker.
pub fn image_marker_file(content: &str) -> Option<&str> {
    IMAGE_MARKER
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty())
}

/// Extract the 1-based PDF location from a legacy `[#PDF-LOC:n#]` marker.
pub fn pdf_loc(content: &str) -> Option<u32> {
    PDF_LOC
        .captures(content)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Extract the numeric table id from the legacy table phrase.
pub fn legacy_table_id(content: &str) -> Option<u32> {
    LEGACY_TABLE_ID
        .captures(content)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Strip a leading section-numbering prefix (`1.1.`, `2.3 `) from a
/// heading-derived display name.
pub fn strip_numbering_prefix(name: &str) -> String {
    NUMBERING_PREFIX.replace(name, "").into_owned()
}
