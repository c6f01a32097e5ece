//! Data model: documents as the backend lists them, raw result blocks as the
//! pipeline emits them, and the normalized typed content the UI consumes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which parse pipeline to submit a document to.
///
/// Smart parsing first checks whether the document was already parsed
/// (`/api/pipeline/run_check`); plain parsing submits unconditionally
/// (`/api/pipeline/run`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Smart,
    Plain,
}

/// Processing status reported by the document list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// One entry of `/api/document/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: String,
    pub name: String,
    /// User-assigned display name, if the document was renamed.
    #[serde(rename = "customName", default, skip_serializing_if = "Option::is_none")]
    pub custom_name: Option<String>,
    /// On-disk file name of the parse output (e.g. `XA_certificate_res.docx`).
    #[serde(
        rename = "physicalName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub physical_name: Option<String>,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub pages: u32,
    pub status: DocumentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<DocumentStatistics>,
}

impl DocumentSummary {
    /// File name to address pipeline outputs with: the physical name when the
    /// backend assigned one, otherwise the upload name.
    pub fn file_name(&self) -> &str {
        self.physical_name.as_deref().unwrap_or(&self.name)
    }
}

/// Per-document processing statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentStatistics {
    #[serde(default)]
    pub text_blocks_count: u32,
    #[serde(default)]
    pub tables_count: u32,
    #[serde(default)]
    pub images_count: u32,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub file_size_kb: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time_seconds: Option<u64>,
    /// Fields the backend adds that we pass through untouched.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

// ── Raw result payload ──────────────────────────────────────────────────────

/// One element of `/api/pipeline/result`.
///
/// The backend emits two shapes. The discriminant is the presence of an
/// explicit `type` field: items carrying it are the legacy top-level format
/// and map field-for-field; items without it encode their kind inside the
/// `content` string via sentinel markers (see [`crate::marker`]).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ResultBlock {
    Typed(TypedBlock),
    Marker(MarkerBlock),
}

/// Legacy top-level format: the item says what it is.
#[derive(Debug, Clone, Deserialize)]
pub struct TypedBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Marker format: heading-structured block whose `content` carries the
/// type information.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarkerBlock {
    #[serde(default)]
    pub block_id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub heading_title: Option<String>,
    #[serde(default)]
    pub heading_level: Option<u32>,
    #[serde(default)]
    pub heading_meta: Option<serde_json::Value>,
    #[serde(default)]
    pub char_start: Option<u64>,
    #[serde(default)]
    pub char_end: Option<u64>,
    #[serde(default)]
    pub line_start: Option<u64>,
    #[serde(default)]
    pub line_end: Option<u64>,
}

// ── Normalized content ──────────────────────────────────────────────────────

/// Source-position metadata carried through from a [`MarkerBlock`].
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct BlockMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading_level: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading_meta: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub char_start: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub char_end: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_start: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_end: Option<u64>,
}

impl BlockMetadata {
    pub fn from_block(block: &MarkerBlock) -> Self {
        Self {
            heading_title: block.heading_title.clone(),
            heading_level: block.heading_level,
            heading_meta: block.heading_meta.clone(),
            char_start: block.char_start,
            char_end: block.char_end,
            line_start: block.line_start,
            line_end: block.line_end,
        }
    }
}

/// A normalized text passage.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TextBlock {
    pub id: String,
    pub content: String,
    pub page: u32,
    pub confidence: f64,
    pub metadata: BlockMetadata,
}

/// A normalized table reference pointing at a stored spreadsheet.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TableBlock {
    pub id: String,
    /// Heading-derived name with numbering prefixes stripped.
    pub display_name: String,
    pub page: u32,
    pub confidence: f64,
    /// Path of the spreadsheet relative to the document's save directory.
    pub table_path: String,
    /// Name before display cleanup, used when renaming back.
    pub original_name: String,
    /// Storage key (`/save/<tenant>/<doc>/<table_path>`) correlating this
    /// table with later metadata updates.
    pub relative_key: String,
    pub metadata: BlockMetadata,
}

/// A normalized image reference served through the image proxy.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImageBlock {
    pub id: String,
    pub display_name: String,
    pub page: u32,
    pub confidence: f64,
    /// Relative proxy URL (`/api/image-proxy?path=...`).
    pub image_url: String,
    /// PDF location hint extracted from the legacy marker, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_loc: Option<String>,
    pub metadata: BlockMetadata,
}

/// Normalized parse result, bucketed by content kind.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DocumentDetails {
    pub text: Vec<TextBlock>,
    pub tables: Vec<TableBlock>,
    pub images: Vec<ImageBlock>,
}

impl DocumentDetails {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.tables.is_empty() && self.images.is_empty()
    }
}
