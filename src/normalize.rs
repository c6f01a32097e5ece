//! Result normalization: raw pipeline blocks into typed text/table/image
//! buckets.
//!
//! Single home for the classification and path-derivation rules; every call
//! site goes through here. Everything is pure; callers pass the document
//! context in explicitly.

use crate::config::ClientConfig;
use crate::document::{
    BlockMetadata, DocumentDetails, DocumentSummary, ImageBlock, MarkerBlock, ResultBlock,
    TableBlock, TextBlock, TypedBlock,
};
use crate::marker::{self, BlockKind, IMAGE_PLACEHOLDER, TABLE_PLACEHOLDER};

/// Document identity needed to derive storage paths during normalization.
#[derive(Debug, Clone)]
pub struct NormalizeContext {
    pub agent_user_id: String,
    pub task_id: String,
    pub doc_name: String,
    pub physical_name: Option<String>,
    pub storage_root: String,
}

impl NormalizeContext {
    pub fn for_document(config: &ClientConfig, doc: &DocumentSummary) -> Self {
        Self {
            agent_user_id: config.agent_user_id.clone(),
            task_id: doc.id.clone(),
            doc_name: doc.name.clone(),
            physical_name: doc.physical_name.clone(),
            storage_root: config.storage_root.clone(),
        }
    }

    /// Base name used to synthesize legacy table file names: the physical
    /// name with the known result suffixes stripped, falling back to the
    /// upload name.
    fn base_name(&self) -> String {
        match &self.physical_name {
            Some(physical) => physical.replacen("_res.docx", "", 1).replacen(".docx", "", 1),
            None => self.doc_name.replacen(".docx", "", 1),
        }
    }

    fn relative_key(&self, table_path: &str) -> String {
        format!(
            "/save/{}/{}/{}",
            self.agent_user_id, self.task_id, table_path
        )
    }

    fn image_proxy_url(&self, file_name: &str) -> String {
        format!(
            "/api/image-proxy?path={}/save/{}/{}/img/{}",
            self.storage_root, self.agent_user_id, self.task_id, file_name
        )
    }
}

/// Classify and transform a raw result payload into display buckets.
///
/// Blocks with empty or missing content are dropped; every remaining block
/// lands in exactly one bucket. Both payload shapes are handled, dispatched
/// on the presence of an explicit `type` field.
pub fn normalize(blocks: &[ResultBlock], ctx: &NormalizeContext) -> DocumentDetails {
    let mut details = DocumentDetails::default();

    for block in blocks {
        match block {
            ResultBlock::Typed(item) => push_typed(&mut details, item),
            ResultBlock::Marker(item) => push_marker(&mut details, item, ctx),
        }
    }

    tracing::debug!(
        text = details.text.len(),
        tables = details.tables.len(),
        images = details.images.len(),
        "normalized result payload"
    );
    details
}

fn push_marker(details: &mut DocumentDetails, block: &MarkerBlock, ctx: &NormalizeContext) {
    let content = match block.content.as_deref() {
        Some(c) if !c.is_empty() => c,
        _ => return,
    };

    match marker::classify(content) {
        BlockKind::Text => {
            let index = details.text.len();
            details.text.push(TextBlock {
                id: block_id(block, "text", index),
                content: content.to_string(),
                page: 1,
                confidence: 0.9,
                metadata: BlockMetadata::from_block(block),
            });
        }
        BlockKind::Table => {
            let index = details.tables.len();
            details.tables.push(table_block(block, content, index, ctx));
        }
        BlockKind::Image => {
            let index = details.images.len();
            details.images.push(image_block(block, content, index, ctx));
        }
    }
}

fn table_block(
    block: &MarkerBlock,
    content: &str,
    index: usize,
    ctx: &NormalizeContext,
) -> TableBlock {
    let heading = block
        .heading_title
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    let mut display_name = heading
        .clone()
        .unwrap_or_else(|| format!("{} {}", TABLE_PLACEHOLDER, index + 1));

    let table_path = if let Some(file_name) = marker::table_marker_file(content) {
        // Headings that are just the generic placeholder carry no information;
        // the marker filename is more useful.
        if display_name.starts_with(TABLE_PLACEHOLDER) {
            display_name = file_name.to_string();
        }
        if file_name.contains('/') {
            file_name.to_string()
        } else {
            format!("table/{}", file_name)
        }
    } else {
        // Legacy phrase marker: synthesize the on-disk spreadsheet name from
        // the table id and the 0-based PDF location.
        let table_id = marker::legacy_table_id(content)
            .map(|id| id.to_string())
            .unwrap_or_else(|| (index + 1).to_string());
        let pdf_loc = marker::pdf_loc(content)
            .map(|loc| loc.saturating_sub(1).to_string())
            .unwrap_or_else(|| "0".to_string());
        format!(
            "table/{}_{}_table_{}.xlsx",
            ctx.base_name(),
            pdf_loc,
            table_id
        )
    };

    let relative_key = ctx.relative_key(&table_path);
    let display_name = marker::strip_numbering_prefix(&display_name);
    let original_name = heading.unwrap_or_else(|| display_name.clone());

    TableBlock {
        id: block_id(block, "table", index),
        display_name,
        page: 1,
        confidence: 0.9,
        table_path,
        original_name,
        relative_key,
        metadata: BlockMetadata::from_block(block),
    }
}

fn image_block(
    block: &MarkerBlock,
    content: &str,
    index: usize,
    ctx: &NormalizeContext,
) -> ImageBlock {
    let mut display_name = block
        .heading_title
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{} {}", IMAGE_PLACEHOLDER, index + 1));

    let (image_url, pdf_loc) = if let Some(file_name) = marker::image_marker_file(content) {
        if display_name.starts_with(IMAGE_PLACEHOLDER) {
            display_name = file_name.to_string();
        }
        (ctx.image_proxy_url(file_name), None)
    } else {
        // Legacy phrase marker. The location stays 1-based here: image files
        // on disk are numbered from the page they appear on, unlike table
        // exports. The filename template is a backend compatibility shim.
        let loc = marker::pdf_loc(content)
            .map(|n| n.to_string())
            .unwrap_or_else(|| (index + 1).to_string());
        let url = ctx.image_proxy_url(&legacy_image_file(&loc));
        (url, Some(loc))
    };

    ImageBlock {
        id: block_id(block, "image", index),
        display_name,
        page: 1,
        confidence: 0.9,
        image_url,
        pdf_loc,
        metadata: BlockMetadata::from_block(block),
    }
}

/// On-disk name the legacy OCR layout step gives extracted images.
fn legacy_image_file(pdf_loc: &str) -> String {
    format!("XA_certificate_{}_layout_det_res_1.png", pdf_loc)
}

fn block_id(block: &MarkerBlock, prefix: &str, index: usize) -> String {
    block
        .block_id
        .clone()
        .unwrap_or_else(|| format!("{}-{}", prefix, index))
}

fn push_typed(details: &mut DocumentDetails, item: &TypedBlock) {
    let page = item.page.unwrap_or(1);
    let confidence = item.confidence.unwrap_or(0.9);
    let content = item.content.clone().unwrap_or_default();

    match item.kind.as_str() {
        "text" => {
            let index = details.text.len();
            details.text.push(TextBlock {
                id: typed_id(item, "text", index),
                content,
                page,
                confidence,
                metadata: BlockMetadata::default(),
            });
        }
        "table" => {
            let index = details.tables.len();
            details.tables.push(TableBlock {
                id: typed_id(item, "table", index),
                display_name: content.clone(),
                page,
                confidence,
                // The typed shape carries no storage location.
                table_path: String::new(),
                original_name: content,
                relative_key: String::new(),
                metadata: BlockMetadata::default(),
            });
        }
        "image" => {
            let index = details.images.len();
            details.images.push(ImageBlock {
                id: typed_id(item, "image", index),
                display_name: content,
                page,
                confidence,
                image_url: item
                    .image_url
                    .clone()
                    .or_else(|| item.url.clone())
                    .unwrap_or_default(),
                pdf_loc: None,
                metadata: BlockMetadata::default(),
            });
        }
        other => {
            tracing::debug!(kind = other, "dropping block with unrecognized type");
        }
    }
}

fn typed_id(item: &TypedBlock, prefix: &str, index: usize) -> String {
    item.id
        .clone()
        .unwrap_or_else(|| format!("{}-{}", prefix, index))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> NormalizeContext {
        NormalizeContext {
            agent_user_id: "123".to_string(),
            task_id: "42".to_string(),
            doc_name: "doc.docx".to_string(),
            physical_name: Some("doc_res.docx".to_string()),
            storage_root: "/my-doc-system-uploads".to_string(),
        }
    }

    fn marker_block(content: &str) -> ResultBlock {
        ResultBlock::Marker(MarkerBlock {
            content: Some(content.to_string()),
            ..Default::default()
        })
    }

    #[test]
    fn test_classification_exclusivity() {
        let blocks = vec![
            marker_block("An ordinary paragraph."),
            marker_block("📊 点击编辑关联表格 1 (Excel)\n[#PDF-LOC:1#]"),
            marker_block("🖼️ 点击查看图片 (p.png){{#I#:p.png}}"),
            marker_block("📊 点击编辑表格 (t.xlsx){{#T#:t.xlsx}}"),
        ];
        let details = normalize(&blocks, &ctx());
        assert_eq!(details.text.len(), 1);
        assert_eq!(details.tables.len(), 2);
        assert_eq!(details.images.len(), 1);
        // Every non-empty block landed in exactly one bucket
        assert_eq!(
            details.text.len() + details.tables.len() + details.images.len(),
            blocks.len()
        );
    }

    #[test]
    fn test_empty_content_excluded() {
        let blocks = vec![
            ResultBlock::Marker(MarkerBlock::default()),
            ResultBlock::Marker(MarkerBlock {
                content: Some(String::new()),
                heading_title: Some("has a heading but no content".to_string()),
                ..Default::default()
            }),
        ];
        let details = normalize(&blocks, &ctx());
        assert!(details.is_empty());
    }

    #[test]
    fn test_legacy_table_path() {
        let blocks = vec![marker_block("📊 点击编辑关联表格 3 (Excel)\n[#PDF-LOC:5#]")];
        let details = normalize(&blocks, &ctx());
        let table = &details.tables[0];
        // PDF-LOC is 1-based in the marker, 0-based on disk
        assert_eq!(table.table_path, "table/doc_4_table_3.xlsx");
        assert_eq!(table.relative_key, "/save/123/42/table/doc_4_table_3.xlsx");
    }

    #[test]
    fn test_legacy_table_defaults_without_loc() {
        let blocks = vec![marker_block("📊 点击编辑关联表格 2 (Excel)")];
        let details = normalize(&blocks, &ctx());
        assert_eq!(details.tables[0].table_path, "table/doc_0_table_2.xlsx");
    }

    #[test]
    fn test_new_format_table_path() {
        let blocks = vec![marker_block(
            "📊 点击编辑表格 (foo_table_1.xlsx){{#T#:foo_table_1.xlsx}}",
        )];
        let details = normalize(&blocks, &ctx());
        assert_eq!(details.tables[0].table_path, "table/foo_table_1.xlsx");
    }

    #[test]
    fn test_new_format_table_path_verbatim_with_separator() {
        let blocks = vec![marker_block("📊 点击编辑表格 {{#T#:sub/dir/t.xlsx}}")];
        let details = normalize(&blocks, &ctx());
        assert_eq!(details.tables[0].table_path, "sub/dir/t.xlsx");
        assert_eq!(details.tables[0].relative_key, "/save/123/42/sub/dir/t.xlsx");
    }

    #[test]
    fn test_display_name_numbering_stripped() {
        let blocks = vec![ResultBlock::Marker(MarkerBlock {
            content: Some("📊 点击编辑关联表格 1 (Excel)\n[#PDF-LOC:1#]".to_string()),
            heading_title: Some("1.1.概述".to_string()),
            ..Default::default()
        })];
        let details = normalize(&blocks, &ctx());
        assert_eq!(details.tables[0].display_name, "概述");
        assert_eq!(details.tables[0].original_name, "1.1.概述");
    }

    #[test]
    fn test_placeholder_heading_replaced_by_marker_file() {
        let blocks = vec![ResultBlock::Marker(MarkerBlock {
            content: Some("📊 点击编辑表格 (t1.xlsx){{#T#:t1.xlsx}}".to_string()),
            heading_title: Some("表格 7".to_string()),
            ..Default::default()
        })];
        let details = normalize(&blocks, &ctx());
        assert_eq!(details.tables[0].display_name, "t1.xlsx");
    }

    #[test]
    fn test_new_format_image_url() {
        let blocks = vec![marker_block("🖼️ 点击查看图片 (fig.png){{#I#:fig.png}}")];
        let details = normalize(&blocks, &ctx());
        let image = &details.images[0];
        assert_eq!(
            image.image_url,
            "/api/image-proxy?path=/my-doc-system-uploads/save/123/42/img/fig.png"
        );
        assert_eq!(image.display_name, "fig.png");
        assert_eq!(image.pdf_loc, None);
    }

    #[test]
    fn test_legacy_image_loc_not_decremented() {
        let blocks = vec![marker_block("🖼️ 点击查看高清原图 (Image)\n[#PDF-LOC:2#]")];
        let details = normalize(&blocks, &ctx());
        let image = &details.images[0];
        assert_eq!(image.pdf_loc.as_deref(), Some("2"));
        assert!(image
            .image_url
            .ends_with("/img/XA_certificate_2_layout_det_res_1.png"));
    }

    #[test]
    fn test_metadata_carried_through() {
        let blocks = vec![ResultBlock::Marker(MarkerBlock {
            block_id: Some("b-9".to_string()),
            content: Some("plain text".to_string()),
            heading_title: Some("Heading".to_string()),
            heading_level: Some(2),
            char_start: Some(10),
            char_end: Some(20),
            ..Default::default()
        })];
        let details = normalize(&blocks, &ctx());
        let text = &details.text[0];
        assert_eq!(text.id, "b-9");
        assert_eq!(text.page, 1);
        assert_eq!(text.confidence, 0.9);
        assert_eq!(text.metadata.heading_level, Some(2));
        assert_eq!(text.metadata.char_start, Some(10));
    }

    #[test]
    fn test_typed_shape_field_mapping() {
        let payload = serde_json::json!([
            { "type": "text", "id": "t1", "content": "hello", "page": 3, "confidence": 0.7 },
            { "type": "table", "content": "Revenue" },
            { "type": "image", "content": "Figure", "url": "http://x/img.png" },
            { "type": "chart", "content": "dropped" }
        ]);
        let blocks: Vec<ResultBlock> = serde_json::from_value(payload).unwrap();
        let details = normalize(&blocks, &ctx());

        assert_eq!(details.text.len(), 1);
        assert_eq!(details.text[0].page, 3);
        assert_eq!(details.text[0].confidence, 0.7);

        assert_eq!(details.tables.len(), 1);
        assert_eq!(details.tables[0].page, 1);
        assert_eq!(details.tables[0].confidence, 0.9);

        assert_eq!(details.images.len(), 1);
        assert_eq!(details.images[0].image_url, "http://x/img.png");
    }

    #[test]
    fn test_untagged_discriminant_is_type_field() {
        // Without a `type` field the block takes the marker path even when
        // other typed-looking fields are present.
        let payload = serde_json::json!([
            { "block_id": "m1", "content": "some text", "page": 5 }
        ]);
        let blocks: Vec<ResultBlock> = serde_json::from_value(payload).unwrap();
        assert!(matches!(blocks[0], ResultBlock::Marker(_)));
        let details = normalize(&blocks, &ctx());
        assert_eq!(details.text[0].id, "m1");
        assert_eq!(details.text[0].page, 1);
    }
}
