//! Notion block data model.
//!
//! A [`Block`] is one unit of page content: a closed type tag, the
//! type-specific payload as raw JSON, and the fetched children. Payloads
//! stay as `serde_json` maps because the Notion block schema is open-ended
//! per type; the tag is what the rest of the pipeline dispatches on.

use serde_json::{json, Map, Value};

/// Closed catalog of block types this service knows how to create.
/// Anything else parses to [`BlockType::Unsupported`] and is dropped
/// during hydration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    Paragraph,
    Heading1,
    Heading2,
    Heading3,
    Quote,
    Callout,
    ToDo,
    Toggle,
    BulletedListItem,
    NumberedListItem,
    ColumnList,
    Column,
    Table,
    TableRow,
    ChildDatabase,
    ChildPage,
    Embed,
    Bookmark,
    Image,
    Video,
    Pdf,
    File,
    Audio,
    Unsupported,
}

impl BlockType {
    /// Parse a wire type tag. Unknown tags map to `Unsupported`.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "paragraph" => Self::Paragraph,
            "heading_1" => Self::Heading1,
            "heading_2" => Self::Heading2,
            "heading_3" => Self::Heading3,
            "quote" => Self::Quote,
            "callout" => Self::Callout,
            "to_do" => Self::ToDo,
            "toggle" => Self::Toggle,
            "bulleted_list_item" => Self::BulletedListItem,
            "numbered_list_item" => Self::NumberedListItem,
            "column_list" => Self::ColumnList,
            "column" => Self::Column,
            "table" => Self::Table,
            "table_row" => Self::TableRow,
            "child_database" => Self::ChildDatabase,
            "child_page" => Self::ChildPage,
            "embed" => Self::Embed,
            "bookmark" => Self::Bookmark,
            "image" => Self::Image,
            "video" => Self::Video,
            "pdf" => Self::Pdf,
            "file" => Self::File,
            "audio" => Self::Audio,
            _ => Self::Unsupported,
        }
    }

    /// Wire type tag, also the payload key inside a block object.
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::Paragraph => "paragraph",
            Self::Heading1 => "heading_1",
            Self::Heading2 => "heading_2",
            Self::Heading3 => "heading_3",
            Self::Quote => "quote",
            Self::Callout => "callout",
            Self::ToDo => "to_do",
            Self::Toggle => "toggle",
            Self::BulletedListItem => "bulleted_list_item",
            Self::NumberedListItem => "numbered_list_item",
            Self::ColumnList => "column_list",
            Self::Column => "column",
            Self::Table => "table",
            Self::TableRow => "table_row",
            Self::ChildDatabase => "child_database",
            Self::ChildPage => "child_page",
            Self::Embed => "embed",
            Self::Bookmark => "bookmark",
            Self::Image => "image",
            Self::Video => "video",
            Self::Pdf => "pdf",
            Self::File => "file",
            Self::Audio => "audio",
            Self::Unsupported => "unsupported",
        }
    }

    /// Block types whose payload must carry a non-empty `url` at creation.
    pub fn requires_url(&self) -> bool {
        matches!(
            self,
            Self::Embed
                | Self::Bookmark
                | Self::Image
                | Self::Video
                | Self::Pdf
                | Self::File
                | Self::Audio
        )
    }

    /// Block types that can hold the aside text at the top of a page.
    pub fn is_aside_candidate(&self) -> bool {
        matches!(self, Self::Quote | Self::Callout | Self::Paragraph)
    }
}

/// One block in the page tree.
///
/// `id` is present on blocks fetched from the API and absent on blocks we
/// are about to create. `payload` is the object stored under the type tag
/// key in the wire format; children live here as a real field, never inside
/// the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: Option<String>,
    pub block_type: BlockType,
    pub payload: Map<String, Value>,
    pub children: Vec<Block>,
}

impl Block {
    pub fn new(block_type: BlockType) -> Self {
        Self {
            id: None,
            block_type,
            payload: Map::new(),
            children: Vec::new(),
        }
    }

    /// Parse one block object as returned by the API.
    ///
    /// Returns `None` for anything that is not an object with a string
    /// `type` tag; such entries carry nothing we can create.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let tag = obj.get("type")?.as_str()?;
        let block_type = BlockType::from_tag(tag);

        let payload = obj
            .get(tag)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        Some(Self {
            id: obj.get("id").and_then(Value::as_str).map(str::to_string),
            block_type,
            payload,
            children: Vec::new(),
        })
    }

    /// Serialize as a bare creation object: `{object, type, <tag>: payload}`.
    /// Children are not included; the appender decides what to inline.
    pub fn to_create_value(&self) -> Value {
        let tag = self.block_type.as_tag();
        json!({
            "object": "block",
            "type": tag,
            tag: Value::Object(self.payload.clone()),
        })
    }

    /// A paragraph block carrying a single text run.
    pub fn paragraph(content: &str) -> Self {
        let mut block = Self::new(BlockType::Paragraph);
        block
            .payload
            .insert("rich_text".to_string(), rich_text(content));
        block
    }

    /// A bulleted list item carrying a single text run.
    pub fn bulleted_list_item(content: &str) -> Self {
        let mut block = Self::new(BlockType::BulletedListItem);
        block
            .payload
            .insert("rich_text".to_string(), rich_text(content));
        block
    }
}

/// A single `text` rich-text run.
pub fn text_run(content: &str) -> Value {
    json!({"type": "text", "text": {"content": content}})
}

/// A one-run rich-text array.
pub fn rich_text(content: &str) -> Value {
    Value::Array(vec![text_run(content)])
}

/// Required payload fields per block type, merged under whatever the
/// template already carries. Structural child requirements (column_list
/// columns, table rows) are enforced on `Block::children` by the hydrator,
/// not here.
pub fn minimal_payload(block_type: BlockType) -> Map<String, Value> {
    let value = match block_type {
        BlockType::Paragraph
        | BlockType::Heading1
        | BlockType::Heading2
        | BlockType::Heading3
        | BlockType::Quote
        | BlockType::Callout
        | BlockType::Toggle
        | BlockType::BulletedListItem
        | BlockType::NumberedListItem => json!({"rich_text": []}),
        BlockType::ToDo => json!({"rich_text": [], "checked": false}),
        BlockType::Table => json!({
            "table_width": 2,
            "has_column_header": false,
            "has_row_header": false,
        }),
        BlockType::TableRow => json!({"cells": [[text_run(" ")]]}),
        _ => json!({}),
    };
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_round_trip() {
        for tag in [
            "paragraph",
            "heading_2",
            "to_do",
            "column_list",
            "table_row",
            "child_database",
            "bookmark",
        ] {
            assert_eq!(BlockType::from_tag(tag).as_tag(), tag);
        }
    }

    #[test]
    fn test_unknown_tag_is_unsupported() {
        assert_eq!(BlockType::from_tag("synced_block"), BlockType::Unsupported);
        assert_eq!(BlockType::from_tag(""), BlockType::Unsupported);
    }

    #[test]
    fn test_from_value_reads_tagged_payload() {
        let value = json!({
            "object": "block",
            "id": "abc-123",
            "type": "to_do",
            "has_children": false,
            "to_do": {"rich_text": [], "checked": true},
        });
        let block = Block::from_value(&value).unwrap();
        assert_eq!(block.id.as_deref(), Some("abc-123"));
        assert_eq!(block.block_type, BlockType::ToDo);
        assert_eq!(block.payload.get("checked"), Some(&json!(true)));
        assert!(block.children.is_empty());
    }

    #[test]
    fn test_from_value_rejects_malformed() {
        assert!(Block::from_value(&json!("not a block")).is_none());
        assert!(Block::from_value(&json!({"id": "x"})).is_none());
        assert!(Block::from_value(&json!({"type": 42})).is_none());
    }

    #[test]
    fn test_to_create_value_shape() {
        let block = Block::paragraph("hi");
        let value = block.to_create_value();
        assert_eq!(value["object"], "block");
        assert_eq!(value["type"], "paragraph");
        assert_eq!(value["paragraph"]["rich_text"][0]["text"]["content"], "hi");
    }

    #[test]
    fn test_minimal_payload_to_do_has_checked() {
        let payload = minimal_payload(BlockType::ToDo);
        assert_eq!(payload.get("checked"), Some(&json!(false)));
    }

    #[test]
    fn test_minimal_payload_table_declares_shape() {
        let payload = minimal_payload(BlockType::Table);
        assert_eq!(payload.get("table_width"), Some(&json!(2)));
        assert_eq!(payload.get("has_column_header"), Some(&json!(false)));
    }
}
