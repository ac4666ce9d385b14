//! Tree reconstruction over the flat child-append API.
//!
//! The append endpoint only creates one shallow level at a time and, in
//! this flow, does not hand back ids correlatable to the submitted order.
//! [`append_tree`] rebuilds the full hierarchy anyway: append a batch,
//! re-list the parent and tail-match the newly created ids, then recurse
//! into each block's children under its recovered id. Column lists and
//! tables are the two container types the API insists on creating together
//! with their immediate children, so those are inlined at creation and
//! excluded from the recursive descent.

use anyhow::Result;
use serde_json::{json, Value};
use tracing::debug;

use super::block::{text_run, Block, BlockType};
use super::client::NotionClient;

/// Maximum blocks per append call, bounded by the API payload limit.
pub const APPEND_BATCH_SIZE: usize = 50;

/// Recursively create `blocks` (and their descendants) under `parent_id`,
/// preserving sibling order.
pub async fn append_tree(client: &NotionClient, parent_id: &str, blocks: &[Block]) -> Result<()> {
    if blocks.is_empty() {
        return Ok(());
    }

    let mut created_ids: Vec<String> = Vec::with_capacity(blocks.len());
    for batch in blocks.chunks(APPEND_BATCH_SIZE) {
        let payload: Vec<Value> = batch.iter().map(serialize_for_append).collect();
        client.append_children(parent_id, payload).await?;

        // Tail-matching id recovery: re-list the parent and take the
        // trailing N children as the ones just created. Valid only while
        // no concurrent writer appends to the same parent between the two
        // calls; each request owns its freshly created page, so nothing
        // else writes here until we return.
        let children = client.list_children_all(parent_id).await?;
        let take = batch.len().min(children.len());
        created_ids.extend(
            children[children.len() - take..]
                .iter()
                .filter_map(|c| c.get("id").and_then(Value::as_str).map(str::to_string)),
        );
    }

    debug!(
        "Appended {} blocks under {}, recovered {} ids",
        blocks.len(),
        parent_id,
        created_ids.len()
    );

    for (block, new_id) in blocks.iter().zip(created_ids.iter()) {
        match block.block_type {
            BlockType::ColumnList => {
                // Columns were created empty alongside the list; recover
                // their ids and attach each column's stashed children.
                let created_columns = client.list_children_all(new_id).await?;
                let columns = block
                    .children
                    .iter()
                    .filter(|c| c.block_type == BlockType::Column);
                for (idx, column) in columns.enumerate() {
                    if column.children.is_empty() {
                        continue;
                    }
                    let Some(column_id) = created_columns
                        .get(idx)
                        .and_then(|c| c.get("id"))
                        .and_then(Value::as_str)
                    else {
                        continue;
                    };
                    Box::pin(append_tree(client, column_id, &column.children)).await?;
                }
            }
            // Table rows were inlined at creation and rows carry no
            // children of their own; nothing left to attach.
            BlockType::Table => {}
            _ => {
                if !block.children.is_empty() {
                    Box::pin(append_tree(client, new_id, &block.children)).await?;
                }
            }
        }
    }

    Ok(())
}

/// Serialize one block for a shallow append call.
///
/// Plain blocks go out without children (they attach after id recovery).
/// A column_list must be created atomically with at least two columns, each
/// submitted empty; a table must be created with its rows inlined.
pub fn serialize_for_append(block: &Block) -> Value {
    let tag = block.block_type.as_tag();
    let mut payload = block.payload.clone();
    // Children never ride in the payload; anything left there is template
    // residue from the fetch shape.
    payload.remove("children");

    match block.block_type {
        BlockType::ColumnList => {
            let mut columns: Vec<Value> = block
                .children
                .iter()
                .filter(|c| c.block_type == BlockType::Column)
                .map(|c| {
                    let mut column = c.payload.clone();
                    column.insert("children".to_string(), json!([]));
                    json!({"object": "block", "type": "column", "column": Value::Object(column)})
                })
                .collect();
            while columns.len() < 2 {
                columns.push(json!({"object": "block", "type": "column", "column": {"children": []}}));
            }
            payload.insert("children".to_string(), Value::Array(columns));
        }
        BlockType::Table => {
            let mut rows: Vec<Value> = block
                .children
                .iter()
                .filter(|c| c.block_type == BlockType::TableRow)
                .map(|r| {
                    json!({"object": "block", "type": "table_row", "table_row": Value::Object(r.payload.clone())})
                })
                .collect();
            if rows.is_empty() {
                rows.push(json!({
                    "object": "block",
                    "type": "table_row",
                    "table_row": {"cells": [[text_run(" ")]]},
                }));
            }
            payload.insert("children".to_string(), Value::Array(rows));
        }
        _ => {}
    }

    json!({"object": "block", "type": tag, tag: Value::Object(payload)})
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notion::block::rich_text;

    fn paragraph_with_child() -> Block {
        let mut block = Block::paragraph("parent");
        block.children.push(Block::paragraph("child"));
        block
    }

    #[test]
    fn test_plain_block_serialized_without_children() {
        let value = serialize_for_append(&paragraph_with_child());
        assert_eq!(value["type"], "paragraph");
        assert!(value["paragraph"].get("children").is_none());
    }

    #[test]
    fn test_column_list_inlines_empty_columns() {
        let mut column = Block::new(BlockType::Column);
        column.children.push(Block::paragraph("inside"));
        let mut list = Block::new(BlockType::ColumnList);
        list.children = vec![column.clone(), column];

        let value = serialize_for_append(&list);
        let columns = value["column_list"]["children"].as_array().unwrap();
        assert_eq!(columns.len(), 2);
        for col in columns {
            assert_eq!(col["type"], "column");
            // Column contents attach after id recovery, never at creation.
            assert_eq!(col["column"]["children"], json!([]));
        }
    }

    #[test]
    fn test_column_list_padded_to_two() {
        let list = Block::new(BlockType::ColumnList);
        let value = serialize_for_append(&list);
        assert_eq!(value["column_list"]["children"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_table_inlines_rows() {
        let mut row = Block::new(BlockType::TableRow);
        row.payload
            .insert("cells".to_string(), json!([[text_run("day 1")]]));
        let mut table = Block::new(BlockType::Table);
        table.children.push(row);

        let value = serialize_for_append(&table);
        let rows = value["table"]["children"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0]["table_row"]["cells"][0][0]["text"]["content"],
            "day 1"
        );
    }

    #[test]
    fn test_table_without_rows_gets_default_row() {
        let value = serialize_for_append(&Block::new(BlockType::Table));
        let rows = value["table"]["children"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        let cells = rows[0]["table_row"]["cells"].as_array().unwrap();
        assert!(!cells[0].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_rich_text_payload_survives() {
        let mut block = Block::new(BlockType::Quote);
        block
            .payload
            .insert("rich_text".to_string(), rich_text("stay hungry"));
        let value = serialize_for_append(&block);
        assert_eq!(
            value["quote"]["rich_text"][0]["text"]["content"],
            "stay hungry"
        );
    }
}
