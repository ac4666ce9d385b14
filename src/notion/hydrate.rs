//! Schema repair and variable substitution for template blocks.
//!
//! Fetched template blocks are not directly acceptable to the creation API:
//! required fields may be absent, container types may be missing their
//! mandatory children, and text runs still carry `{{placeholder}}` markers.
//! Hydration rebuilds each block into a creatable form. It is total — a
//! block either hydrates to a new block or is dropped, never an error, so
//! one odd block cannot sink the whole tree.

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::block::{minimal_payload, Block, BlockType};

/// Fallback for resource blocks whose template lost its URL; the creation
/// API rejects an absent or empty `url`.
pub const PLACEHOLDER_URL: &str = "https://example.com/placeholder";

/// Hydrate a sequence of sibling blocks, dropping the ones that do not
/// survive. Sibling order is preserved.
pub fn hydrate_all(blocks: &[Block], vars: &HashMap<String, String>) -> Vec<Block> {
    blocks.iter().filter_map(|b| hydrate(b, vars)).collect()
}

/// Hydrate one block into a new, creatable block.
///
/// Returns `None` for unsupported and child-page blocks (and anything whose
/// type fell outside the catalog at parse time): there is no safe way to
/// recreate those, so the branch is dropped. An embedded database becomes a
/// placeholder paragraph here; the database itself is cloned separately
/// from the original tree.
pub fn hydrate(block: &Block, vars: &HashMap<String, String>) -> Option<Block> {
    match block.block_type {
        BlockType::ChildDatabase => {
            let title = block
                .payload
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or("Database");
            return Some(Block::paragraph(&format!(
                "[{}] database is cloned separately.",
                title
            )));
        }
        BlockType::Unsupported | BlockType::ChildPage => return None,
        _ => {}
    }

    let mut children = hydrate_all(&block.children, vars);
    let mut payload = block.payload.clone();

    // Fill required fields the template dropped.
    for (key, value) in minimal_payload(block.block_type) {
        payload.entry(key).or_insert(value);
    }

    // Container types must arrive with their mandatory children.
    match block.block_type {
        BlockType::ColumnList => {
            children.retain(|c| c.block_type == BlockType::Column);
            while children.len() < 2 {
                children.push(Block::new(BlockType::Column));
            }
        }
        BlockType::Table => {
            children.retain(|c| c.block_type == BlockType::TableRow);
            if children.is_empty() {
                children.push(default_table_row());
            }
        }
        _ => {}
    }

    if let Some(runs) = payload.get("rich_text") {
        let substituted = replace_rich_text(runs, vars);
        payload.insert("rich_text".to_string(), substituted);
    }

    if block.block_type == BlockType::ToDo && !payload.get("checked").map_or(false, Value::is_boolean)
    {
        payload.insert("checked".to_string(), Value::Bool(false));
    }

    // A malformed callout icon makes the whole create call fail; drop it.
    if block.block_type == BlockType::Callout
        && !payload.get("icon").map_or(true, Value::is_object)
    {
        payload.remove("icon");
    }

    if block.block_type.requires_url() {
        let has_url = payload
            .get("url")
            .and_then(Value::as_str)
            .map_or(false, |u| !u.is_empty());
        if !has_url {
            payload.insert(
                "url".to_string(),
                Value::String(PLACEHOLDER_URL.to_string()),
            );
        }
    }

    let payload = clean_nulls(payload);

    Some(Block {
        id: None,
        block_type: block.block_type,
        payload,
        children,
    })
}

fn default_table_row() -> Block {
    let mut row = Block::new(BlockType::TableRow);
    row.payload = minimal_payload(BlockType::TableRow);
    row
}

/// Substitute `{{key}}` markers for every key in the map. Markers whose key
/// is not in the map stay as they are.
fn substitute(text: &str, vars: &HashMap<String, String>) -> String {
    let mut out = text.to_string();
    for (key, value) in vars {
        let marker = format!("{{{{{}}}}}", key);
        if out.contains(&marker) {
            out = out.replace(&marker, value);
        }
    }
    out
}

/// Rebuild a rich-text array with substituted `text` run contents.
/// Non-array input collapses to an empty array; non-object entries are
/// dropped; runs of other kinds (mentions, equations) pass through.
fn replace_rich_text(runs: &Value, vars: &HashMap<String, String>) -> Value {
    let Some(items) = runs.as_array() else {
        return Value::Array(Vec::new());
    };

    let rebuilt = items
        .iter()
        .filter_map(|run| {
            let obj = run.as_object()?;
            if obj.get("type").and_then(Value::as_str) != Some("text") {
                return Some(run.clone());
            }

            let mut obj = obj.clone();
            let mut text = obj
                .get("text")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            let content = text
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default();
            text.insert(
                "content".to_string(),
                Value::String(substitute(content, vars)),
            );
            obj.insert("text".to_string(), Value::Object(text));
            Some(Value::Object(obj))
        })
        .collect();

    Value::Array(rebuilt)
}

/// Strip `null` fields recursively. Empty arrays and objects stay — some
/// block types require an empty-but-present field.
fn clean_nulls(payload: Map<String, Value>) -> Map<String, Value> {
    payload
        .into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k, clean_nulls_value(v)))
        .collect()
}

fn clean_nulls_value(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(clean_nulls(map)),
        Value::Array(items) => Value::Array(items.into_iter().map(clean_nulls_value).collect()),
        other => other,
    }
}
