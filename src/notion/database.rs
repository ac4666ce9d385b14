//! Cloning of databases embedded in a template page.
//!
//! Embedded databases cannot ride the block-append path; they are separate
//! resources. The ids are collected from the original (unhydrated) template
//! tree, then each one is recreated under the target page: schema first,
//! rows second. One failed clone never aborts the others.

use anyhow::Result;
use serde_json::{json, Value};
use tracing::{error, info};

use super::block::{Block, BlockType};
use super::client::NotionClient;

/// Gather every embedded database id in the tree, depth-first, deduplicated
/// by id, preserving first-seen order.
pub fn collect_child_databases(blocks: &[Block]) -> Vec<String> {
    let mut out = Vec::new();
    walk(blocks, &mut out);
    out
}

fn walk(blocks: &[Block], out: &mut Vec<String>) {
    for block in blocks {
        if block.block_type == BlockType::ChildDatabase {
            if let Some(id) = &block.id {
                if !out.iter().any(|seen| seen == id) {
                    out.push(id.clone());
                }
            }
        }
        walk(&block.children, out);
    }
}

/// Create a schema-equivalent copy of a database under the target page,
/// returning the new database id.
pub async fn clone_database(
    client: &NotionClient,
    source_db_id: &str,
    parent_page_id: &str,
    title: &str,
) -> Result<String> {
    let properties = client.retrieve_database_properties(source_db_id).await?;
    client
        .create_database(parent_page_id, title, &properties)
        .await
}

/// Copy every row from the source database into the destination. Row order
/// is not significant; rows land in query order.
pub async fn clone_database_rows(
    client: &NotionClient,
    source_db_id: &str,
    dest_db_id: &str,
) -> Result<()> {
    let mut cursor: Option<String> = None;
    loop {
        let page = client.query_database(source_db_id, cursor.as_deref()).await?;
        for row in &page.results {
            let properties = row.get("properties").cloned().unwrap_or(json!({}));
            client.create_database_row(dest_db_id, &properties).await?;
        }
        if !page.has_more {
            break;
        }
        cursor = page.next_cursor;
    }
    Ok(())
}

/// Clone each embedded database under the target page. Failures are logged
/// per database and do not stop the remaining clones. Returns the number of
/// successful clones.
pub async fn clone_all(
    client: &NotionClient,
    source_ids: &[String],
    parent_page_id: &str,
) -> usize {
    let mut cloned = 0;
    for (index, db_id) in source_ids.iter().enumerate() {
        let title = format!("Cloned DB #{}", index + 1);
        let result = async {
            let new_id = clone_database(client, db_id, parent_page_id, &title).await?;
            clone_database_rows(client, db_id, &new_id).await?;
            Ok::<String, anyhow::Error>(new_id)
        }
        .await;

        match result {
            Ok(new_id) => {
                info!("Cloned database {} as {} ({})", db_id, new_id, title);
                cloned += 1;
            }
            Err(e) => error!("Database clone failed for {}: {:#}", db_id, e),
        }
    }
    cloned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_block(id: &str) -> Block {
        let mut block = Block::new(BlockType::ChildDatabase);
        block.id = Some(id.to_string());
        block
    }

    #[test]
    fn test_collect_depth_first_first_seen_order() {
        let mut toggle = Block::new(BlockType::Toggle);
        toggle.children.push(db_block("db-nested"));

        let blocks = vec![
            db_block("db-top"),
            toggle,
            db_block("db-top"), // duplicate reference
            db_block("db-last"),
        ];

        assert_eq!(
            collect_child_databases(&blocks),
            vec!["db-top", "db-nested", "db-last"]
        );
    }

    #[test]
    fn test_collect_ignores_databases_without_ids() {
        let blocks = vec![Block::new(BlockType::ChildDatabase)];
        assert!(collect_child_databases(&blocks).is_empty());
    }

    #[test]
    fn test_collect_empty_tree() {
        assert!(collect_child_databases(&[]).is_empty());
    }
}
