//! Notion REST API client.
//!
//! Thin typed wrapper over the v1 endpoints this service touches: block
//! children listing/appending, page and database creation, block updates,
//! database schema reads and row queries. Every call surfaces non-success
//! statuses as errors with the response body attached.

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::block::{text_run, Block};

const NOTION_API_BASE: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";

/// One page of a cursor-paginated listing (block children or database
/// query rows share this envelope).
#[derive(Debug, Deserialize)]
pub struct CursorPage {
    #[serde(default)]
    pub results: Vec<Value>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Clone)]
pub struct NotionClient {
    client: Client,
    base_url: String,
    token: String,
}

impl NotionClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: NOTION_API_BASE.to_string(),
            token: token.into(),
        }
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Notion-Version", NOTION_VERSION)
            .send()
            .await?;
        Self::into_json("GET", path, resp).await
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Notion-Version", NOTION_VERSION)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;
        Self::into_json("POST", path, resp).await
    }

    async fn patch_json(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, path);
        let resp = self
            .client
            .patch(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Notion-Version", NOTION_VERSION)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;
        Self::into_json("PATCH", path, resp).await
    }

    async fn into_json(method: &str, path: &str, resp: reqwest::Response) -> Result<Value> {
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Notion {} {} failed: {} - {}", method, path, status, text));
        }
        Ok(resp.json().await?)
    }

    // ========================================================================
    // Blocks
    // ========================================================================

    /// One page of a block's direct children.
    pub async fn list_children(
        &self,
        block_id: &str,
        cursor: Option<&str>,
    ) -> Result<CursorPage> {
        let path = match cursor {
            Some(c) => format!("blocks/{}/children?page_size=100&start_cursor={}", block_id, c),
            None => format!("blocks/{}/children?page_size=100", block_id),
        };
        let value = self.get_json(&path).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// All direct children of a block, following the cursor to the end.
    pub async fn list_children_all(&self, block_id: &str) -> Result<Vec<Value>> {
        let mut out = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.list_children(block_id, cursor.as_deref()).await?;
            out.extend(page.results);
            if !page.has_more {
                break;
            }
            cursor = page.next_cursor;
        }
        Ok(out)
    }

    /// The full subtree under a block: every level listed to the end of its
    /// cursor, children attached in arrival order. Blocks reporting no
    /// children skip the extra round-trip.
    pub async fn fetch_children_deep(&self, block_id: &str) -> Result<Vec<Block>> {
        let raw = self.list_children_all(block_id).await?;
        let mut blocks = Vec::with_capacity(raw.len());
        for value in raw {
            let Some(mut block) = Block::from_value(&value) else {
                continue;
            };
            let has_children = value
                .get("has_children")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if has_children {
                if let Some(id) = block.id.clone() {
                    block.children = Box::pin(self.fetch_children_deep(&id)).await?;
                }
            }
            blocks.push(block);
        }
        debug!("Fetched {} blocks under {}", blocks.len(), block_id);
        Ok(blocks)
    }

    /// Append serialized child blocks under a parent. The response does not
    /// correlate created ids to the submitted order for this flow; callers
    /// re-list the parent to recover them.
    pub async fn append_children(&self, parent_id: &str, children: Vec<Value>) -> Result<()> {
        let path = format!("blocks/{}/children", parent_id);
        self.patch_json(&path, &json!({ "children": children })).await?;
        Ok(())
    }

    /// Overwrite a block's type-specific payload.
    pub async fn update_block(&self, block_id: &str, body: Value) -> Result<()> {
        self.patch_json(&format!("blocks/{}", block_id), &body).await?;
        Ok(())
    }

    // ========================================================================
    // Pages
    // ========================================================================

    /// Create an empty page under a parent page, returning its id.
    pub async fn create_page(&self, parent_page_id: &str, title: &str) -> Result<String> {
        let body = json!({
            "parent": {"type": "page_id", "page_id": parent_page_id},
            "properties": {"title": [text_run(title)]},
        });
        let value = self.post_json("pages", &body).await?;
        value
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Notion create page response carried no id"))
    }

    /// Move a page to the archive (trash).
    pub async fn archive_page(&self, page_id: &str) -> Result<()> {
        self.patch_json(&format!("pages/{}", page_id), &json!({"archived": true}))
            .await?;
        Ok(())
    }

    // ========================================================================
    // Databases
    // ========================================================================

    /// Property schema of a database.
    pub async fn retrieve_database_properties(&self, database_id: &str) -> Result<Value> {
        let value = self.get_json(&format!("databases/{}", database_id)).await?;
        Ok(value.get("properties").cloned().unwrap_or(json!({})))
    }

    /// Create a database under a page with the given property schema,
    /// returning its id.
    pub async fn create_database(
        &self,
        parent_page_id: &str,
        title: &str,
        properties: &Value,
    ) -> Result<String> {
        let body = json!({
            "parent": {"type": "page_id", "page_id": parent_page_id},
            "title": [text_run(title)],
            "properties": properties,
        });
        let value = self.post_json("databases", &body).await?;
        value
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Notion create database response carried no id"))
    }

    /// One page of a database's rows.
    pub async fn query_database(
        &self,
        database_id: &str,
        cursor: Option<&str>,
    ) -> Result<CursorPage> {
        let body = match cursor {
            Some(c) => json!({"start_cursor": c}),
            None => json!({}),
        };
        let value = self
            .post_json(&format!("databases/{}/query", database_id), &body)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Create one row in a database with the given property values.
    pub async fn create_database_row(&self, database_id: &str, properties: &Value) -> Result<()> {
        let body = json!({
            "parent": {"database_id": database_id},
            "properties": properties,
        });
        self.post_json("pages", &body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_page_deserializes_partial_envelope() {
        let page: CursorPage = serde_json::from_value(json!({
            "results": [{"id": "a"}],
            "has_more": true,
            "next_cursor": "cur_1",
        }))
        .unwrap();
        assert_eq!(page.results.len(), 1);
        assert!(page.has_more);
        assert_eq!(page.next_cursor.as_deref(), Some("cur_1"));

        // Terminal pages may omit the cursor entirely.
        let last: CursorPage = serde_json::from_value(json!({"results": []})).unwrap();
        assert!(!last.has_more);
        assert!(last.next_cursor.is_none());
    }
}
