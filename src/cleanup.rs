//! Expiry log of created pages and the archival pass over it.
//!
//! Every published page is logged with its creation time. Pages older than
//! the retention window are archived through the Notion API and dropped
//! from the log. The log is a JSON file so it survives restarts; the
//! in-memory map behind a `RwLock` is the source of truth between writes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::Settings;
use crate::notion::client::NotionClient;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggedPage {
    pub page_id: String,
    pub page_url: String,
    pub created_ts: i64,
}

/// JSON-file-backed log of created pages.
#[derive(Clone)]
pub struct CleanupStore {
    path: PathBuf,
    retention_days: i64,
    pages: Arc<RwLock<HashMap<String, LoggedPage>>>,
}

impl CleanupStore {
    /// Open the store, loading existing entries if the file is present.
    pub fn open(path: impl Into<PathBuf>, retention_days: i64) -> Result<Self> {
        let path = path.into();
        let pages = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read cleanup log {:?}", path))?;
            let entries: Vec<LoggedPage> = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse cleanup log {:?}", path))?;
            entries
                .into_iter()
                .map(|p| (p.page_id.clone(), p))
                .collect()
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            retention_days,
            pages: Arc::new(RwLock::new(pages)),
        })
    }

    /// Record a freshly created page. Re-logging the same id refreshes its
    /// creation time.
    pub fn log_created(&self, page_id: &str, page_url: &str) -> Result<()> {
        self.log_created_at(page_id, page_url, Utc::now().timestamp())
    }

    pub fn log_created_at(&self, page_id: &str, page_url: &str, created_ts: i64) -> Result<()> {
        let mut pages = self.pages.write().unwrap();
        pages.insert(
            page_id.to_string(),
            LoggedPage {
                page_id: page_id.to_string(),
                page_url: page_url.to_string(),
                created_ts,
            },
        );
        self.persist(&pages)
    }

    /// Pages older than the retention window.
    pub fn expired(&self) -> Vec<LoggedPage> {
        let cutoff = Utc::now().timestamp() - self.retention_days * 24 * 3600;
        let pages = self.pages.read().unwrap();
        pages
            .values()
            .filter(|p| p.created_ts < cutoff)
            .cloned()
            .collect()
    }

    /// Drop the given ids from the log.
    pub fn remove(&self, page_ids: &[String]) -> Result<()> {
        if page_ids.is_empty() {
            return Ok(());
        }
        let mut pages = self.pages.write().unwrap();
        for id in page_ids {
            pages.remove(id);
        }
        self.persist(&pages)
    }

    fn persist(&self, pages: &HashMap<String, LoggedPage>) -> Result<()> {
        let mut entries: Vec<&LoggedPage> = pages.values().collect();
        entries.sort_by_key(|p| (p.created_ts, p.page_id.clone()));
        let json = serde_json::to_string_pretty(&entries)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("failed to write cleanup log {:?}", self.path))
    }
}

#[derive(Debug, Serialize)]
pub struct CleanupSummary {
    pub archived: Vec<String>,
    pub failed: Vec<String>,
    pub count: usize,
}

/// Archive every expired page. Per-page failures are collected, not fatal;
/// only successfully archived pages leave the log, so failures retry on
/// the next pass.
pub async fn archive_expired(store: &CleanupStore, settings: &Settings) -> Result<CleanupSummary> {
    let token = settings.notion_token()?;
    let client = NotionClient::new(token);

    let mut archived = Vec::new();
    let mut failed = Vec::new();
    for page in store.expired() {
        match client.archive_page(&page.page_id).await {
            Ok(()) => archived.push(page.page_id),
            Err(e) => {
                error!("Archive failed for {}: {:#}", page.page_id, e);
                failed.push(page.page_id);
            }
        }
    }

    store.remove(&archived)?;
    if !archived.is_empty() {
        info!("Archived {} expired pages", archived.len());
    }

    Ok(CleanupSummary {
        count: archived.len(),
        archived,
        failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(retention_days: i64) -> (tempfile::TempDir, CleanupStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CleanupStore::open(dir.path().join("pages.json"), retention_days).unwrap();
        (dir, store)
    }

    #[test]
    fn test_log_and_expire_by_retention() {
        let (_dir, store) = temp_store(14);
        let old_ts = Utc::now().timestamp() - 15 * 24 * 3600;

        store
            .log_created_at("old-page", "https://www.notion.so/old", old_ts)
            .unwrap();
        store
            .log_created("fresh-page", "https://www.notion.so/fresh")
            .unwrap();

        let expired = store.expired();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].page_id, "old-page");
    }

    #[test]
    fn test_remove_drops_entries() {
        let (_dir, store) = temp_store(0);
        let old_ts = Utc::now().timestamp() - 24 * 3600;
        store.log_created_at("a", "url-a", old_ts).unwrap();
        store.log_created_at("b", "url-b", old_ts).unwrap();

        store.remove(&["a".to_string()]).unwrap();
        let remaining = store.expired();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].page_id, "b");
    }

    #[test]
    fn test_store_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pages.json");
        let old_ts = Utc::now().timestamp() - 30 * 24 * 3600;

        {
            let store = CleanupStore::open(&path, 14).unwrap();
            store.log_created_at("persisted", "url", old_ts).unwrap();
        }

        let reopened = CleanupStore::open(&path, 14).unwrap();
        let expired = reopened.expired();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].page_url, "url");
    }

    #[test]
    fn test_relog_refreshes_timestamp() {
        let (_dir, store) = temp_store(14);
        let old_ts = Utc::now().timestamp() - 20 * 24 * 3600;
        store.log_created_at("page", "url", old_ts).unwrap();
        store.log_created("page", "url").unwrap();
        assert!(store.expired().is_empty());
    }
}
