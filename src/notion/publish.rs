//! Template publishing orchestration.
//!
//! `create_public_child_from_template` is the whole pipeline in one place:
//! fetch the template tree, hydrate it against the variable map, create the
//! target page, rebuild the tree under it, clone embedded databases, hand
//! back the public URL. Failures before the page exists abort the request;
//! failures after it degrade gracefully, since a partial page is more
//! useful than none.

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::config::Settings;

use super::append::append_tree;
use super::block::Block;
use super::client::NotionClient;
use super::database::{clone_all, collect_child_databases};
use super::hydrate::hydrate_all;

/// The created page, ready to hand to the frontend.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedPage {
    pub page_id: String,
    pub page_url: String,
}

/// Trip metadata rendered into the aside block at the top of the page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TravelInfo {
    pub start_date: String,
    pub end_date: String,
    pub from_airport: String,
    pub to_airport: String,
    pub budget: String,
}

/// Public share URL for a page id.
pub fn public_page_url(page_id: &str) -> String {
    format!("https://www.notion.so/{}", page_id.replace('-', ""))
}

/// Copy the configured template into a fresh page under the configured
/// parent, substituting `vars` and appending `itinerary` lines after the
/// template content.
pub async fn create_public_child_from_template(
    settings: &Settings,
    title: &str,
    vars: &HashMap<String, String>,
    itinerary: Option<&[String]>,
) -> Result<CreatedPage> {
    let notion = settings.notion()?;
    let client = NotionClient::new(&notion.token);

    let template = client
        .fetch_children_deep(&notion.template_page_id)
        .await
        .context("failed to load template tree")?;
    info!(
        "Loaded template {} ({} top-level blocks)",
        notion.template_page_id,
        template.len()
    );

    let mut blocks = hydrate_all(&template, vars);

    if let Some(lines) = itinerary {
        blocks.extend(lines.iter().map(|line| Block::bulleted_list_item(line)));
    }

    let page_id = client
        .create_page(&notion.parent_page_id, title)
        .await
        .context("failed to create target page")?;
    info!("Created page {} ({:?})", page_id, title);

    append_tree(&client, &page_id, &blocks)
        .await
        .context("failed to append template tree")?;

    // Embedded databases are collected from the original tree; hydration
    // replaced their blocks with placeholder paragraphs.
    let db_ids = collect_child_databases(&template);
    if !db_ids.is_empty() {
        let cloned = clone_all(&client, &db_ids, &page_id).await;
        info!("Cloned {}/{} embedded databases", cloned, db_ids.len());
    }

    Ok(CreatedPage {
        page_url: public_page_url(&page_id),
        page_id,
    })
}

/// Overwrite the page's first block with formatted trip metadata.
///
/// The template is expected to start with a text-bearing aside (quote,
/// callout or paragraph). Anything else is left alone with a warning; the
/// page already exists, so this is never worth failing the request over.
pub async fn update_aside_block(
    settings: &Settings,
    page_id: &str,
    travel_info: &TravelInfo,
) -> Result<bool> {
    let token = settings.notion_token()?;
    let client = NotionClient::new(token);

    let children = client.list_children(page_id, None).await?;
    let Some(first) = children.results.first().and_then(Block::from_value) else {
        warn!("Page {} has no first block to update", page_id);
        return Ok(false);
    };

    if !first.block_type.is_aside_candidate() {
        warn!(
            "First block of {} is {}, not an aside shape; skipping update",
            page_id,
            first.block_type.as_tag()
        );
        return Ok(false);
    }

    let Some(block_id) = first.id else {
        return Ok(false);
    };

    let text = aside_text(travel_info);
    let tag = first.block_type.as_tag();
    let body = json!({
        tag: {
            "rich_text": [{
                "type": "text",
                "text": {"content": text},
                "plain_text": text,
            }],
        },
    });
    client.update_block(&block_id, body).await?;
    Ok(true)
}

fn aside_text(info: &TravelInfo) -> String {
    format!(
        "🌏\n\n## Trip Planner\n\n📧 [contact@example.com](mailto:contact@example.com) | 📷 Instagram | 💻 GitHub\n\n---\n\nTravel dates: {} ~ {}\n\nAirports: {} → {}\n\nTotal budget: {}\n",
        info.start_date, info.end_date, info.from_airport, info.to_airport, info.budget
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notion::block::BlockType;

    #[test]
    fn test_public_page_url_strips_dashes() {
        assert_eq!(
            public_page_url("27ad0b86-08f8-4a43-9a3b-1f2c3d4e5f60"),
            "https://www.notion.so/27ad0b8608f84a439a3b1f2c3d4e5f60"
        );
    }

    #[test]
    fn test_itinerary_lines_become_list_items() {
        let lines = vec!["Day1: arrive".to_string(), "Day2: tour".to_string()];
        let mut blocks = vec![Block::paragraph("template content")];
        blocks.extend(lines.iter().map(|line| Block::bulleted_list_item(line)));

        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[1].block_type, BlockType::BulletedListItem);
        assert_eq!(
            blocks[1].payload["rich_text"][0]["text"]["content"],
            "Day1: arrive"
        );
        assert_eq!(
            blocks[2].payload["rich_text"][0]["text"]["content"],
            "Day2: tour"
        );
    }

    #[test]
    fn test_aside_text_carries_trip_metadata() {
        let info = TravelInfo {
            start_date: "2026-09-01".to_string(),
            end_date: "2026-09-05".to_string(),
            from_airport: "ICN".to_string(),
            to_airport: "HND".to_string(),
            budget: "500000".to_string(),
        };
        let text = aside_text(&info);
        assert!(text.contains("2026-09-01 ~ 2026-09-05"));
        assert!(text.contains("ICN → HND"));
        assert!(text.contains("500000"));
    }

    #[test]
    fn test_aside_candidates() {
        assert!(BlockType::Quote.is_aside_candidate());
        assert!(BlockType::Callout.is_aside_candidate());
        assert!(BlockType::Paragraph.is_aside_candidate());
        assert!(!BlockType::Heading1.is_aside_candidate());
        assert!(!BlockType::Table.is_aside_candidate());
    }
}
