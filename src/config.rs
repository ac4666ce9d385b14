//! Environment configuration.
//!
//! Everything the service needs comes from environment variables (a `.env`
//! file is loaded at boot). The settings snapshot keeps optional values as
//! `Option` so the server can boot with an incomplete environment and
//! report what is missing from `/health`; operations that actually need the
//! credentials fail fast with an error enumerating every absent variable.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variables: {0}")]
    Missing(String),
    #[error("{0}")]
    Invalid(&'static str),
}

/// Snapshot of the process environment taken at boot.
#[derive(Debug, Clone)]
pub struct Settings {
    pub notion_api_key: Option<String>,
    pub notion_template_page_id: Option<String>,
    pub notion_parent_id: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_timeout: Duration,
    pub openai_retries: u32,
    pub admin_token: Option<String>,
    pub cleanup_db_path: PathBuf,
    pub retention_days: i64,
    pub cleanup_interval: Duration,
    pub cleanup_enabled: bool,
    pub port: u16,
    pub app_version: String,
    pub build_time: String,
}

/// Credentials and ids required by every Notion publishing operation.
#[derive(Debug, Clone)]
pub struct NotionSettings {
    pub token: String,
    pub template_page_id: String,
    pub parent_page_id: String,
}

/// Everything the chat client needs.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    pub retries: u32,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            notion_api_key: env_opt("NOTION_API_KEY"),
            notion_template_page_id: env_opt("NOTION_TEMPLATE_PAGE_ID"),
            notion_parent_id: env_opt("NOTION_PARENT_ID"),
            openai_api_key: env_opt("OPENAI_API_KEY"),
            openai_model: env_or("OPENAI_MODEL", "gpt-4o-mini"),
            openai_timeout: Duration::from_secs(env_parse("OPENAI_TIMEOUT", 20)),
            openai_retries: env_parse("OPENAI_RETRIES", 2),
            admin_token: env_opt("ADMIN_TOKEN"),
            cleanup_db_path: PathBuf::from(env_or("CLEANUP_DB_PATH", "created_pages.json")),
            retention_days: env_parse("NOTION_RETENTION_DAYS", 14),
            cleanup_interval: Duration::from_secs(env_parse("CLEANUP_INTERVAL_SECS", 86_400)),
            cleanup_enabled: env_or("ENABLE_CLEANUP", "1") == "1",
            port: env_parse("PORT", 8080),
            app_version: env_or("GIT_SHA", "dev"),
            build_time: env_or("BUILD_TIME", "unknown"),
        }
    }

    /// Variable names required for the full create-and-chat flow, in the
    /// order `/health` reports them.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.openai_api_key.is_none() {
            missing.push("OPENAI_API_KEY");
        }
        if self.notion_api_key.is_none() {
            missing.push("NOTION_API_KEY");
        }
        if self.notion_template_page_id.is_none() {
            missing.push("NOTION_TEMPLATE_PAGE_ID");
        }
        if self.notion_parent_id.is_none() {
            missing.push("NOTION_PARENT_ID");
        }
        missing
    }

    /// Full Notion settings, or an error naming every missing variable.
    pub fn notion(&self) -> Result<NotionSettings, ConfigError> {
        let mut missing = Vec::new();
        if self.notion_api_key.is_none() {
            missing.push("NOTION_API_KEY");
        }
        if self.notion_template_page_id.is_none() {
            missing.push("NOTION_TEMPLATE_PAGE_ID");
        }
        if self.notion_parent_id.is_none() {
            missing.push("NOTION_PARENT_ID");
        }
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing.join(", ")));
        }
        Ok(NotionSettings {
            token: self.notion_api_key.clone().unwrap_or_default(),
            template_page_id: self.notion_template_page_id.clone().unwrap_or_default(),
            parent_page_id: self.notion_parent_id.clone().unwrap_or_default(),
        })
    }

    /// The Notion token alone, for operations on already-created pages.
    pub fn notion_token(&self) -> Result<String, ConfigError> {
        self.notion_api_key
            .clone()
            .ok_or_else(|| ConfigError::Missing("NOTION_API_KEY".to_string()))
    }

    pub fn chat(&self) -> Result<ChatSettings, ConfigError> {
        let api_key = self
            .openai_api_key
            .clone()
            .ok_or_else(|| ConfigError::Missing("OPENAI_API_KEY".to_string()))?;
        if !api_key.starts_with("sk-") {
            return Err(ConfigError::Invalid("OPENAI_API_KEY is malformed"));
        }
        Ok(ChatSettings {
            api_key,
            model: self.openai_model.clone(),
            timeout: self.openai_timeout,
            retries: self.openai_retries,
        })
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_or(name: &str, default: &str) -> String {
    env_opt(name).unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env_opt(name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_settings() -> Settings {
        Settings {
            notion_api_key: None,
            notion_template_page_id: None,
            notion_parent_id: None,
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            openai_timeout: Duration::from_secs(20),
            openai_retries: 2,
            admin_token: None,
            cleanup_db_path: PathBuf::from("created_pages.json"),
            retention_days: 14,
            cleanup_interval: Duration::from_secs(86_400),
            cleanup_enabled: true,
            port: 8080,
            app_version: "dev".to_string(),
            build_time: "unknown".to_string(),
        }
    }

    #[test]
    fn test_missing_required_lists_all() {
        let settings = empty_settings();
        assert_eq!(
            settings.missing_required(),
            vec![
                "OPENAI_API_KEY",
                "NOTION_API_KEY",
                "NOTION_TEMPLATE_PAGE_ID",
                "NOTION_PARENT_ID",
            ]
        );
    }

    #[test]
    fn test_notion_enumerates_every_missing_variable() {
        let mut settings = empty_settings();
        settings.notion_api_key = Some("secret_x".to_string());
        let err = settings.notion().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("NOTION_TEMPLATE_PAGE_ID"));
        assert!(message.contains("NOTION_PARENT_ID"));
        assert!(!message.contains("NOTION_API_KEY,"));
    }

    #[test]
    fn test_notion_complete() {
        let mut settings = empty_settings();
        settings.notion_api_key = Some("secret_x".to_string());
        settings.notion_template_page_id = Some("tpl".to_string());
        settings.notion_parent_id = Some("parent".to_string());
        let notion = settings.notion().unwrap();
        assert_eq!(notion.template_page_id, "tpl");
        assert_eq!(notion.parent_page_id, "parent");
    }

    #[test]
    fn test_chat_rejects_malformed_key() {
        let mut settings = empty_settings();
        settings.openai_api_key = Some("not-a-key".to_string());
        assert!(matches!(
            settings.chat().unwrap_err(),
            ConfigError::Invalid(_)
        ));

        settings.openai_api_key = Some("sk-abc".to_string());
        assert!(settings.chat().is_ok());
    }
}
