//! Chat-completions client for the trip-planning conversation.
//!
//! Talks to an OpenAI-compatible `/chat/completions` endpoint. The model is
//! instructed to end every reply with a machine-readable meta hint (next
//! step, filled/missing slots, confidence); [`MetaFilter`] strips those
//! hints from the text shown to the user while the raw reply is kept for
//! the frontend's state machine.

use anyhow::anyhow;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ChatSettings;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// How many trailing user/assistant turns ride along with each request.
pub const MAX_TURNS: usize = 16;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat API rejected the credentials")]
    Auth,
    #[error("chat API is rate limited")]
    RateLimited,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Chat client with fixed sampling parameters tuned for the planner flow.
pub struct ChatClient {
    client: Client,
    api_key: String,
    model: String,
    retries: u32,
}

impl ChatClient {
    pub fn new(settings: &ChatSettings) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self {
            client,
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            retries: settings.retries,
        })
    }

    /// Send a completion request, retrying transport errors, rate limits
    /// and server errors up to the configured attempt count.
    pub async fn chat(&self, messages: Vec<Message>) -> Result<String, ChatError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: 0.3,
            top_p: 0.9,
            frequency_penalty: 0.2,
            max_tokens: 900,
        };

        let mut last_err: Option<ChatError> = None;
        for attempt in 0..=self.retries {
            debug!("Chat request attempt {} (model={})", attempt + 1, request.model);

            let resp = match self
                .client
                .post(OPENAI_API_URL)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    warn!("Chat transport error on attempt {}: {}", attempt + 1, e);
                    last_err = Some(ChatError::Other(anyhow::Error::new(e)));
                    continue;
                }
            };

            let status = resp.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(ChatError::Auth);
            }
            if status == StatusCode::TOO_MANY_REQUESTS {
                warn!("Chat API rate limited on attempt {}", attempt + 1);
                last_err = Some(ChatError::RateLimited);
                continue;
            }
            if status.is_server_error() {
                let text = resp.text().await.unwrap_or_default();
                warn!("Chat API {} on attempt {}: {}", status, attempt + 1, text);
                last_err = Some(ChatError::Other(anyhow!(
                    "chat API error ({}): {}",
                    status,
                    text
                )));
                continue;
            }
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(ChatError::Other(anyhow!(
                    "chat API error ({}): {}",
                    status,
                    text
                )));
            }

            let parsed: ChatCompletionResponse = resp
                .json()
                .await
                .map_err(|e| ChatError::Other(anyhow::Error::new(e)))?;

            if let Some(usage) = &parsed.usage {
                info!(
                    "Chat response: {} tokens (prompt: {}, completion: {})",
                    usage.total_tokens, usage.prompt_tokens, usage.completion_tokens
                );
            }

            let content = parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .unwrap_or_default();
            return Ok(content.trim().to_string());
        }

        Err(last_err.unwrap_or_else(|| ChatError::Other(anyhow!("chat request failed"))))
    }
}

/// System + few-shot + the trailing window of real conversation turns.
/// Roles other than user/assistant in the incoming history are discarded;
/// the service controls its own system prompt.
pub fn assemble(system_prompt: &str, history: &[Message]) -> Vec<Message> {
    let tail: Vec<&Message> = history
        .iter()
        .filter(|m| matches!(m.role, Role::User | Role::Assistant))
        .collect();
    let start = tail.len().saturating_sub(MAX_TURNS);

    let mut messages = vec![Message::system(system_prompt)];
    messages.extend(few_shot());
    messages.extend(tail[start..].iter().map(|m| (*m).clone()));
    messages
}

/// Example turns showing the model the expected tone and meta-hint format.
pub fn few_shot() -> Vec<Message> {
    vec![
        Message::user("Hi!"),
        Message::assistant(
            "Welcome! First, tell me what kind of trip you are in the mood for \
             (for example: nature, cafe hopping, minimal).\n\n\
             [NEXT: ask] FILLED: MISSING: style CONF:0.10",
        ),
        Message::user("I love cafe hopping. Just me and a friend."),
        Message::assistant(
            "Nice! Would you rather keep a relaxed pace, or pack the days full? \
             Rough dates and a budget will help me tailor the picks.\n\n\
             [NEXT: ask] FILLED: style,companions MISSING: pace,days,budget CONF: 0.45",
        ),
    ]
}

/// Strips machine-readable meta hints from a model reply.
///
/// Three shapes appear in practice: a fenced ```meta block, a one-line
/// `[NEXT: ...]` bracket hint, and bare `FILLED:`/`MISSING:`/`CONF:` slot
/// bookkeeping lines. All are removed; whatever follows the first hint
/// marker is cut as well.
pub struct MetaFilter {
    meta_block: Regex,
    bracket_hint: Regex,
    key_line: Regex,
    cut_marker: Regex,
    trailing_ws: Regex,
    blank_runs: Regex,
}

impl MetaFilter {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            meta_block: Regex::new(r"(?is)```meta.*?```")?,
            bracket_hint: Regex::new(r"(?i)[ \t]*\[[^\]\n]*\bNEXT\b[^\]\n]*\][^\n]*")?,
            key_line: Regex::new(
                r"(?i)\b(?:NEXT|OPTIONS?|FILLED|MISSING|CONF(?:IDENCE)?)\b[ \t]*:",
            )?,
            cut_marker: Regex::new(r"(?i)\n\s*(?:\[?\s*NEXT\s*:|```meta)")?,
            trailing_ws: Regex::new(r"[ \t]+\n")?,
            blank_runs: Regex::new(r"\n{3,}")?,
        })
    }

    pub fn strip(&self, raw: &str) -> String {
        let mut text = raw
            .replace("\r\n", "\n")
            .replace('\u{00A0}', " ")
            .replace('：', ":")
            .replace('—', "-")
            .replace('–', "-");

        text = self.meta_block.replace_all(&text, "").into_owned();
        text = self.bracket_hint.replace_all(&text, "").into_owned();
        text = text
            .lines()
            .filter(|line| !self.key_line.is_match(line))
            .collect::<Vec<_>>()
            .join("\n");

        if let Some(m) = self.cut_marker.find(&text) {
            text.truncate(m.start());
        }

        text = self.trailing_ws.replace_all(&text, "\n").into_owned();
        text = self.blank_runs.replace_all(&text, "\n\n").into_owned();
        text.trim().to_string()
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    top_p: f32,
    frequency_penalty: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> MetaFilter {
        MetaFilter::new().unwrap()
    }

    #[test]
    fn test_strip_bracket_hint() {
        let raw = "How about Kyoto in autumn?\n\n[NEXT: recommend] FILLED: style MISSING: days CONF: 0.62";
        assert_eq!(filter().strip(raw), "How about Kyoto in autumn?");
    }

    #[test]
    fn test_strip_meta_fence() {
        let raw = "Here are two options.\n\n```meta\nnext: pick\noptions: [\"a\",\"b\"]\n```";
        assert_eq!(filter().strip(raw), "Here are two options.");
    }

    #[test]
    fn test_strip_key_lines() {
        let raw = "Sounds great!\nFILLED: style,budget\nMISSING: dates\nSee you soon.";
        assert_eq!(filter().strip(raw), "Sounds great!\nSee you soon.");
    }

    #[test]
    fn test_plain_text_untouched() {
        let raw = "Day 1: arrive and settle in.\n\nDay 2: old town walk.";
        assert_eq!(filter().strip(raw), raw);
    }

    #[test]
    fn test_blank_runs_collapsed() {
        let raw = "First.\n\n\n\nSecond.";
        assert_eq!(filter().strip(raw), "First.\n\nSecond.");
    }

    #[test]
    fn test_assemble_windows_history() {
        let mut history = Vec::new();
        for i in 0..40 {
            history.push(Message::user(format!("turn {}", i)));
        }
        history.push(Message::system("user-injected system prompt"));

        let messages = assemble("real system prompt", &history);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, "real system prompt");
        // system + 4 few-shot + MAX_TURNS tail
        assert_eq!(messages.len(), 1 + few_shot().len() + MAX_TURNS);
        assert_eq!(messages.last().unwrap().content, "turn 39");
        assert!(messages[1..]
            .iter()
            .all(|m| !matches!(m.role, Role::System)));
    }

    #[test]
    fn test_role_wire_format() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert!(json.contains("\"role\":\"user\""));
    }
}
