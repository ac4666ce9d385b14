//! Trip Publisher - turns a planning conversation into a shareable Notion page.

mod chat;
mod cleanup;
mod config;
mod notion;
mod prompts;

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat::{assemble, ChatClient, ChatError, Message, MetaFilter, Role};
use cleanup::{archive_expired, CleanupStore};
use config::Settings;
use notion::publish::{create_public_child_from_template, update_aside_block, TravelInfo};

const ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:5173",
    "https://nainju.github.io",
];

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    settings: Arc<Settings>,
    system_prompt: Arc<String>,
    meta_filter: Arc<MetaFilter>,
    store: CleanupStore,
    started_at: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "trip_publisher=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Arc::new(Settings::from_env());
    let missing = settings.missing_required();
    if !missing.is_empty() {
        warn!("Booting with missing env vars: {}", missing.join(", "));
    }

    let store = CleanupStore::open(settings.cleanup_db_path.clone(), settings.retention_days)?;

    let state = AppState {
        settings: settings.clone(),
        system_prompt: Arc::new(prompts::build_system_prompt()),
        meta_filter: Arc::new(MetaFilter::new()?),
        store: store.clone(),
        started_at: Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    };

    // Periodic archival of expired pages
    if settings.cleanup_enabled {
        tokio::spawn(cleanup_loop(store, settings.clone()));
        info!("Cleanup scheduler enabled (every {:?})", settings.cleanup_interval);
    }

    let origins: Vec<HeaderValue> = ALLOWED_ORIGINS
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    // Build router
    let app = Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/chat", post(chat_handler))
        .route("/notion/create", post(notion_create))
        .route("/admin/cleanup", post(admin_cleanup))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    // Run server
    let addr = format!("0.0.0.0:{}", settings.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn cleanup_loop(store: CleanupStore, settings: Arc<Settings>) {
    let period = settings.cleanup_interval.max(std::time::Duration::from_secs(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; the first real pass waits a full
    // interval.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match archive_expired(&store, &settings).await {
            Ok(summary) => info!(
                "Cleanup pass: {} archived, {} failed",
                summary.count,
                summary.failed.len()
            ),
            Err(e) => error!("Cleanup pass failed: {:#}", e),
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Required configuration present?
async fn health(State(state): State<AppState>) -> Json<Value> {
    let missing = state.settings.missing_required();
    Json(json!({"ok": missing.is_empty(), "missing": missing}))
}

async fn version(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "version": state.settings.app_version,
        "build_time": state.settings.build_time,
        "start_time": state.started_at,
    }))
}

#[derive(serde::Deserialize)]
struct ChatRequest {
    #[serde(default)]
    messages: Vec<Value>,
}

/// One turn of the planner conversation.
async fn chat_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> (StatusCode, Json<Value>) {
    let history = filter_incoming_messages(&req.messages);

    let chat_settings = match state.settings.chat() {
        Ok(s) => s,
        Err(e) => {
            error!("Chat misconfigured: {}", e);
            return chat_error_response(
                "There is a problem with the API credentials. Please contact the administrator.",
            );
        }
    };
    let client = match ChatClient::new(&chat_settings) {
        Ok(c) => c,
        Err(e) => {
            error!("Chat client build failed: {:#}", e);
            return chat_error_response(
                "Something went wrong answering the chat. Please try again shortly.",
            );
        }
    };

    let messages = assemble(&state.system_prompt, &history);
    match client.chat(messages).await {
        Ok(raw) => {
            let visible = state.meta_filter.strip(&raw);
            (
                StatusCode::OK,
                Json(json!({"ok": true, "response": visible, "meta": raw})),
            )
        }
        Err(ChatError::Auth) => chat_error_response(
            "There is a problem with the API credentials. Please contact the administrator.",
        ),
        Err(ChatError::RateLimited) => chat_error_response(
            "We are getting a lot of requests right now. Please try again shortly.",
        ),
        Err(e) => {
            error!("Chat error: {:#}", anyhow::Error::from(e));
            chat_error_response("Something went wrong answering the chat. Please try again shortly.")
        }
    }
}

fn chat_error_response(message: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"ok": false, "error": message})),
    )
}

/// Keep only well-formed user/assistant/system turns from the request body.
fn filter_incoming_messages(raw: &[Value]) -> Vec<Message> {
    raw.iter()
        .filter_map(|m| {
            let role = match m.get("role").and_then(Value::as_str) {
                Some("user") => Role::User,
                Some("assistant") => Role::Assistant,
                Some("system") => Role::System,
                _ => return None,
            };
            let content = m.get("content").and_then(Value::as_str)?;
            Some(Message {
                role,
                content: content.to_string(),
            })
        })
        .collect()
}

#[derive(serde::Deserialize)]
struct CreateRequest {
    title: Option<String>,
    selected_trip: Option<String>,
    #[serde(default)]
    style: String,
    #[serde(default)]
    region: String,
    #[serde(default)]
    companions: String,
    #[serde(default)]
    summary: String,
    itinerary: Option<Vec<String>>,
    travel_info: Option<TravelInfo>,
}

/// Publish the planned trip as a new Notion page from the template.
async fn notion_create(
    State(state): State<AppState>,
    Json(req): Json<CreateRequest>,
) -> (StatusCode, Json<Value>) {
    let title = req
        .title
        .or(req.selected_trip)
        .unwrap_or_else(|| "Trip plan".to_string());

    let vars: HashMap<String, String> = [
        ("style", req.style),
        ("region", req.region),
        ("companions", req.companions),
        ("summary", req.summary),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let created = match create_public_child_from_template(
        &state.settings,
        &title,
        &vars,
        req.itinerary.as_deref(),
    )
    .await
    {
        Ok(created) => created,
        Err(e) => {
            error!("Page creation failed: {:#}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"ok": false, "error": e.to_string()})),
            );
        }
    };

    // The page exists from here on; everything below degrades gracefully.
    if let Some(info) = &req.travel_info {
        if let Err(e) = update_aside_block(&state.settings, &created.page_id, info).await {
            warn!("Aside update failed for {}: {:#}", created.page_id, e);
        }
    }

    if let Err(e) = state.store.log_created(&created.page_id, &created.page_url) {
        warn!("Could not log created page {}: {:#}", created.page_id, e);
    }

    let guide = "Your Notion page is ready.\n\
                 1) Open the link\n\
                 2) Use 'Duplicate' in the top-right to copy it into your own workspace\n\
                 3) (optional) Import the itinerary CSV via Notion's 'Import'";
    (
        StatusCode::OK,
        Json(json!({"ok": true, "page_url": created.page_url, "guide": guide})),
    )
}

/// Archive expired pages now. Guarded by `X-Admin-Token` when configured.
async fn admin_cleanup(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if let Some(expected) = &state.settings.admin_token {
        let provided = headers.get("X-Admin-Token").and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"ok": false, "error": "unauthorized"})),
            );
        }
    }

    match archive_expired(&state.store, &state.settings).await {
        Ok(summary) => (
            StatusCode::OK,
            Json(json!({
                "ok": true,
                "archived": summary.archived,
                "failed": summary.failed,
                "count": summary.count,
            })),
        ),
        Err(e) => {
            error!("Manual cleanup failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"ok": false, "error": e.to_string()})),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_incoming_messages_drops_malformed() {
        let raw = vec![
            json!({"role": "user", "content": "hello"}),
            json!({"role": "tool", "content": "nope"}),
            json!({"role": "assistant"}),
            json!("not an object"),
            json!({"role": "assistant", "content": "hi back"}),
        ];
        let filtered = filter_incoming_messages(&raw);
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].role, Role::User);
        assert_eq!(filtered[1].content, "hi back");
    }
}
