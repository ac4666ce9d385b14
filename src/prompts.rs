//! System prompt assembly for the planner conversation.
//!
//! The prompt is the fixed instruction block plus two pieces of on-disk
//! data: the Notion template structure (markdown) and the itinerary CSV
//! schema. Both reads fall back to safe defaults so a missing data file
//! never stops the server from booting.

use std::path::PathBuf;

use tracing::warn;

const BASE_PROMPT: &str = r#"You are a travel planning chatbot. Follow this scenario:

[conversation start] → [learn preferences] → [recommend destinations] → [user picks or refines] → [draft the plan] → [ask whether to publish to Notion] →
- (publish) provide plan_text + travel_info (JSON) + csv_text → [save]
- (no publish) provide plan_text only → [done]

Meta hint format (use one of the two):
1) [NEXT: ask|confirm|recommend|pick|askPlan|plan|save|done]  OPTIONS: a | b
FILLED: key1,key2  MISSING: key3,key4  CONF: 0.00~1.00

2) ```meta
next: ask|confirm|recommend|pick|askPlan|plan|save|done
options: ["option a","option b"]
filled:  ["style","companions"]
missing: ["dates","budget"]
confidence: 0.62
```

Preference slot keys:
    style, region_like, region_avoid, companions, dates|days, budget, stay_style,
    pace, must, avoid, liked, disliked, food_cafe, constraints

Rules:
    • NEXT=ask: while slots are missing, ask about 1-2 of them at a time (never all at once).
    • If the user confirms, move to recommend; if they want changes, go back to ask.
    • recommend: 2-3 candidates with a one-line highlight each. No day plans yet.
    • pick: nudge the user to choose one candidate (offer the options).
    • askPlan: "Shall I draft a plan for the chosen destination?" yes/no.
    • plan: a Day1/Day2 style draft (no flood of links or shop names).
    • Ask about Notion publishing in the same step as askPlan when natural.
    • (publish = yes) at the save step provide all three:
    1) plan_text (markdown to fill the template body)
    2) travel_info (JSON) → {"start_date":"YYYY-MM-DD","end_date":"YYYY-MM-DD","from_airport":"ICN","to_airport":"HND","budget":"500000"}
    3) csv_text (optional) → a csv code block. Fixed header and order; quote values containing commas.
    • done: share the link and duplication steps, then wrap up.

Keep the visible reply natural and warm. Always end with exactly one meta hint line."#;

const FALLBACK_TEMPLATE: &str = "# Default Trip Template\n";
const FALLBACK_CSV_SCHEMA: &str = "date,time,place,activity,cost,notes\n";

/// Assemble the full system prompt.
pub fn build_system_prompt() -> String {
    let template = read_data_file(
        "NOTION_TEMPLATE_PATH",
        "data/notion_template.md",
        FALLBACK_TEMPLATE,
    );
    let csv_schema = read_data_file(
        "ITINERARY_SCHEMA_PATH",
        "data/itinerary_schema.csv",
        FALLBACK_CSV_SCHEMA,
    );

    format!(
        "{base}\n\n\
         [Notion template structure (Markdown)]\n\
         The markdown below summarizes the template the user's page is built from. Do not reorder its sections or headings; only fill in content.\n\
         {template}\n\n\
         [Itinerary CSV schema]\n\
         The CSV below is the itinerary database schema (header + sample). Use the header names, order and separator exactly as given.\n\
         {csv}\n\n\
         [Output format]\n\
         • plan_text: markdown following the template structure, in a markdown code block\n\
         • travel_info: the JSON schema above, in a json code block\n\
         • csv_text (optional): itinerary rows in the CSV header order, in a csv code block\n\
         Output only the reply body plus the code blocks; no extra commentary."    ,
        base = BASE_PROMPT,
        template = template.trim(),
        csv = csv_schema.trim(),
    )
}

fn read_data_file(env_name: &str, default_path: &str, fallback: &str) -> String {
    let path = std::env::var(env_name)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default_path));
    match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Could not read {:?}, using fallback: {}", path, e);
            fallback.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_carries_all_sections() {
        let prompt = build_system_prompt();
        assert!(prompt.contains("[Notion template structure (Markdown)]"));
        assert!(prompt.contains("[Itinerary CSV schema]"));
        assert!(prompt.contains("[Output format]"));
        assert!(prompt.contains("NEXT: ask|confirm|recommend"));
    }

    #[test]
    fn test_missing_file_uses_fallback() {
        let content = read_data_file(
            "TRIP_PUBLISHER_NO_SUCH_VAR",
            "data/definitely/not/here.md",
            FALLBACK_TEMPLATE,
        );
        assert_eq!(content, FALLBACK_TEMPLATE);
    }
}
