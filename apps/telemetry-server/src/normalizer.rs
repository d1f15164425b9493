// [[RARO]]/apps/telemetry-server/src/normalizer.rs
// Purpose: Turns raw transcript entries into canonical events, synthesizing to-do completions.
// Architecture: Domain Logic Layer
// Dependencies: serde_json, Registry

use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::events::{
    timestamp_millis, truncate_chars, truncate_value, EventType, NewEvent, MAX_PAYLOAD_CHARS,
    MAX_SUMMARY_CHARS,
};
use crate::registry::{AgentRegistry, SUB_AGENT_TYPES};
use crate::transcript::{MessageEntry, RawEntry};

pub const PRIMARY_SOURCE_APP: &str = "claude-code";
const TODO_TOOL: &str = "TodoWrite";

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TodoItem {
    pub content: String,
    #[serde(default)]
    pub status: String,
}

impl TodoItem {
    fn is_completed(&self) -> bool {
        self.status == "completed"
    }
}

/// Display names used when the session map has no entry.
#[derive(Debug, Clone)]
pub struct AgentNames {
    pub principal: String,
    pub assistant: String,
}

pub struct Normalizer {
    registry: Arc<AgentRegistry>,
    names: AgentNames,
    /// Last to-do list seen per session
    session_todos: HashMap<String, Vec<TodoItem>>,
}

impl Normalizer {
    pub fn new(registry: Arc<AgentRegistry>, names: AgentNames) -> Self {
        Self {
            registry,
            names,
            session_todos: HashMap::new(),
        }
    }

    /// Convert one raw entry into zero or more events, in delivery order.
    pub fn normalize(&mut self, entry: RawEntry) -> Vec<NewEvent> {
        let base = match entry {
            RawEntry::User(e) if e.role() == Some("user") => user_event(&e),
            RawEntry::Assistant(e) if e.role() == Some("assistant") => assistant_event(&e),
            _ => None,
        };

        let Some(mut event) = base else {
            return Vec::new();
        };

        event.agent_name = self.resolve_agent_name(&event);
        let completions = self.diff_todos(&event);

        let mut out = Vec::with_capacity(1 + completions.len());
        out.push(event);
        out.extend(completions);
        out.into_iter().map(seal).collect()
    }

    fn resolve_agent_name(&self, event: &NewEvent) -> String {
        if event.event_type == EventType::PromptSubmitted {
            return self.names.principal.clone();
        }

        let source = event.source_app.to_lowercase();
        if SUB_AGENT_TYPES.contains(&source.as_str()) {
            return capitalize(&source);
        }

        self.registry
            .agent_for_session(&event.session_id)
            .unwrap_or_else(|| self.names.assistant.clone())
    }

    /// Synthesize a completion event for every to-do item that newly reached
    /// `completed` relative to the last list seen for the session.
    fn diff_todos(&mut self, event: &NewEvent) -> Vec<NewEvent> {
        if event.event_type != EventType::ToolInvoked
            || event.payload.get("tool_name").and_then(Value::as_str) != Some(TODO_TOOL)
        {
            return Vec::new();
        }

        // A list that is not an array leaves the remembered state untouched.
        let Some(todos) = event
            .payload
            .get("tool_input")
            .and_then(|input| input.get("todos"))
            .and_then(Value::as_array)
        else {
            return Vec::new();
        };

        // Malformed items are skipped one by one.
        let current: Vec<TodoItem> = todos
            .iter()
            .filter_map(|item| TodoItem::deserialize(item).ok())
            .collect();

        let previous = self
            .session_todos
            .get(&event.session_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let completions: Vec<NewEvent> = current
            .iter()
            .filter(|item| item.is_completed())
            .filter(|item| {
                !previous
                    .iter()
                    .any(|prev| prev.content == item.content && prev.is_completed())
            })
            .map(|item| NewEvent {
                event_type: EventType::TaskCompleted,
                payload: json!({ "task": item.content }),
                summary: Some(truncate_chars(&item.content, MAX_SUMMARY_CHARS)),
                ..event.clone()
            })
            .collect();

        self.session_todos.insert(event.session_id.clone(), current);
        completions
    }
}

fn base_event(
    entry: &MessageEntry,
    event_type: EventType,
    payload: Value,
    summary: Option<String>,
) -> NewEvent {
    NewEvent {
        source_app: PRIMARY_SOURCE_APP.to_string(),
        session_id: entry
            .session_id
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        timestamp: timestamp_millis(entry.timestamp.as_ref()),
        event_type,
        payload,
        summary,
        agent_name: String::new(),
    }
}

fn user_event(entry: &MessageEntry) -> Option<NewEvent> {
    if let Some((tool_use_id, content)) = entry.first_tool_result() {
        let result = match content {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Some(base_event(
            entry,
            EventType::ToolResult,
            json!({ "tool_use_id": tool_use_id, "tool_result": result }),
            Some("Tool result received".to_string()),
        ));
    }

    let prompt = entry.text();
    let summary = truncate_chars(&prompt, MAX_SUMMARY_CHARS);
    Some(base_event(
        entry,
        EventType::PromptSubmitted,
        json!({ "prompt": prompt }),
        Some(summary),
    ))
}

fn assistant_event(entry: &MessageEntry) -> Option<NewEvent> {
    if let Some((name, input)) = entry.first_tool_use() {
        let summary = format!("{}: {}", name, truncate_chars(&input.to_string(), MAX_SUMMARY_CHARS));
        return Some(base_event(
            entry,
            EventType::ToolInvoked,
            json!({ "tool_name": name, "tool_input": input }),
            Some(summary),
        ));
    }

    let text = entry.first_text_block()?;
    Some(base_event(
        entry,
        EventType::ResponseCompleted,
        json!({ "response": text }),
        Some(truncate_chars(text, MAX_SUMMARY_CHARS)),
    ))
}

/// Apply the size limits every stored event must respect.
fn seal(mut event: NewEvent) -> NewEvent {
    truncate_value(&mut event.payload, MAX_PAYLOAD_CHARS);
    event.summary = event
        .summary
        .map(|s| truncate_chars(&s, MAX_SUMMARY_CHARS));
    event
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
