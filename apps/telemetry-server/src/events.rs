// [[RARO]]/apps/telemetry-server/src/events.rs
// Purpose: Canonical event schema shared by the normalizer, the store and the stream.
// Architecture: Domain Event Layer
// Dependencies: Serde, Chrono

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::BackgroundTask;

/// Hard cap for every string that enters an event payload.
pub const MAX_PAYLOAD_CHARS: usize = 500;
/// Cap for the one-line summary shown in event lists.
pub const MAX_SUMMARY_CHARS: usize = 100;

/// Closed set of event kinds. Wire names match the dashboard protocol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventType {
    /// The user submitted a prompt
    #[serde(rename = "UserPromptSubmit")]
    PromptSubmitted,
    /// The assistant invoked a tool
    #[serde(rename = "PreToolUse")]
    ToolInvoked,
    /// A tool returned its result
    #[serde(rename = "PostToolUse")]
    ToolResult,
    /// The assistant finished a text response
    #[serde(rename = "Stop")]
    ResponseCompleted,
    /// Synthesized when a to-do item flips to completed
    #[serde(rename = "Completed")]
    TaskCompleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PromptSubmitted => "UserPromptSubmit",
            EventType::ToolInvoked => "PreToolUse",
            EventType::ToolResult => "PostToolUse",
            EventType::ResponseCompleted => "Stop",
            EventType::TaskCompleted => "Completed",
        }
    }
}

/// An event produced by the normalizer, before the store has numbered it.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub source_app: String,
    pub session_id: String,
    pub timestamp: i64,
    pub event_type: EventType,
    pub payload: Value,
    pub summary: Option<String>,
    pub agent_name: String,
}

/// A stored, immutable event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: u64,
    pub source_app: String,
    pub session_id: String,
    pub timestamp: i64,
    #[serde(rename = "hook_event_type")]
    pub event_type: EventType,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub agent_name: String,
}

impl Event {
    pub fn from_new(id: u64, new: NewEvent) -> Self {
        Self {
            id,
            source_app: new.source_app,
            session_id: new.session_id,
            timestamp: new.timestamp,
            event_type: new.event_type,
            payload: new.payload,
            summary: new.summary,
            agent_name: new.agent_name,
        }
    }
}

/// Messages pushed to stream subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamMessage {
    Initial(Vec<Event>),
    Event(Event),
    TaskUpdate(BackgroundTask),
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Truncate every string in a JSON tree in place.
pub fn truncate_value(value: &mut Value, max: usize) {
    match value {
        Value::String(s) => {
            if s.chars().count() > max {
                *s = truncate_chars(s, max);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| truncate_value(v, max)),
        Value::Object(map) => map.values_mut().for_each(|v| truncate_value(v, max)),
        _ => {}
    }
}

/// Milliseconds since epoch for a raw timestamp field.
///
/// Accepts RFC 3339 strings and numeric millisecond values; anything else
/// falls back to the ingestion time.
pub fn timestamp_millis(raw: Option<&Value>) -> i64 {
    match raw {
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.timestamp_millis())
            .unwrap_or_else(|_| now_millis()),
        Some(Value::Number(n)) => n.as_i64().unwrap_or_else(now_millis),
        _ => now_millis(),
    }
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "héllo wörld";
        assert_eq!(truncate_chars(s, 4), "héll");
        assert_eq!(truncate_chars(s, 100), s);
    }

    #[test]
    fn truncate_value_walks_nested_payloads() {
        let long = "x".repeat(MAX_PAYLOAD_CHARS + 20);
        let mut payload = json!({
            "tool_input": { "command": long, "args": [long.clone(), 3] },
            "count": 7
        });
        truncate_value(&mut payload, MAX_PAYLOAD_CHARS);

        let command = payload["tool_input"]["command"].as_str().unwrap();
        assert_eq!(command.chars().count(), MAX_PAYLOAD_CHARS);
        let arg = payload["tool_input"]["args"][0].as_str().unwrap();
        assert_eq!(arg.chars().count(), MAX_PAYLOAD_CHARS);
        assert_eq!(payload["count"], 7);
    }

    #[test]
    fn timestamps_parse_rfc3339_and_numbers() {
        let ts = json!("2026-01-01T00:00:00.000Z");
        assert_eq!(timestamp_millis(Some(&ts)), 1_767_225_600_000);
        assert_eq!(timestamp_millis(Some(&json!(42))), 42);

        let before = now_millis();
        let fallback = timestamp_millis(Some(&json!("not a date")));
        assert!(fallback >= before);
    }

    #[test]
    fn stream_messages_are_tagged() {
        let event = Event::from_new(
            7,
            NewEvent {
                source_app: "claude-code".into(),
                session_id: "s1".into(),
                timestamp: 1,
                event_type: EventType::ResponseCompleted,
                payload: json!({"response": "done"}),
                summary: None,
                agent_name: "PAI".into(),
            },
        );
        let wire = serde_json::to_value(StreamMessage::Event(event)).unwrap();
        assert_eq!(wire["type"], "event");
        assert_eq!(wire["data"]["id"], 7);
        assert_eq!(wire["data"]["hook_event_type"], "Stop");
        assert!(wire["data"].get("summary").is_none());
    }
}
