// [[RARO]]/apps/telemetry-server/src/tasks/parse.rs
// Purpose: Parses task output files. Two formats share the `.output` extension:
//          sub-agent transcripts (one JSON record per line) and raw command output.
// Architecture: Task Engine
// Dependencies: serde_json

use serde_json::Value;

use super::describe;
use crate::events::{timestamp_millis, truncate_chars};
use crate::models::TaskType;
use crate::transcript::{record_error, MessageContent, RawEntry};

const PROMPT_CHARS: usize = 500;
const RESULT_CHARS: usize = 1000;
const PREVIEW_CHARS: usize = 500;
const DESCRIPTION_CHARS: usize = 60;

const PLAIN_PROMPT_CHARS: usize = 200;
const PLAIN_ERROR_CHARS: usize = 200;
const PLAIN_RESULT_LINES: usize = 5;
const PLAIN_PREVIEW_LINES: usize = 10;

/// Filesystem times of the output file, in ms since epoch.
#[derive(Debug, Clone, Copy)]
pub struct FileTimes {
    pub created: i64,
    pub modified: i64,
}

/// Everything a task scan learns from the file content alone.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTask {
    pub session_id: String,
    pub agent_id: String,
    pub started_at: i64,
    pub last_activity: i64,
    pub description: String,
    pub prompt: Option<String>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub event_count: usize,
    pub preview: String,
    pub task_type: TaskType,
}

/// Structured when the first line is a JSON object.
pub fn detect_format(content: &str) -> TaskType {
    let first = content.split('\n').next().unwrap_or("").trim();
    match serde_json::from_str::<Value>(first) {
        Ok(Value::Object(_)) => TaskType::Structured,
        _ => TaskType::Plain,
    }
}

pub fn parse_output(task_id: &str, content: &str, times: FileTimes) -> ParsedTask {
    match detect_format(content) {
        TaskType::Structured => parse_structured(task_id, content, times),
        _ => parse_plain(task_id, content, times),
    }
}

fn non_blank_lines(content: &str) -> Vec<&str> {
    content.lines().filter(|l| !l.trim().is_empty()).collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn parse_structured(task_id: &str, content: &str, times: FileTimes) -> ParsedTask {
    let lines = non_blank_lines(content);

    let mut session_id = String::new();
    let mut agent_id = task_id.to_string();
    let mut first_ts: Option<i64> = None;
    let mut last_ts: Option<i64> = None;
    let mut prompt = String::new();
    let mut result = String::new();
    let mut error = String::new();

    for line in &lines {
        // Non-JSON lines inside a transcript are ignored.
        let Ok(value) = serde_json::from_str::<Value>(line) else {
            continue;
        };

        if session_id.is_empty() {
            if let Some(s) = value.get("sessionId").and_then(Value::as_str) {
                session_id = s.to_string();
            }
        }
        if let Some(a) = value.get("agentId").and_then(Value::as_str) {
            agent_id = a.to_string();
        }
        if let Some(raw) = value.get("timestamp").filter(|v| !v.is_null()) {
            let ts = timestamp_millis(Some(raw));
            first_ts = Some(first_ts.map_or(ts, |t| t.min(ts)));
            last_ts = Some(last_ts.map_or(ts, |t| t.max(ts)));
        }
        if let Some(e) = record_error(&value) {
            error = e;
        }

        match RawEntry::from_value(value) {
            RawEntry::User(entry) if prompt.is_empty() => {
                let text = match entry.message.as_ref().and_then(|m| m.content.as_ref()) {
                    Some(MessageContent::Text(text)) => Some(text.as_str()),
                    Some(MessageContent::Blocks(_)) => entry.first_text_block(),
                    None => None,
                };
                if let Some(text) = text {
                    prompt = truncate_chars(text, PROMPT_CHARS);
                }
            }
            RawEntry::Assistant(entry) => {
                if let Some(text) = entry.first_text_block() {
                    result = truncate_chars(text, RESULT_CHARS);
                }
            }
            _ => {}
        }
    }

    let started_at = first_ts.unwrap_or(times.created);
    let description = if prompt.is_empty() {
        format!("Agent {}", task_id)
    } else {
        truncate_chars(&prompt, DESCRIPTION_CHARS)
    };

    ParsedTask {
        session_id,
        agent_id,
        started_at,
        last_activity: last_ts.unwrap_or(started_at),
        description,
        preview: truncate_chars(&result, PREVIEW_CHARS),
        prompt: non_empty(prompt),
        result: non_empty(result),
        error: non_empty(error),
        event_count: lines.len(),
        task_type: TaskType::Structured,
    }
}

fn parse_plain(task_id: &str, content: &str, times: FileTimes) -> ParsedTask {
    let lines = non_blank_lines(content);

    let error = lines
        .iter()
        .find(|l| {
            let lower = l.to_lowercase();
            lower.contains("error") || lower.contains("failed") || lower.contains("exception")
        })
        .map(|l| truncate_chars(l, PLAIN_ERROR_CHARS));

    let prompt = lines
        .first()
        .map(|l| truncate_chars(l, PLAIN_PROMPT_CHARS))
        .filter(|p| !p.is_empty());

    let tail = |n: usize| lines[lines.len().saturating_sub(n)..].join("\n");

    ParsedTask {
        session_id: String::new(),
        agent_id: task_id.to_string(),
        started_at: times.created,
        last_activity: times.modified,
        description: describe::describe(content, task_id),
        prompt,
        result: non_empty(truncate_chars(&tail(PLAIN_RESULT_LINES), PREVIEW_CHARS)),
        error,
        event_count: lines.len(),
        preview: tail(PLAIN_PREVIEW_LINES),
        task_type: TaskType::Plain,
    }
}
