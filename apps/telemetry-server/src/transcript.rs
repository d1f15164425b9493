// [[RARO]]/apps/telemetry-server/src/transcript.rs
// Purpose: Raw transcript entry shapes. Lines decode in two steps: JSON syntax
//          first (a failure there is a malformed line), then the entry shape.
//          Unknown shapes land in `RawEntry::Unrecognized` instead of failing.
// Architecture: Ingestion Layer
// Dependencies: serde

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RawEntry {
    User(MessageEntry),
    Assistant(MessageEntry),
    QueueOperation,
    Summary,
    #[serde(other)]
    Unrecognized,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageEntry {
    pub session_id: Option<String>,
    pub timestamp: Option<Value>,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Message {
    pub role: Option<String>,
    pub content: Option<MessageContent>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    // Fields are optional so an explicit `null` does not reject the entry.
    Text {
        #[serde(default)]
        text: Option<String>,
    },
    ToolUse {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        #[serde(default)]
        tool_use_id: Option<String>,
        #[serde(default)]
        content: Value,
    },
    #[serde(other)]
    Other,
}

/// Decode one transcript line.
///
/// Returns `Err` only for lines that are not JSON at all.
pub fn parse_line(line: &str) -> Result<RawEntry, serde_json::Error> {
    let value: Value = serde_json::from_str(line.trim())?;
    Ok(RawEntry::from_value(value))
}

impl RawEntry {
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or(RawEntry::Unrecognized)
    }
}

impl MessageEntry {
    pub fn role(&self) -> Option<&str> {
        self.message.as_ref().and_then(|m| m.role.as_deref())
    }

    fn blocks(&self) -> &[ContentBlock] {
        match self.message.as_ref().and_then(|m| m.content.as_ref()) {
            Some(MessageContent::Blocks(blocks)) => blocks,
            _ => &[],
        }
    }

    /// Plain text of the message: the string content, or text blocks joined by a space.
    pub fn text(&self) -> String {
        match self.message.as_ref().and_then(|m| m.content.as_ref()) {
            Some(MessageContent::Text(text)) => text.clone(),
            Some(MessageContent::Blocks(blocks)) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => text.as_deref(),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(" "),
            None => String::new(),
        }
    }

    /// First text block, if the content is block-structured.
    pub fn first_text_block(&self) -> Option<&str> {
        self.blocks().iter().find_map(|b| match b {
            ContentBlock::Text { text } => text.as_deref(),
            _ => None,
        })
    }

    pub fn first_tool_use(&self) -> Option<(&str, &Value)> {
        self.blocks().iter().find_map(|b| match b {
            ContentBlock::ToolUse { name, input } => Some((name.as_deref().unwrap_or(""), input)),
            _ => None,
        })
    }

    pub fn first_tool_result(&self) -> Option<(&str, &Value)> {
        self.blocks().iter().find_map(|b| match b {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
            } => Some((tool_use_id.as_deref().unwrap_or(""), content)),
            _ => None,
        })
    }
}

/// Error recorded on a raw record or its message, rendered as text.
///
/// Works on any record type, including ones without a message shape.
pub fn record_error(record: &Value) -> Option<String> {
    let raw = [record.get("error"), record.get("message").and_then(|m| m.get("error"))]
        .into_iter()
        .flatten()
        .find(|v| is_set(v))?;
    Some(match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

fn is_set(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}
