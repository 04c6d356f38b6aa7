use crate::record::LogRecord;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// One content block of a user or assistant message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Map<String, Value>,
    },
    ToolResult {
        tool_use_id: String,
        is_error: bool,
        /// Display text, already unwrapped from list/envelope shapes
        content: String,
    },
    /// Block types this crate does not model (images, documents, ...)
    Other {
        raw: Value,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self, Self::ToolResult { .. })
    }

    /// `(id, name, input)` for tool_use blocks.
    pub fn as_tool_use(&self) -> Option<(&str, &str, &Map<String, Value>)> {
        match self {
            Self::ToolUse { id, name, input } => Some((id, name, input)),
            _ => None,
        }
    }
}

/// Token accounting for one API response (or a merged turn).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.input_tokens
            + self.output_tokens
            + self.cache_read_input_tokens
            + self.cache_creation_input_tokens
    }
}

/// Result delivered for a tool_use block, keyed by the tool_use id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolResultInfo {
    pub content: String,
    pub is_error: bool,
    /// Timestamp of the record that delivered the result
    pub timestamp: String,
}

/// A complete assistant response, possibly stitched from several records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantTurn {
    pub records: Vec<LogRecord>,
    pub content: Vec<ContentBlock>,
    pub tool_results: BTreeMap<String, ToolResultInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Timestamp of the record that opened the turn
    pub timestamp: String,
}

impl AssistantTurn {
    /// Iterate `(id, name, input)` over the turn's tool_use blocks in order.
    pub fn tool_uses(&self) -> impl Iterator<Item = (&str, &str, &Map<String, Value>)> {
        self.content.iter().filter_map(ContentBlock::as_tool_use)
    }

    pub fn has_tool_use(&self, tool_use_id: &str) -> bool {
        self.tool_uses().any(|(id, _, _)| id == tool_use_id)
    }

    pub fn tool_result(&self, tool_use_id: &str) -> Option<&ToolResultInfo> {
        self.tool_results.get(tool_use_id)
    }
}

/// One renderable unit of a reconstructed conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Turn {
    UserPrompt {
        record: LogRecord,
        content: Vec<ContentBlock>,
    },
    AssistantTurn(AssistantTurn),
    CompactSummary {
        record: LogRecord,
        text: String,
    },
    SkillLoaded {
        record: LogRecord,
        skill_name: String,
        text: String,
    },
    TurnSeparator {
        duration_ms: u64,
        timestamp: String,
    },
    Noise {
        record: LogRecord,
    },
}

impl Turn {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UserPrompt { .. } => "user_prompt",
            Self::AssistantTurn(_) => "assistant_turn",
            Self::CompactSummary { .. } => "compact_summary",
            Self::SkillLoaded { .. } => "skill_loaded",
            Self::TurnSeparator { .. } => "turn_separator",
            Self::Noise { .. } => "noise",
        }
    }

    pub fn as_assistant(&self) -> Option<&AssistantTurn> {
        match self {
            Self::AssistantTurn(turn) => Some(turn),
            _ => None,
        }
    }
}

/// Status of a tracked task on the board.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Deleted,
    Unrecognized(String),
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Deleted => "deleted",
            Self::Unrecognized(other) => other,
        }
    }
}

impl From<&str> for TaskStatus {
    fn from(value: &str) -> Self {
        match value {
            "pending" => Self::Pending,
            "in_progress" => Self::InProgress,
            "completed" => Self::Completed,
            "deleted" => Self::Deleted,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

impl From<String> for TaskStatus {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<TaskStatus> for String {
    fn from(value: TaskStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One task as it stood on the board at a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTimelineItem {
    pub task_id: String,
    pub content: String,
    pub status: TaskStatus,
}
