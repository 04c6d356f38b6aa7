//! Record classification: one raw JSON body -> a typed, defensive view.
//!
//! Every body shape the log can contain is enumerated once in
//! [`RecordShape`] / [`MessageShape`]; anything unexpected lands in an
//! explicit fallback arm instead of being probed for at each call site.
//! Classification never fails: a body that is not a JSON object degrades
//! to a single text block holding the raw string.

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use sessionlens_core::{ContentBlock, LogRecord, MsgType, Usage};
use std::sync::LazyLock;

static TOOL_USE_ERROR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?tool_use_error>").unwrap());

/// Typed view of one record body.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedRecord {
    /// The body's own `type` discriminator (`unknown` when absent or unparseable)
    pub msg_type: MsgType,
    pub content: Vec<ContentBlock>,
    pub model: Option<String>,
    pub usage: Option<Usage>,
    /// A `user` record whose content is made only of tool_result blocks
    pub is_tool_result: bool,
    pub is_compact_summary: bool,
    /// API message id, used to deduplicate usage across streamed fragments
    pub message_id: Option<String>,
    pub progress: Option<ProgressData>,
    pub system: Option<SystemMarker>,
}

/// Payload of a `progress` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressData {
    pub kind: String,
    pub output: Option<String>,
}

/// Fields of a `system` record the turn builder cares about.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SystemMarker {
    pub subtype: Option<String>,
    pub duration_ms: Option<u64>,
}

impl SystemMarker {
    pub const TURN_DURATION: &'static str = "turn_duration";

    pub fn is_turn_duration(&self) -> bool {
        self.subtype.as_deref() == Some(Self::TURN_DURATION)
    }
}

impl ClassifiedRecord {
    fn empty(msg_type: MsgType) -> Self {
        Self {
            msg_type,
            content: Vec::new(),
            model: None,
            usage: None,
            is_tool_result: false,
            is_compact_summary: false,
            message_id: None,
            progress: None,
            system: None,
        }
    }

    fn degraded(raw: &str) -> Self {
        Self {
            content: vec![ContentBlock::text(raw)],
            ..Self::empty(MsgType::from("unknown"))
        }
    }

    /// Text of the first text block, or "" when there is none.
    pub fn first_text(&self) -> &str {
        self.content
            .iter()
            .find_map(ContentBlock::as_text)
            .unwrap_or("")
    }

    /// All text blocks joined by newlines.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ── Raw body decoding ───────────────────────────────────────────────────────

/// Top-level fields of a record body. Values stay loosely typed here and are
/// narrowed by [`RecordShape::decode`].
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvelope {
    #[serde(default, rename = "type")]
    kind: Option<Value>,
    #[serde(default)]
    message: Option<Value>,
    #[serde(default)]
    summary: Option<Value>,
    #[serde(default)]
    is_compact_summary: Option<Value>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    subtype: Option<Value>,
    #[serde(default)]
    duration_ms: Option<Value>,
    #[serde(default)]
    model: Option<Value>,
    #[serde(default)]
    usage: Option<Value>,
}

/// Every body layout the classifier distinguishes.
#[derive(Debug)]
enum RecordShape {
    Progress(ProgressData),
    /// `system`, `queue-operation`, `file-history-snapshot`
    Bookkeeping(Option<SystemMarker>),
    Message(MessageShape),
    Summary(String),
    Empty,
}

/// Layouts of the `message` field.
#[derive(Debug)]
enum MessageShape {
    /// `"message": "..."`
    Bare(String),
    /// `"message": {"content": [...]}`
    Blocks(Map<String, Value>, Vec<Value>),
    /// `"message": {"content": "..."}`
    ContentText(Map<String, Value>, String),
    /// `"message": {"type": "text", "text": "..."}`
    SingleBlock(Map<String, Value>),
    /// Anything else; rendered back to JSON text.
    Opaque(Value),
}

impl RecordShape {
    fn decode(msg_type: &MsgType, envelope: &mut RawEnvelope) -> Self {
        match msg_type {
            MsgType::Progress => {
                let data = envelope.data.take().unwrap_or(Value::Null);
                let kind = data
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("progress")
                    .to_string();
                let output = non_empty_str(data.get("output"))
                    .or_else(|| non_empty_str(data.get("fullOutput")))
                    .map(str::to_string);
                RecordShape::Progress(ProgressData { kind, output })
            }
            MsgType::System => RecordShape::Bookkeeping(Some(SystemMarker {
                subtype: envelope
                    .subtype
                    .as_ref()
                    .and_then(Value::as_str)
                    .map(str::to_string),
                duration_ms: envelope.duration_ms.as_ref().and_then(as_millis),
            })),
            MsgType::QueueOperation | MsgType::FileHistorySnapshot => {
                RecordShape::Bookkeeping(None)
            }
            _ => match envelope.message.take() {
                Some(message) if is_present(&message) => {
                    RecordShape::Message(MessageShape::decode(message))
                }
                _ => match non_empty_str(envelope.summary.as_ref()) {
                    Some(summary) => RecordShape::Summary(summary.to_string()),
                    None => RecordShape::Empty,
                },
            },
        }
    }
}

impl MessageShape {
    fn decode(message: Value) -> Self {
        match message {
            Value::String(text) => MessageShape::Bare(text),
            Value::Object(mut map) => match map.remove("content") {
                Some(Value::Array(blocks)) => MessageShape::Blocks(map, blocks),
                Some(Value::String(text)) => MessageShape::ContentText(map, text),
                other => {
                    if let Some(content) = other {
                        map.insert("content".to_string(), content);
                    }
                    let looks_like_text = non_empty_str(map.get("text")).is_some()
                        || map.get("type").and_then(Value::as_str) == Some("text");
                    if looks_like_text {
                        MessageShape::SingleBlock(map)
                    } else {
                        MessageShape::Opaque(Value::Object(map))
                    }
                }
            },
            other => MessageShape::Opaque(other),
        }
    }
}

/// Content block as it appears on the wire.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        #[serde(default)]
        text: Option<String>,
    },
    Thinking {
        #[serde(default)]
        thinking: Option<String>,
    },
    ToolUse {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        #[serde(default)]
        tool_use_id: Option<String>,
        #[serde(default)]
        is_error: Value,
    },
}

/// Decode one wire block. Unknown or malformed blocks are kept as [`ContentBlock::Other`].
pub fn decode_block(value: Value) -> ContentBlock {
    match WireBlock::deserialize(&value) {
        Ok(WireBlock::Text { text }) => ContentBlock::Text {
            text: text.unwrap_or_default(),
        },
        Ok(WireBlock::Thinking { thinking }) => ContentBlock::Thinking {
            thinking: thinking.unwrap_or_default(),
        },
        Ok(WireBlock::ToolUse { id, name, input }) => ContentBlock::ToolUse {
            id: id.unwrap_or_default(),
            name: name.unwrap_or_default(),
            input: match input {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        },
        Ok(WireBlock::ToolResult {
            tool_use_id,
            is_error,
        }) => ContentBlock::ToolResult {
            content: extract_tool_result_text(&value),
            tool_use_id: tool_use_id.unwrap_or_default(),
            is_error: is_error == Value::Bool(true),
        },
        Err(_) => match value {
            Value::String(text) => ContentBlock::Text { text },
            Value::Object(ref map) if !map.contains_key("type") => {
                match map.get("text").and_then(Value::as_str) {
                    Some(text) => ContentBlock::text(text),
                    None => ContentBlock::Other { raw: value },
                }
            }
            raw => ContentBlock::Other { raw },
        },
    }
}

/// Display text of a raw `tool_result` block.
///
/// Priority: string `content`, then the joined texts of a `content` list,
/// then `output`. `<tool_use_error>` markers are removed and the result trimmed.
pub fn extract_tool_result_text(block: &Value) -> String {
    let text = match block.get("content") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(text) => text.as_str(),
                other => other.get("text").and_then(Value::as_str).unwrap_or(""),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => non_empty_str(block.get("output"))
            .unwrap_or_default()
            .to_string(),
    };
    TOOL_USE_ERROR_RE.replace_all(&text, "").trim().to_string()
}

// ── Classification ──────────────────────────────────────────────────────────

/// Classify one raw record body. Total: never panics, never errors.
pub fn classify(raw: &str) -> ClassifiedRecord {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => {
            tracing::debug!("Degrading non-object record body");
            return ClassifiedRecord::degraded(raw);
        }
        Err(e) => {
            tracing::debug!("Degrading unparseable record body: {}", e);
            return ClassifiedRecord::degraded(raw);
        }
    };
    // Objects only: a derived struct decode would also accept arrays by position.
    let mut envelope = match RawEnvelope::deserialize(&value) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::debug!("Degrading malformed record envelope: {}", e);
            return ClassifiedRecord::degraded(raw);
        }
    };

    let msg_type = MsgType::from(
        envelope
            .kind
            .as_ref()
            .and_then(Value::as_str)
            .unwrap_or("unknown"),
    );
    let is_compact_summary = envelope.is_compact_summary == Some(Value::Bool(true));
    let top_model = envelope.model.take();
    let top_usage = envelope.usage.take();

    let shape = RecordShape::decode(&msg_type, &mut envelope);
    let mut classified = ClassifiedRecord::empty(msg_type);

    match shape {
        RecordShape::Progress(progress) => {
            classified.progress = Some(progress);
            return classified;
        }
        RecordShape::Bookkeeping(system) => {
            classified.system = system;
            return classified;
        }
        RecordShape::Summary(summary) => {
            classified.content = vec![ContentBlock::text(summary)];
        }
        RecordShape::Empty => {}
        RecordShape::Message(MessageShape::Bare(text)) => {
            classified.content = vec![ContentBlock::text(text)];
        }
        RecordShape::Message(MessageShape::Blocks(message, blocks)) => {
            classified.content = blocks.into_iter().map(decode_block).collect();
            classified.is_tool_result = classified.msg_type == MsgType::User
                && classified.content.iter().all(ContentBlock::is_tool_result);
            apply_message_meta(&mut classified, &message, top_model, top_usage);
        }
        RecordShape::Message(MessageShape::ContentText(message, text)) => {
            classified.content = vec![ContentBlock::text(text)];
            apply_message_meta(&mut classified, &message, top_model, top_usage);
        }
        RecordShape::Message(MessageShape::SingleBlock(message)) => {
            classified.message_id = string_field(&message, "id");
            classified.content = vec![decode_block(Value::Object(message))];
        }
        RecordShape::Message(MessageShape::Opaque(message)) => {
            if let Value::Object(ref map) = message {
                classified.message_id = string_field(map, "id");
            }
            classified.content = vec![ContentBlock::text(message.to_string())];
        }
    }

    classified.is_compact_summary = is_compact_summary;
    classified
}

/// Classify a record's body (convenience for [`LogRecord::raw`]).
pub fn classify_record(record: &LogRecord) -> ClassifiedRecord {
    classify(&record.raw)
}

fn apply_message_meta(
    classified: &mut ClassifiedRecord,
    message: &Map<String, Value>,
    top_model: Option<Value>,
    top_usage: Option<Value>,
) {
    classified.message_id = string_field(message, "id");
    classified.model = string_field(message, "model")
        .or_else(|| top_model.as_ref().and_then(Value::as_str).map(str::to_string));
    classified.usage = message
        .get("usage")
        .or(top_usage.as_ref())
        .and_then(|usage| Usage::deserialize(usage).ok());
}

// ── Session metadata ────────────────────────────────────────────────────────

/// Working directory of the session: the first body carrying a string `cwd`.
pub fn extract_cwd(records: &[LogRecord]) -> String {
    records
        .iter()
        .find_map(|record| {
            let body: Value = serde_json::from_str(&record.raw).ok()?;
            non_empty_str(body.get("cwd")).map(str::to_string)
        })
        .unwrap_or_default()
}

// ── Small JSON helpers ──────────────────────────────────────────────────────

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    non_empty_str(map.get(key)).map(str::to_string)
}

/// Truthiness of a `message` field: absent, null, `false` and "" count as missing.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn as_millis(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_f64().map(|ms| ms.max(0.0).round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_user_text_message() {
        let raw = json!({"type": "user", "message": {"role": "user", "content": "Hello"}});
        let result = classify(&raw.to_string());
        assert_eq!(result.msg_type, MsgType::User);
        assert_eq!(result.content, vec![ContentBlock::text("Hello")]);
        assert!(!result.is_tool_result);
    }

    #[test]
    fn parses_tool_result_user_message() {
        let raw = json!({
            "type": "user",
            "message": {"content": [{"type": "tool_result", "tool_use_id": "tu1", "content": "ok"}]}
        });
        let result = classify(&raw.to_string());
        assert!(result.is_tool_result);
        assert_eq!(
            result.content[0],
            ContentBlock::ToolResult {
                tool_use_id: "tu1".to_string(),
                is_error: false,
                content: "ok".to_string(),
            }
        );
    }

    #[test]
    fn tool_results_from_assistant_are_not_deliveries() {
        let raw = json!({
            "type": "assistant",
            "message": {"content": [{"type": "tool_result", "tool_use_id": "tu1", "content": "ok"}]}
        });
        assert!(!classify(&raw.to_string()).is_tool_result);
    }

    #[test]
    fn mixed_user_blocks_are_not_tool_results() {
        let raw = json!({
            "type": "user",
            "message": {"content": [
                {"type": "tool_result", "tool_use_id": "tu1", "content": "ok"},
                {"type": "text", "text": "and also"}
            ]}
        });
        assert!(!classify(&raw.to_string()).is_tool_result);
    }

    #[test]
    fn parses_assistant_message_with_usage() {
        let raw = json!({
            "type": "assistant",
            "message": {
                "id": "msg_1",
                "model": "claude-opus-4-20250514",
                "content": [{"type": "text", "text": "Hi"}],
                "usage": {"input_tokens": 100, "output_tokens": 50}
            }
        });
        let result = classify(&raw.to_string());
        assert_eq!(result.msg_type, MsgType::Assistant);
        assert_eq!(result.model.as_deref(), Some("claude-opus-4-20250514"));
        assert_eq!(result.usage.unwrap().input_tokens, 100);
        assert_eq!(result.usage.unwrap().cache_read_input_tokens, 0);
        assert_eq!(result.message_id.as_deref(), Some("msg_1"));
    }

    #[test]
    fn falls_back_to_top_level_model_and_usage() {
        let raw = json!({
            "type": "assistant",
            "model": "claude-haiku",
            "usage": {"output_tokens": 7},
            "message": {"content": [{"type": "text", "text": "Hi"}]}
        });
        let result = classify(&raw.to_string());
        assert_eq!(result.model.as_deref(), Some("claude-haiku"));
        assert_eq!(result.usage.unwrap().output_tokens, 7);
    }

    #[test]
    fn system_and_bookkeeping_have_no_content() {
        for kind in ["system", "queue-operation", "file-history-snapshot"] {
            let result = classify(&json!({"type": kind, "message": "ignored"}).to_string());
            assert_eq!(result.msg_type.as_str(), kind);
            assert!(result.content.is_empty());
            assert!(!result.is_tool_result);
            assert!(!result.is_compact_summary);
        }
    }

    #[test]
    fn system_records_expose_turn_duration() {
        let raw = json!({"type": "system", "subtype": "turn_duration", "durationMs": 5000});
        let system = classify(&raw.to_string()).system.unwrap();
        assert!(system.is_turn_duration());
        assert_eq!(system.duration_ms, Some(5000));
    }

    #[test]
    fn progress_prefers_output_then_full_output() {
        let raw = json!({"type": "progress", "data": {"type": "bash", "output": "building..."}});
        let progress = classify(&raw.to_string()).progress.unwrap();
        assert_eq!(progress.kind, "bash");
        assert_eq!(progress.output.as_deref(), Some("building..."));

        let raw = json!({"type": "progress", "data": {"fullOutput": "full output text"}});
        let progress = classify(&raw.to_string()).progress.unwrap();
        assert_eq!(progress.kind, "progress");
        assert_eq!(progress.output.as_deref(), Some("full output text"));

        let progress = classify(r#"{"type":"progress"}"#).progress.unwrap();
        assert_eq!(progress.output, None);
    }

    #[test]
    fn compact_summary_flag_survives_any_shape() {
        let raw = json!({"type": "user", "isCompactSummary": true, "message": {"content": "Summary text"}});
        let result = classify(&raw.to_string());
        assert!(result.is_compact_summary);
        assert_eq!(result.first_text(), "Summary text");

        let raw = json!({"type": "user", "isCompactSummary": "yes", "message": "x"});
        assert!(!classify(&raw.to_string()).is_compact_summary);
    }

    #[test]
    fn invalid_json_degrades_to_text() {
        let result = classify("not json at all");
        assert_eq!(result.msg_type, MsgType::Unknown("unknown".to_string()));
        assert_eq!(result.content, vec![ContentBlock::text("not json at all")]);
        assert!(!result.is_tool_result);
    }

    #[test]
    fn non_object_json_degrades_to_text() {
        let result = classify("[1,2,3]");
        assert_eq!(result.content, vec![ContentBlock::text("[1,2,3]")]);
    }

    #[test]
    fn array_body_is_not_decoded_by_position() {
        let result = classify(r#"["user","hi"]"#);
        assert_eq!(result.msg_type, MsgType::from("unknown"));
        assert_eq!(result.content, vec![ContentBlock::text(r#"["user","hi"]"#)]);
        assert!(!result.is_tool_result);
        assert!(result.model.is_none());
    }

    #[test]
    fn string_message_becomes_text_block() {
        let raw = json!({"type": "user", "message": "plain string message"});
        let result = classify(&raw.to_string());
        assert_eq!(result.content, vec![ContentBlock::text("plain string message")]);
    }

    #[test]
    fn single_block_message_is_used_as_is() {
        let raw = json!({"type": "assistant", "message": {"text": "some text", "type": "text"}});
        assert_eq!(classify(&raw.to_string()).first_text(), "some text");
    }

    #[test]
    fn unknown_message_shape_is_serialized_back() {
        let raw = json!({"type": "user", "message": {"foo": "bar"}});
        let result = classify(&raw.to_string());
        assert_eq!(result.content, vec![ContentBlock::text(r#"{"foo":"bar"}"#)]);
    }

    #[test]
    fn summary_field_without_message() {
        let raw = json!({"type": "summary", "summary": "This is a summary"});
        let result = classify(&raw.to_string());
        assert_eq!(result.content, vec![ContentBlock::text("This is a summary")]);
    }

    #[test]
    fn missing_type_and_message_is_empty() {
        let result = classify(r#"{"foo":1}"#);
        assert_eq!(result.msg_type.as_str(), "unknown");
        assert!(result.content.is_empty());
    }

    #[test]
    fn unknown_blocks_are_preserved() {
        let raw = json!({
            "type": "user",
            "message": {"content": [{"type": "image", "source": {"data": "..."}}]}
        });
        let result = classify(&raw.to_string());
        assert!(matches!(result.content[0], ContentBlock::Other { .. }));
        assert!(!result.is_tool_result);
    }

    #[test]
    fn tool_use_block_keeps_structured_input() {
        let block = decode_block(json!({
            "type": "tool_use", "id": "tu1", "name": "Bash", "input": {"command": "ls"}
        }));
        let (id, name, input) = block.as_tool_use().unwrap();
        assert_eq!((id, name), ("tu1", "Bash"));
        assert_eq!(input["command"], "ls");
    }

    #[test]
    fn extract_tool_result_text_priorities() {
        assert_eq!(extract_tool_result_text(&json!({"content": "hello"})), "hello");
        assert_eq!(
            extract_tool_result_text(&json!({"content": [
                {"type": "text", "text": "line1"},
                {"type": "text", "text": "line2"}
            ]})),
            "line1\nline2"
        );
        assert_eq!(
            extract_tool_result_text(&json!({"content": ["hello", "world"]})),
            "hello\nworld"
        );
        assert_eq!(extract_tool_result_text(&json!({"output": "output text"})), "output text");
        assert_eq!(extract_tool_result_text(&json!({})), "");
    }

    #[test]
    fn extract_tool_result_text_strips_error_markers() {
        let block = json!({
            "type": "tool_result",
            "content": "<tool_use_error>File does not exist.</tool_use_error>\n",
            "is_error": true
        });
        assert_eq!(extract_tool_result_text(&block), "File does not exist.");
        let decoded = decode_block(block);
        assert!(matches!(decoded, ContentBlock::ToolResult { is_error: true, .. }));
    }

    #[test]
    fn extract_cwd_skips_invalid_json() {
        use sessionlens_core::testing::{raw_record, record};
        let records = vec![
            raw_record("user", "not json"),
            record("user", json!({"cwd": "/found"})),
            record("user", json!({"cwd": "/other"})),
        ];
        assert_eq!(extract_cwd(&records), "/found");
        assert_eq!(extract_cwd(&[record("user", json!({"type": "user"}))]), "");
    }
}
