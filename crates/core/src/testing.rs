use crate::record::{LogRecord, MsgType};
use serde_json::{Value, json};

/// Default timestamp for test records.
pub const TS: &str = "2025-01-01T00:00:00Z";

/// Record with the given store type and JSON body (session "test", main thread).
pub fn record(msg_type: &str, body: Value) -> LogRecord {
    record_at(msg_type, TS, body)
}

/// Record with an explicit timestamp.
pub fn record_at(msg_type: &str, timestamp: &str, body: Value) -> LogRecord {
    LogRecord {
        session_id: "test".to_string(),
        msg_type: MsgType::from(msg_type),
        timestamp: timestamp.to_string(),
        raw: body.to_string(),
        file: String::new(),
        is_sidechain: false,
        agent_id: String::new(),
    }
}

/// Record whose body is an arbitrary (possibly invalid) string.
pub fn raw_record(msg_type: &str, raw: &str) -> LogRecord {
    LogRecord {
        raw: raw.to_string(),
        ..record(msg_type, Value::Null)
    }
}

/// Plain user prompt.
pub fn user_text(timestamp: &str, text: &str) -> LogRecord {
    record_at(
        "user",
        timestamp,
        json!({"type": "user", "message": {"role": "user", "content": text}}),
    )
}

/// Assistant record carrying the given content blocks.
pub fn assistant_blocks(timestamp: &str, blocks: Value) -> LogRecord {
    record_at(
        "assistant",
        timestamp,
        json!({"type": "assistant", "message": {"role": "assistant", "content": blocks}}),
    )
}

/// User record that only delivers one tool result.
pub fn tool_result(timestamp: &str, tool_use_id: &str, content: &str) -> LogRecord {
    record_at(
        "user",
        timestamp,
        json!({
            "type": "user",
            "message": {
                "role": "user",
                "content": [{"type": "tool_result", "tool_use_id": tool_use_id, "content": content}]
            }
        }),
    )
}

/// Mark a record as belonging to a subagent.
pub fn sidechain(mut record: LogRecord, agent_id: &str) -> LogRecord {
    record.is_sidechain = true;
    record.agent_id = agent_id.to_string();
    record
}
