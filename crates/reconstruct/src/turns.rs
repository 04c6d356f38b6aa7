//! Turn Builder: folds an ordered record list into [`Turn`]s.
//!
//! The builder is a two-state machine. `open` is `None` while idle and holds
//! the assistant turn being accumulated otherwise. Every turn-terminating
//! event flushes it; end of input flushes whatever is left.

use crate::classify::{ClassifiedRecord, classify};
use regex::Regex;
use sessionlens_core::{
    AssistantTurn, ContentBlock, LogRecord, MsgType, ToolResultInfo, Turn, Usage,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

/// First text of a user record carrying injected skill content.
pub const SKILL_MARKER: &str = "Base directory for this skill:";
const DEFAULT_SKILL_NAME: &str = "skill";

static SKILL_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"skills/([^\n/]+)").unwrap());

/// Fold state carried across records.
#[derive(Debug, Default)]
pub struct TurnBuilder {
    include_noise: bool,
    turns: Vec<Turn>,
    open: Option<AssistantTurn>,
    /// Message ids already counted toward the open turn's output tokens
    seen_message_ids: HashSet<String>,
}

impl TurnBuilder {
    pub fn new(include_noise: bool) -> Self {
        Self {
            include_noise,
            ..Self::default()
        }
    }

    /// Whether an assistant turn is currently accumulating.
    pub fn is_accumulating(&self) -> bool {
        self.open.is_some()
    }

    /// Feed one record.
    pub fn push(&mut self, record: &LogRecord) {
        match &record.msg_type {
            MsgType::User => self.push_user(record),
            MsgType::Assistant => self.push_assistant(record),
            MsgType::System => self.push_system(record),
            MsgType::Progress
            | MsgType::QueueOperation
            | MsgType::FileHistorySnapshot
            | MsgType::Unknown(_) => self.push_noise(record),
        }
    }

    /// Flush the open turn and return every turn built so far.
    pub fn finish(mut self) -> Vec<Turn> {
        self.flush();
        self.turns
    }

    fn flush(&mut self) {
        if let Some(turn) = self.open.take() {
            self.turns.push(Turn::AssistantTurn(turn));
            self.seen_message_ids.clear();
        }
    }

    fn push_noise(&mut self, record: &LogRecord) {
        if self.include_noise {
            self.turns.push(Turn::Noise {
                record: record.clone(),
            });
        }
    }

    fn push_system(&mut self, record: &LogRecord) {
        let marker = classify(&record.raw).system.unwrap_or_default();
        if marker.is_turn_duration() {
            self.flush();
            self.turns.push(Turn::TurnSeparator {
                duration_ms: marker.duration_ms.unwrap_or(0),
                timestamp: record.timestamp.clone(),
            });
        } else {
            self.push_noise(record);
        }
    }

    fn push_user(&mut self, record: &LogRecord) {
        let classified = classify(&record.raw);

        if classified.is_compact_summary {
            self.flush();
            self.turns.push(Turn::CompactSummary {
                record: record.clone(),
                text: classified.joined_text(),
            });
            return;
        }

        if classified.is_tool_result {
            self.attach_tool_results(record, classified.content);
            return;
        }

        let first_text = classified.first_text();
        if first_text.starts_with(SKILL_MARKER) {
            let skill_name = SKILL_NAME_RE
                .captures(first_text)
                .map(|caps| caps[1].to_string())
                .unwrap_or_else(|| DEFAULT_SKILL_NAME.to_string());
            let text = first_text.to_string();
            self.flush();
            self.turns.push(Turn::SkillLoaded {
                record: record.clone(),
                skill_name,
                text,
            });
            return;
        }

        self.flush();
        self.turns.push(Turn::UserPrompt {
            record: record.clone(),
            content: classified.content,
        });
    }

    /// Attach delivered results to the open turn. Never opens or closes a turn.
    fn attach_tool_results(&mut self, record: &LogRecord, content: Vec<ContentBlock>) {
        let Some(open) = self.open.as_mut() else {
            tracing::debug!(
                "Dropping tool result at {} with no open assistant turn",
                record.timestamp
            );
            return;
        };
        for block in content {
            let ContentBlock::ToolResult {
                tool_use_id,
                is_error,
                content,
            } = block
            else {
                continue;
            };
            if tool_use_id.is_empty() || !open.has_tool_use(&tool_use_id) {
                tracing::debug!("Dropping unmatched tool result {}", tool_use_id);
                continue;
            }
            open.tool_results.insert(
                tool_use_id,
                ToolResultInfo {
                    content,
                    is_error,
                    timestamp: record.timestamp.clone(),
                },
            );
        }
    }

    fn push_assistant(&mut self, record: &LogRecord) {
        let ClassifiedRecord {
            content,
            model,
            usage,
            message_id,
            ..
        } = classify(&record.raw);

        let Some(open) = self.open.as_mut() else {
            if let Some(id) = message_id {
                self.seen_message_ids.insert(id);
            }
            self.open = Some(AssistantTurn {
                records: vec![record.clone()],
                content,
                tool_results: BTreeMap::new(),
                model,
                usage,
                timestamp: record.timestamp.clone(),
            });
            return;
        };

        open.records.push(record.clone());
        open.content.extend(content);
        if open.model.is_none() {
            open.model = model;
        }

        // Streamed fragments of one API response repeat the same id and usage.
        let Some(usage) = usage.filter(|u| u.output_tokens > 0) else {
            return;
        };
        let Some(id) = message_id else {
            return;
        };
        if !self.seen_message_ids.insert(id) {
            return;
        }
        open.usage = Some(match open.usage {
            Some(current) => Usage {
                output_tokens: current.output_tokens + usage.output_tokens,
                ..current
            },
            None => usage,
        });
    }
}

/// Build the turn sequence for records that are already in final order.
pub fn build_turns(records: &[LogRecord], include_noise: bool) -> Vec<Turn> {
    let mut builder = TurnBuilder::new(include_noise);
    for record in records {
        builder.push(record);
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sessionlens_core::testing::{
        TS, assistant_blocks, record, record_at, tool_result, user_text,
    };

    fn assistant_with_usage(id: &str, text: &str, input: u64, output: u64) -> LogRecord {
        record(
            "assistant",
            json!({
                "type": "assistant",
                "message": {
                    "id": id,
                    "model": "claude-opus-4-20250514",
                    "content": [{"type": "text", "text": text}],
                    "usage": {"input_tokens": input, "output_tokens": output}
                }
            }),
        )
    }

    fn kinds(turns: &[Turn]) -> Vec<&'static str> {
        turns.iter().map(Turn::kind).collect()
    }

    #[test]
    fn two_record_exchange() {
        let turns = build_turns(
            &[
                user_text(TS, "hi"),
                assistant_blocks(TS, json!([{"type": "text", "text": "hello"}])),
            ],
            false,
        );
        assert_eq!(kinds(&turns), ["user_prompt", "assistant_turn"]);
        let assistant = turns[1].as_assistant().unwrap();
        assert_eq!(assistant.content, vec![ContentBlock::text("hello")]);
    }

    #[test]
    fn streamed_fragments_merge_into_one_turn() {
        let turns = build_turns(
            &[
                user_text(TS, "hi"),
                assistant_blocks(TS, json!([{"type": "thinking", "thinking": "hmm"}])),
                assistant_blocks(TS, json!([{"type": "text", "text": "part 2"}])),
            ],
            false,
        );
        assert_eq!(kinds(&turns), ["user_prompt", "assistant_turn"]);
        let assistant = turns[1].as_assistant().unwrap();
        assert_eq!(assistant.content.len(), 2);
        assert_eq!(assistant.records.len(), 2);
    }

    #[test]
    fn tool_round_trip_attaches_result() {
        let turns = build_turns(
            &[
                assistant_blocks(
                    TS,
                    json!([{"type": "tool_use", "id": "tu1", "name": "Bash", "input": {"command": "ls"}}]),
                ),
                tool_result("2025-01-01T00:00:01Z", "tu1", "file.txt"),
            ],
            false,
        );
        assert_eq!(turns.len(), 1);
        let info = turns[0].as_assistant().unwrap().tool_result("tu1").unwrap();
        assert_eq!(info.content, "file.txt");
        assert!(!info.is_error);
        assert_eq!(info.timestamp, "2025-01-01T00:00:01Z");
    }

    #[test]
    fn unmatched_tool_results_are_dropped() {
        let turns = build_turns(&[tool_result(TS, "tu1", "orphan")], false);
        assert!(turns.is_empty());

        let turns = build_turns(
            &[
                assistant_blocks(TS, json!([{"type": "text", "text": "no tools"}])),
                tool_result(TS, "tu9", "stray"),
            ],
            false,
        );
        assert!(turns[0].as_assistant().unwrap().tool_results.is_empty());
    }

    #[test]
    fn user_prompt_closes_open_turn() {
        let turns = build_turns(
            &[
                user_text(TS, "one"),
                assistant_blocks(TS, json!([{"type": "text", "text": "a"}])),
                user_text(TS, "two"),
                assistant_blocks(TS, json!([{"type": "text", "text": "b"}])),
            ],
            false,
        );
        assert_eq!(
            kinds(&turns),
            ["user_prompt", "assistant_turn", "user_prompt", "assistant_turn"]
        );
    }

    #[test]
    fn turn_duration_emits_separator() {
        let turns = build_turns(
            &[
                assistant_blocks(TS, json!([{"type": "text", "text": "a"}])),
                record(
                    "system",
                    json!({"type": "system", "subtype": "turn_duration", "durationMs": 5000}),
                ),
            ],
            false,
        );
        assert_eq!(kinds(&turns), ["assistant_turn", "turn_separator"]);
        assert!(matches!(turns[1], Turn::TurnSeparator { duration_ms: 5000, .. }));
    }

    #[test]
    fn other_system_records_are_noise() {
        let system = record("system", json!({"type": "system", "subtype": "init"}));
        assert!(build_turns(std::slice::from_ref(&system), false).is_empty());
        assert_eq!(kinds(&build_turns(&[system], true)), ["noise"]);
    }

    #[test]
    fn noise_does_not_close_assistant_turn() {
        let turns = build_turns(
            &[
                assistant_blocks(TS, json!([{"type": "text", "text": "a"}])),
                record("progress", json!({"type": "progress", "data": {"output": "..."}})),
                assistant_blocks(TS, json!([{"type": "text", "text": "b"}])),
            ],
            true,
        );
        assert_eq!(kinds(&turns), ["noise", "assistant_turn"]);
        assert_eq!(turns[1].as_assistant().unwrap().content.len(), 2);
    }

    #[test]
    fn unknown_types_never_affect_state() {
        let unknown = record("custom-event", json!({"type": "custom-event"}));
        let turns = build_turns(
            &[
                assistant_blocks(TS, json!([{"type": "text", "text": "a"}])),
                unknown.clone(),
                assistant_blocks(TS, json!([{"type": "text", "text": "b"}])),
            ],
            false,
        );
        assert_eq!(kinds(&turns), ["assistant_turn"]);
        assert_eq!(kinds(&build_turns(&[unknown], true)), ["noise"]);
    }

    #[test]
    fn compact_summary_joins_text_blocks() {
        let summary = record(
            "user",
            json!({
                "type": "user",
                "isCompactSummary": true,
                "message": {"content": [
                    {"type": "text", "text": "first"},
                    {"type": "text", "text": "second"}
                ]}
            }),
        );
        let turns = build_turns(&[summary], false);
        match &turns[0] {
            Turn::CompactSummary { text, .. } => assert_eq!(text, "first\nsecond"),
            other => panic!("unexpected turn {other:?}"),
        }
    }

    #[test]
    fn skill_banner_extracts_name() {
        let turns = build_turns(
            &[user_text(
                TS,
                "Base directory for this skill: /home/u/.claude/skills/pdf-tools\n\nUse it.",
            )],
            false,
        );
        match &turns[0] {
            Turn::SkillLoaded { skill_name, .. } => assert_eq!(skill_name, "pdf-tools"),
            other => panic!("unexpected turn {other:?}"),
        }

        let turns = build_turns(&[user_text(TS, "Base directory for this skill: /tmp")], false);
        assert!(matches!(&turns[0], Turn::SkillLoaded { skill_name, .. } if skill_name == "skill"));
    }

    #[test]
    fn output_tokens_counted_once_per_message_id() {
        let turns = build_turns(
            &[
                assistant_with_usage("msg_1", "a", 100, 10),
                assistant_with_usage("msg_1", "b", 100, 10),
                assistant_with_usage("msg_2", "c", 300, 25),
                assistant_with_usage("msg_2", "d", 300, 25),
            ],
            false,
        );
        let usage = turns[0].as_assistant().unwrap().usage.unwrap();
        assert_eq!(usage.output_tokens, 35);
        assert_eq!(usage.input_tokens, 100);
    }

    #[test]
    fn usage_adopted_from_first_usage_bearing_record() {
        let turns = build_turns(
            &[
                assistant_blocks(TS, json!([{"type": "text", "text": "a"}])),
                assistant_with_usage("msg_9", "b", 42, 7),
            ],
            false,
        );
        let assistant = turns[0].as_assistant().unwrap();
        assert_eq!(assistant.usage.unwrap().input_tokens, 42);
        assert_eq!(assistant.model.as_deref(), Some("claude-opus-4-20250514"));
    }

    #[test]
    fn seen_ids_reset_between_turns() {
        let turns = build_turns(
            &[
                assistant_with_usage("msg_1", "a", 1, 10),
                user_text(TS, "next"),
                assistant_with_usage("msg_0", "b", 1, 3),
                assistant_with_usage("msg_1", "c", 1, 10),
            ],
            false,
        );
        assert_eq!(turns[2].as_assistant().unwrap().usage.unwrap().output_tokens, 13);
    }

    #[test]
    fn malformed_user_body_degrades_to_prompt() {
        let turns = build_turns(&[record_at("user", TS, json!("x"))], false);
        assert_eq!(kinds(&turns), ["user_prompt"]);
    }

    #[test]
    fn builder_is_idle_after_finish_of_flushed_input() {
        let mut builder = TurnBuilder::new(false);
        builder.push(&assistant_blocks(TS, json!([{"type": "text", "text": "a"}])));
        assert!(builder.is_accumulating());
        builder.push(&user_text(TS, "b"));
        assert!(!builder.is_accumulating());
        assert_eq!(builder.finish().len(), 2);
    }
}
