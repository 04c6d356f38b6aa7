//! Summary numbers for one reconstructed conversation.

use serde::Serialize;
use sessionlens_core::{LogRecord, Turn};

/// Counts derived from the turn sequence, plus the wall-clock span of the records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversationStats {
    pub user_prompts: u64,
    pub assistant_turns: u64,
    pub tool_calls: u64,
    /// Attached tool results flagged `is_error`
    pub tool_errors: u64,
    /// Model of the first assistant turn that names one
    pub model: Option<String>,
    /// First record to last record; 0 when either timestamp is unparseable
    pub duration_ms: u64,
}

/// Compute stats over `turns`; `records` are the ordered records they were built from.
pub fn conversation_stats(turns: &[Turn], records: &[LogRecord]) -> ConversationStats {
    let mut stats = ConversationStats::default();
    for turn in turns {
        match turn {
            Turn::UserPrompt { .. } => stats.user_prompts += 1,
            Turn::AssistantTurn(turn) => {
                stats.assistant_turns += 1;
                if stats.model.is_none() {
                    stats.model.clone_from(&turn.model);
                }
                stats.tool_calls += turn.tool_uses().count() as u64;
                stats.tool_errors += turn.tool_results.values().filter(|r| r.is_error).count() as u64;
            }
            _ => {}
        }
    }

    let first = records.first().and_then(LogRecord::timestamp_millis);
    let last = records.last().and_then(LogRecord::timestamp_millis);
    if let (Some(first), Some(last)) = (first, last) {
        stats.duration_ms = u64::try_from(last - first).unwrap_or(0);
    }
    stats
}
