//! Local repair of the skill-injection ordering artifact.
//!
//! A tool that injects side-content (e.g. `Skill`) logs that user text a
//! millisecond or so *before* the tool_result closing the call. Folding the
//! records in that order would close the assistant turn early and drop the
//! result, so adjacent pairs inside a small window are swapped back.

use crate::classify::{ClassifiedRecord, classify};
use sessionlens_core::{LogRecord, MsgType};

/// Tolerance used by the reference behaviour.
pub const DEFAULT_WINDOW_MS: u64 = 100;

/// Return a permutation of `records` with injected user text moved after the
/// tool result it preceded.
///
/// A pair is swapped when both records are `user`, the later one is a
/// tool-result delivery, the earlier one is neither a delivery nor a
/// compaction banner, and both timestamps parse and differ by less than
/// `window_ms`. After a swap the scan skips past the pair, so no record
/// moves more than one slot.
pub fn reorder(records: &[LogRecord], window_ms: u64) -> Vec<LogRecord> {
    let mut result = records.to_vec();
    let mut i = 1;
    while i < result.len() {
        if should_swap(&result[i - 1], &result[i], window_ms) {
            tracing::trace!(
                "Moving tool result at {} ahead of injected user text at {}",
                result[i].timestamp,
                result[i - 1].timestamp
            );
            result.swap(i - 1, i);
            i += 2;
        } else {
            i += 1;
        }
    }
    result
}

fn should_swap(prev: &LogRecord, curr: &LogRecord, window_ms: u64) -> bool {
    if prev.msg_type != MsgType::User || curr.msg_type != MsgType::User {
        return false;
    }
    if !classify(&curr.raw).is_tool_result {
        return false;
    }
    let ClassifiedRecord {
        is_tool_result,
        is_compact_summary,
        ..
    } = classify(&prev.raw);
    if is_tool_result || is_compact_summary {
        return false;
    }
    match (prev.timestamp_millis(), curr.timestamp_millis()) {
        (Some(a), Some(b)) => a.abs_diff(b) < window_ms,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sessionlens_core::testing::{record_at, tool_result, user_text};

    fn timestamps(records: &[LogRecord]) -> Vec<&str> {
        records.iter().map(|r| r.timestamp.as_str()).collect()
    }

    #[test]
    fn swaps_injected_text_within_window() {
        let records = vec![
            user_text("2025-01-01T00:00:00.000Z", "Base directory for this skill: /x"),
            tool_result("2025-01-01T00:00:00.001Z", "tu1", "ok"),
        ];
        let out = reorder(&records, DEFAULT_WINDOW_MS);
        assert_eq!(
            timestamps(&out),
            ["2025-01-01T00:00:00.001Z", "2025-01-01T00:00:00.000Z"]
        );
    }

    #[test]
    fn keeps_order_outside_window() {
        let records = vec![
            user_text("2025-01-01T00:00:00.000Z", "hello"),
            tool_result("2025-01-01T00:00:01.000Z", "tu1", "ok"),
        ];
        assert_eq!(reorder(&records, DEFAULT_WINDOW_MS), records);
    }

    #[test]
    fn window_is_configurable() {
        let records = vec![
            user_text("2025-01-01T00:00:00.000Z", "hello"),
            tool_result("2025-01-01T00:00:00.500Z", "tu1", "ok"),
        ];
        assert_eq!(reorder(&records, DEFAULT_WINDOW_MS), records);
        assert_ne!(reorder(&records, 1_000), records);
    }

    #[test]
    fn never_moves_compact_summaries() {
        let summary = record_at(
            "user",
            "2025-01-01T00:00:00.000Z",
            json!({"type": "user", "isCompactSummary": true, "message": {"content": "sum"}}),
        );
        let records = vec![summary, tool_result("2025-01-01T00:00:00.001Z", "tu1", "ok")];
        assert_eq!(reorder(&records, DEFAULT_WINDOW_MS), records);
    }

    #[test]
    fn ignores_non_user_pairs() {
        let assistant = record_at(
            "assistant",
            "2025-01-01T00:00:00.000Z",
            json!({"type": "assistant", "message": {"content": [{"type": "text", "text": "x"}]}}),
        );
        let records = vec![assistant, tool_result("2025-01-01T00:00:00.001Z", "tu1", "ok")];
        assert_eq!(reorder(&records, DEFAULT_WINDOW_MS), records);
    }

    #[test]
    fn unparseable_timestamps_never_swap() {
        let records = vec![
            user_text("not-a-time", "hello"),
            tool_result("2025-01-01T00:00:00.001Z", "tu1", "ok"),
        ];
        assert_eq!(reorder(&records, DEFAULT_WINDOW_MS), records);
    }

    #[test]
    fn swap_does_not_cascade() {
        let records = vec![
            user_text("2025-01-01T00:00:00.000Z", "injected"),
            tool_result("2025-01-01T00:00:00.001Z", "tu1", "a"),
            tool_result("2025-01-01T00:00:00.002Z", "tu2", "b"),
        ];
        let out = reorder(&records, DEFAULT_WINDOW_MS);
        assert_eq!(
            timestamps(&out),
            [
                "2025-01-01T00:00:00.001Z",
                "2025-01-01T00:00:00.000Z",
                "2025-01-01T00:00:00.002Z"
            ]
        );
    }
}
