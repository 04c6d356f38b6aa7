//! Conversation reconstruction for Claude Code session logs.
//!
//! [`reconstruct`] turns a flat, possibly slightly out-of-order list of
//! [`LogRecord`]s into renderable [`Turn`]s plus the derived views a
//! renderer needs: Task call -> subagent links, per-agent record lists, and
//! task board snapshots. The transform is pure and infallible; callers that
//! receive more records simply run it again over the longer list.

pub mod classify;
pub mod reorder;
pub mod sidechain;
pub mod stats;
pub mod tasks;
pub mod turns;

pub use classify::{
    ClassifiedRecord, ProgressData, SystemMarker, classify, extract_cwd, extract_tool_result_text,
};
pub use reorder::reorder;
pub use sidechain::{SidechainMap, first_user_prompt_text, match_tasks_to_agents, split};
pub use stats::{ConversationStats, conversation_stats};
pub use tasks::{TaskSnapshot, TaskTimeline, build_task_timeline, is_task_tool};
pub use turns::{TurnBuilder, build_turns};

use serde::Serialize;
use sessionlens_core::{LogRecord, Turn};
use std::collections::BTreeMap;

/// Knobs for one reconstruction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconstructOptions {
    /// Emit filtered record types as `noise` turns
    pub include_noise: bool,
    /// Max timestamp gap for the injected-text / tool-result swap
    pub reorder_window_ms: u64,
}

impl Default for ReconstructOptions {
    fn default() -> Self {
        Self {
            include_noise: false,
            reorder_window_ms: reorder::DEFAULT_WINDOW_MS,
        }
    }
}

/// Everything a renderer needs for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Conversation {
    pub turns: Vec<Turn>,
    /// Task tool_use id -> agent id
    pub task_agents: BTreeMap<String, String>,
    pub sidechains: SidechainMap,
    pub task_timeline: TaskTimeline,
    pub cwd: String,
    /// Main-thread counts and the span of all records
    pub stats: ConversationStats,
}

impl Conversation {
    /// Agent spawned by the Task call with this tool_use id.
    pub fn agent_for_task(&self, tool_use_id: &str) -> Option<&str> {
        self.task_agents.get(tool_use_id).map(String::as_str)
    }

    /// Turns of one subagent's conversation, built the same way as the main thread.
    ///
    /// Sidechain records never carry nested sidechains, so this is a plain
    /// reorder + fold. Unknown agents yield no turns.
    pub fn sidechain_turns(&self, agent_id: &str, options: &ReconstructOptions) -> Vec<Turn> {
        self.sidechains
            .get(agent_id)
            .map(|records| thread_turns(records, options))
            .unwrap_or_default()
    }

    /// Agents that no Task call was matched to, in appearance order.
    pub fn unmatched_agents(&self) -> Vec<&str> {
        self.sidechains
            .agent_ids()
            .filter(|agent| !self.task_agents.values().any(|a| a == agent))
            .collect()
    }
}

fn thread_turns(records: &[LogRecord], options: &ReconstructOptions) -> Vec<Turn> {
    let ordered = reorder(records, options.reorder_window_ms);
    build_turns(&ordered, options.include_noise)
}

/// Rebuild the conversation from a session's records.
pub fn reconstruct(records: &[LogRecord], options: &ReconstructOptions) -> Conversation {
    let (main, sidechains) = split(records);
    let turns = thread_turns(&main, options);
    let task_timeline = build_task_timeline(&turns);
    let task_agents = match_tasks_to_agents(&main, &sidechains);
    let stats = conversation_stats(&turns, records);
    tracing::debug!(
        "Reconstructed {} turns from {} records ({} sidechains, {} task snapshots)",
        turns.len(),
        records.len(),
        sidechains.len(),
        task_timeline.len()
    );
    Conversation {
        turns,
        task_agents,
        sidechains,
        task_timeline,
        cwd: extract_cwd(records),
        stats,
    }
}
