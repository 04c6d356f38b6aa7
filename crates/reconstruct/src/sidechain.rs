//! Subagent (sidechain) separation and Task call matching.

use crate::classify::classify;
use serde::Serialize;
use serde::ser::SerializeMap;
use serde_json::Value;
use sessionlens_core::{ContentBlock, LogRecord, MsgType};
use std::collections::{BTreeMap, HashMap};

/// Tool that spawns a subagent.
pub const TASK_TOOL: &str = "Task";

/// Agent id -> that agent's records, in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SidechainMap {
    agents: Vec<(String, Vec<LogRecord>)>,
    index: HashMap<String, usize>,
}

impl SidechainMap {
    pub fn get(&self, agent_id: &str) -> Option<&[LogRecord]> {
        self.index
            .get(agent_id)
            .map(|&i| self.agents[i].1.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[LogRecord])> {
        self.agents
            .iter()
            .map(|(id, records)| (id.as_str(), records.as_slice()))
    }

    pub fn agent_ids(&self) -> impl Iterator<Item = &str> {
        self.agents.iter().map(|(id, _)| id.as_str())
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    fn push(&mut self, record: LogRecord) {
        match self.index.get(&record.agent_id) {
            Some(&i) => self.agents[i].1.push(record),
            None => {
                self.index
                    .insert(record.agent_id.clone(), self.agents.len());
                self.agents.push((record.agent_id.clone(), vec![record]));
            }
        }
    }
}

impl Serialize for SidechainMap {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.agents.len()))?;
        for (agent_id, records) in &self.agents {
            map.serialize_entry(agent_id, records)?;
        }
        map.end()
    }
}

/// Partition records into the main thread and per-agent sidechains.
///
/// Only records flagged as sidechain *and* carrying an agent id leave the
/// main thread.
pub fn split(records: &[LogRecord]) -> (Vec<LogRecord>, SidechainMap) {
    let mut main = Vec::new();
    let mut sidechains = SidechainMap::default();
    for record in records {
        if record.is_sidechain && !record.agent_id.is_empty() {
            sidechains.push(record.clone());
        } else {
            main.push(record.clone());
        }
    }
    (main, sidechains)
}

/// Prompt text of the first user record that has one.
///
/// Accepts `message.content` as a string, the first non-empty text block of
/// a content list, or a bare string `message`. Unparseable bodies are skipped.
pub fn first_user_prompt_text(records: &[LogRecord]) -> String {
    records
        .iter()
        .filter(|record| record.msg_type == MsgType::User)
        .find_map(|record| {
            let body: Value = serde_json::from_str(&record.raw).ok()?;
            prompt_text(body.get("message")?)
        })
        .unwrap_or_default()
}

fn prompt_text(message: &Value) -> Option<String> {
    if let Value::String(text) = message {
        return Some(text.clone()).filter(|t| !t.is_empty());
    }
    match message.get("content")? {
        Value::String(text) => Some(text.clone()),
        Value::Array(blocks) => blocks.iter().find_map(|block| {
            if block.get("type").and_then(Value::as_str) != Some("text") {
                return None;
            }
            block
                .get("text")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
        }),
        _ => None,
    }
}

/// `(tool_use_id, prompt)` for every Task call in the main thread.
fn task_prompts(main: &[LogRecord]) -> Vec<(String, String)> {
    main.iter()
        .filter(|record| record.msg_type == MsgType::Assistant)
        .flat_map(|record| classify(&record.raw).content)
        .filter_map(|block| match block {
            ContentBlock::ToolUse { id, name, input } if name == TASK_TOOL && !id.is_empty() => {
                let prompt = input.get("prompt").and_then(Value::as_str)?;
                (!prompt.is_empty()).then(|| (id, prompt.to_string()))
            }
            _ => None,
        })
        .collect()
}

/// Match each agent to the Task call that spawned it: tool_use id -> agent id.
///
/// Agents are visited in map order and take the first not-yet-matched Task
/// call whose prompt equals the agent's first user prompt exactly.
pub fn match_tasks_to_agents(
    main: &[LogRecord],
    sidechains: &SidechainMap,
) -> BTreeMap<String, String> {
    let tasks = task_prompts(main);
    let mut matched = BTreeMap::new();
    for (agent_id, records) in sidechains.iter() {
        let prompt = first_user_prompt_text(records);
        if prompt.is_empty() {
            continue;
        }
        let candidate = tasks
            .iter()
            .find(|(tool_use_id, task_prompt)| {
                !matched.contains_key(tool_use_id) && *task_prompt == prompt
            });
        match candidate {
            Some((tool_use_id, _)) => {
                matched.insert(tool_use_id.clone(), agent_id.to_string());
            }
            None => tracing::debug!("No Task call matches agent {}", agent_id),
        }
    }
    matched
}
