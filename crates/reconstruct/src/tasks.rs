//! Task Timeline Builder: point-in-time copies of the task board.
//!
//! The board is replayed forward over every task-management `tool_use`
//! block in assistant turns. After each call the whole board is cloned into
//! a snapshot keyed by that call's tool_use id, so later mutations cannot
//! leak into earlier snapshots.

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use sessionlens_core::{AssistantTurn, TaskStatus, TaskTimelineItem, Turn};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Tool names that read or mutate the task board.
pub const TASK_TOOLS: &[&str] = &[
    "TaskCreate",
    "TaskUpdate",
    "TaskList",
    "TaskGet",
    "TaskStop",
    "TodoWrite",
];

static CREATED_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Task #(\d+)").unwrap());

pub fn is_task_tool(name: &str) -> bool {
    TASK_TOOLS.contains(&name)
}

/// The board as it stood right after one task-tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSnapshot {
    pub tool_use_id: String,
    pub tool_name: String,
    pub items: Vec<TaskTimelineItem>,
}

/// Snapshots in call order, addressable by tool_use id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskTimeline {
    snapshots: Vec<TaskSnapshot>,
    index: HashMap<String, usize>,
}

impl Serialize for TaskTimeline {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.snapshots.serialize(serializer)
    }
}

impl TaskTimeline {
    /// Board right after the call with this tool_use id.
    pub fn get(&self, tool_use_id: &str) -> Option<&[TaskTimelineItem]> {
        self.index
            .get(tool_use_id)
            .map(|&i| self.snapshots[i].items.as_slice())
    }

    pub fn snapshots(&self) -> &[TaskSnapshot] {
        &self.snapshots
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    fn record(&mut self, tool_use_id: &str, tool_name: &str, board: &[TaskTimelineItem]) {
        let snapshot = TaskSnapshot {
            tool_use_id: tool_use_id.to_string(),
            tool_name: tool_name.to_string(),
            items: board.to_vec(),
        };
        match self.index.get(tool_use_id) {
            Some(&i) => self.snapshots[i] = snapshot,
            None => {
                self.index.insert(tool_use_id.to_string(), self.snapshots.len());
                self.snapshots.push(snapshot);
            }
        }
    }
}

/// Live board state while replaying calls.
#[derive(Debug, Default)]
struct Board {
    items: Vec<TaskTimelineItem>,
}

impl Board {
    fn find_mut(&mut self, task_id: &str) -> Option<&mut TaskTimelineItem> {
        self.items.iter_mut().find(|item| item.task_id == task_id)
    }

    fn next_id(&self) -> String {
        let max = self
            .items
            .iter()
            .filter_map(|item| item.task_id.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        (max + 1).to_string()
    }

    fn create(&mut self, input: &Map<String, Value>, result_text: Option<&str>) {
        let task_id = result_text
            .and_then(|text| CREATED_ID_RE.captures(text))
            .map(|caps| caps[1].to_string())
            .unwrap_or_else(|| self.next_id());
        let content = str_field(input, "subject").unwrap_or_default().to_string();
        match self.find_mut(&task_id) {
            Some(existing) => {
                existing.content = content;
                existing.status = TaskStatus::Pending;
            }
            None => self.items.push(TaskTimelineItem {
                task_id,
                content,
                status: TaskStatus::Pending,
            }),
        }
    }

    fn update(&mut self, input: &Map<String, Value>) {
        let Some(task_id) = input.get("taskId").and_then(id_string) else {
            return;
        };
        let Some(item) = self.find_mut(&task_id) else {
            tracing::debug!("TaskUpdate for unknown task {}", task_id);
            return;
        };
        if let Some(status) = str_field(input, "status") {
            item.status = TaskStatus::from(status);
        }
        if let Some(subject) = str_field(input, "subject") {
            item.content = subject.to_string();
        }
    }

    fn replace_with_todos(&mut self, input: &Map<String, Value>) {
        let todos = input
            .get("todos")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        self.items = todos
            .iter()
            .enumerate()
            .map(|(i, todo)| TaskTimelineItem {
                task_id: (i + 1).to_string(),
                content: todo
                    .get("content")
                    .or_else(|| todo.get("subject"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                status: TaskStatus::from(
                    todo.get("status")
                        .and_then(Value::as_str)
                        .unwrap_or("pending"),
                ),
            })
            .collect();
    }

    fn apply(
        &mut self,
        turn: &AssistantTurn,
        tool_use_id: &str,
        name: &str,
        input: &Map<String, Value>,
    ) {
        match name {
            "TaskCreate" => {
                let result = turn.tool_result(tool_use_id).map(|r| r.content.as_str());
                self.create(input, result);
            }
            "TaskUpdate" => self.update(input),
            "TodoWrite" => self.replace_with_todos(input),
            // TaskList / TaskGet / TaskStop only read the board.
            _ => {}
        }
    }
}

/// Replay every task-tool call in `turns` and snapshot the board after each.
pub fn build_task_timeline(turns: &[Turn]) -> TaskTimeline {
    let mut board = Board::default();
    let mut timeline = TaskTimeline::default();
    for turn in turns.iter().filter_map(Turn::as_assistant) {
        for (id, name, input) in turn.tool_uses() {
            if !is_task_tool(name) {
                continue;
            }
            board.apply(turn, id, name, input);
            timeline.record(id, name, &board.items);
        }
    }
    timeline
}

fn str_field<'a>(input: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    input.get(key).and_then(Value::as_str)
}

/// Task ids arrive as strings or bare numbers.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
