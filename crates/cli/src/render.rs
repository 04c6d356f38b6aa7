//! Text and JSON output for reconstructed sessions.

use crate::load::SessionFiles;
use crate::session_ref::session_id_of;
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use sessionlens_core::format::{
    count_lines, extract_project, format_duration, format_tokens, shorten_model, to_relative_path,
};
use sessionlens_core::jsonl::write_records;
use sessionlens_core::{
    AssistantTurn, ContentBlock, LogRecord, TaskStatus, TaskTimelineItem, Turn, parse_timestamp,
};
use sessionlens_reconstruct::sidechain::TASK_TOOL;
use sessionlens_reconstruct::{
    Conversation, ConversationStats, ReconstructOptions, TaskTimeline, is_task_tool, reconstruct,
};
use std::collections::BTreeMap;
use std::io::{self, Write};

const RESULT_PREVIEW_LINES: usize = 5;
const SUMMARY_WIDTH: usize = 100;

/// Input keys worth showing as a one-line tool call summary, in priority order.
const SUMMARY_KEYS: &[&str] = &[
    "command",
    "file_path",
    "path",
    "pattern",
    "url",
    "query",
    "skill",
    "description",
    "subject",
    "prompt",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

// ── Commands ────────────────────────────────────────────────────────────────

pub fn run_view(files: &SessionFiles, options: &ReconstructOptions, format: Format) -> Result<()> {
    let records = files.load_records()?;
    let conversation = reconstruct(&records, options);
    let mut out = io::stdout().lock();
    match format {
        Format::Json => write_json(&mut out, &ViewJson::new(files, &conversation, options))?,
        Format::Text => {
            write_header(&mut out, files, &records, &conversation.stats)?;
            TextRenderer::new(&conversation, options).write_turns(&mut out, &conversation.turns, 0)?;
        }
    }
    Ok(())
}

pub fn run_tasks(files: &SessionFiles, options: &ReconstructOptions, format: Format) -> Result<()> {
    let records = files.load_records()?;
    let conversation = reconstruct(&records, options);
    let mut out = io::stdout().lock();
    match format {
        Format::Json => write_json(&mut out, &conversation.task_timeline)?,
        Format::Text => write_task_timeline(&mut out, &conversation.task_timeline)?,
    }
    Ok(())
}

pub fn run_agents(files: &SessionFiles, options: &ReconstructOptions, format: Format) -> Result<()> {
    let records = files.load_records()?;
    let conversation = reconstruct(&records, options);
    let mut out = io::stdout().lock();
    match format {
        Format::Json => write_json(
            &mut out,
            &AgentsJson {
                task_agents: &conversation.task_agents,
                unmatched_agents: conversation.unmatched_agents(),
            },
        )?,
        Format::Text => write_agents(&mut out, &conversation)?,
    }
    Ok(())
}

pub fn run_export(files: &SessionFiles) -> Result<()> {
    let records = files.load_records()?;
    write_records(&records, io::stdout().lock()).context("Failed to write records")?;
    Ok(())
}

// ── JSON ────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ViewJson<'a> {
    session_file: String,
    project: String,
    #[serde(flatten)]
    conversation: &'a Conversation,
    /// Agent id -> that subagent's rebuilt turns
    subagent_turns: BTreeMap<&'a str, Vec<Turn>>,
}

impl<'a> ViewJson<'a> {
    fn new(files: &SessionFiles, conversation: &'a Conversation, options: &ReconstructOptions) -> Self {
        let path = files.main.to_string_lossy().to_string();
        Self {
            project: extract_project(&path),
            session_file: path,
            conversation,
            subagent_turns: conversation
                .sidechains
                .agent_ids()
                .map(|agent| (agent, conversation.sidechain_turns(agent, options)))
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct AgentsJson<'a> {
    task_agents: &'a BTreeMap<String, String>,
    unmatched_agents: Vec<&'a str>,
}

fn write_json<W: Write, T: Serialize>(out: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value).context("Failed to serialize output")?;
    writeln!(out)?;
    Ok(())
}

// ── Text ────────────────────────────────────────────────────────────────────

fn write_header<W: Write>(
    out: &mut W,
    files: &SessionFiles,
    records: &[LogRecord],
    stats: &ConversationStats,
) -> io::Result<()> {
    let path = files.main.to_string_lossy();
    writeln!(
        out,
        "session {} · {} · {} records{}",
        session_id_of(&files.main),
        extract_project(&path),
        records.len(),
        match files.subagents.len() {
            0 => String::new(),
            n => format!(" · {n} subagent transcripts"),
        }
    )?;
    writeln!(out, "{}", stats_line(stats))?;
    writeln!(out)
}

/// `sonnet · 3 prompts · 3 responses · 12 tool calls · 1 errors · 4m 2s`
fn stats_line(stats: &ConversationStats) -> String {
    let mut parts = Vec::new();
    if let Some(model) = &stats.model {
        parts.push(shorten_model(model).to_string());
    }
    parts.push(format!("{} prompts", stats.user_prompts));
    parts.push(format!("{} responses", stats.assistant_turns));
    if stats.tool_calls > 0 {
        parts.push(format!("{} tool calls", stats.tool_calls));
    }
    if stats.tool_errors > 0 {
        parts.push(format!("{} errors", stats.tool_errors));
    }
    if stats.duration_ms > 0 {
        parts.push(format_duration(stats.duration_ms));
    }
    parts.join(" · ")
}

fn write_task_timeline<W: Write>(out: &mut W, timeline: &TaskTimeline) -> io::Result<()> {
    if timeline.is_empty() {
        return writeln!(out, "No task-tool calls in this session.");
    }
    for snapshot in timeline.snapshots() {
        writeln!(out, "{} ({})", snapshot.tool_name, snapshot.tool_use_id)?;
        write_board(out, &snapshot.items, 1)?;
    }
    Ok(())
}

fn write_agents<W: Write>(out: &mut W, conversation: &Conversation) -> io::Result<()> {
    if conversation.sidechains.is_empty() {
        return writeln!(out, "No subagents in this session.");
    }
    for (tool_use_id, agent) in &conversation.task_agents {
        let count = conversation.sidechains.get(agent).map_or(0, <[LogRecord]>::len);
        writeln!(out, "{tool_use_id} -> {agent} ({count} records)")?;
    }
    for agent in conversation.unmatched_agents() {
        writeln!(out, "unmatched: {agent}")?;
    }
    Ok(())
}

fn write_board<W: Write>(out: &mut W, items: &[TaskTimelineItem], depth: usize) -> io::Result<()> {
    if items.is_empty() {
        return write_indented(out, depth, "(empty board)");
    }
    for item in items {
        let line = format!("{} #{} {}", status_glyph(&item.status), item.task_id, item.content);
        write_indented(out, depth, &line)?;
    }
    Ok(())
}

fn status_glyph(status: &TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "[ ]",
        TaskStatus::InProgress => "[~]",
        TaskStatus::Completed => "[x]",
        TaskStatus::Deleted => "[-]",
        TaskStatus::Unrecognized(_) => "[?]",
    }
}

fn write_indented<W: Write>(out: &mut W, depth: usize, text: &str) -> io::Result<()> {
    let pad = "  ".repeat(depth);
    for line in text.split('\n') {
        writeln!(out, "{pad}{line}")?;
    }
    Ok(())
}

fn clock(timestamp: &str) -> String {
    parse_timestamp(timestamp)
        .map(|ts| ts.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn truncate(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("");
    if first_line.chars().count() <= max_chars && !text.contains('\n') {
        return first_line.to_string();
    }
    let cut: String = first_line.chars().take(max_chars).collect();
    format!("{cut}…")
}

/// One-line summary of a tool call's input.
fn tool_summary(name: &str, input: &Map<String, Value>, cwd: &str) -> String {
    for key in SUMMARY_KEYS {
        if let Some(value) = input.get(*key).and_then(Value::as_str) {
            let value = if key.ends_with("path") {
                to_relative_path(value, cwd)
            } else {
                value.to_string()
            };
            return truncate(&value, SUMMARY_WIDTH);
        }
    }
    if name == "TodoWrite" {
        let n = input.get("todos").and_then(Value::as_array).map_or(0, Vec::len);
        return format!("{n} todos");
    }
    if input.is_empty() {
        return String::new();
    }
    truncate(&Value::Object(input.clone()).to_string(), SUMMARY_WIDTH)
}

fn block_type(raw: &Value) -> &str {
    raw.get("type").and_then(Value::as_str).unwrap_or("block")
}

/// Walks turns and writes them as indented text; subagents nest under their Task call.
pub struct TextRenderer<'a> {
    conversation: &'a Conversation,
    options: ReconstructOptions,
}

impl<'a> TextRenderer<'a> {
    pub fn new(conversation: &'a Conversation, options: &ReconstructOptions) -> Self {
        Self {
            conversation,
            options: *options,
        }
    }

    pub fn write_turns<W: Write>(&self, out: &mut W, turns: &[Turn], depth: usize) -> io::Result<()> {
        for turn in turns {
            self.write_turn(out, turn, depth)?;
        }
        Ok(())
    }

    pub fn write_turn<W: Write>(&self, out: &mut W, turn: &Turn, depth: usize) -> io::Result<()> {
        match turn {
            Turn::UserPrompt { record, content } => {
                write_indented(out, depth, &format!("» user  {}", clock(&record.timestamp)))?;
                for block in content {
                    match block {
                        ContentBlock::Text { text } => write_indented(out, depth + 1, text)?,
                        ContentBlock::Other { raw } => {
                            write_indented(out, depth + 1, &format!("[{}]", block_type(raw)))?
                        }
                        _ => {}
                    }
                }
                writeln!(out)
            }
            Turn::AssistantTurn(turn) => self.write_assistant(out, turn, depth),
            Turn::CompactSummary { text, .. } => {
                write_indented(out, depth, "═ context compacted ═")?;
                let preview: Vec<&str> = text.lines().take(3).collect();
                write_indented(out, depth + 1, &preview.join("\n"))?;
                writeln!(out)
            }
            Turn::SkillLoaded { skill_name, .. } => {
                write_indented(out, depth, &format!("✦ skill loaded: {skill_name}"))?;
                writeln!(out)
            }
            Turn::TurnSeparator { duration_ms, .. } => {
                write_indented(out, depth, &format!("─── {} ───", format_duration(*duration_ms)))?;
                writeln!(out)
            }
            Turn::Noise { record } => write_indented(
                out,
                depth,
                &format!("· {} {}", record.msg_type, clock(&record.timestamp)),
            ),
        }
    }

    fn write_assistant<W: Write>(&self, out: &mut W, turn: &AssistantTurn, depth: usize) -> io::Result<()> {
        let mut header = format!("« assistant  {}", clock(&turn.timestamp));
        if let Some(model) = &turn.model {
            header.push_str(&format!("  {}", shorten_model(model)));
        }
        if let Some(usage) = &turn.usage {
            header.push_str(&format!(
                "  in {} / out {}",
                format_tokens(usage.input_tokens + usage.cache_read_input_tokens),
                format_tokens(usage.output_tokens)
            ));
        }
        write_indented(out, depth, &header)?;

        for block in &turn.content {
            match block {
                ContentBlock::Text { text } => write_indented(out, depth + 1, text)?,
                ContentBlock::Thinking { thinking } => write_indented(
                    out,
                    depth + 1,
                    &format!("(thinking) {}", truncate(thinking, SUMMARY_WIDTH)),
                )?,
                ContentBlock::ToolUse { id, name, input } => {
                    self.write_tool_call(out, turn, id, name, input, depth + 1)?
                }
                ContentBlock::ToolResult { .. } => {}
                ContentBlock::Other { raw } => {
                    write_indented(out, depth + 1, &format!("[{}]", block_type(raw)))?
                }
            }
        }
        writeln!(out)
    }

    fn write_tool_call<W: Write>(
        &self,
        out: &mut W,
        turn: &AssistantTurn,
        id: &str,
        name: &str,
        input: &Map<String, Value>,
        depth: usize,
    ) -> io::Result<()> {
        let summary = tool_summary(name, input, &self.conversation.cwd);
        write_indented(out, depth, format!("→ {name} {summary}").trim_end())?;

        if is_task_tool(name)
            && let Some(board) = self.conversation.task_timeline.get(id)
        {
            write_board(out, board, depth + 1)?;
        }

        if name == TASK_TOOL
            && let Some(agent) = self.conversation.agent_for_task(id)
        {
            write_indented(out, depth + 1, &format!("↳ subagent {agent}"))?;
            let sub_turns = self.conversation.sidechain_turns(agent, &self.options);
            self.write_turns(out, &sub_turns, depth + 2)?;
        }

        match turn.tool_result(id) {
            Some(result) => {
                let marker = if result.is_error { "✗" } else { "←" };
                let preview: Vec<&str> = result.content.lines().take(RESULT_PREVIEW_LINES).collect();
                let mut text = format!("{marker} {}", preview.join("\n  "));
                let total = count_lines(&result.content);
                if total > RESULT_PREVIEW_LINES {
                    text.push_str(&format!("\n  … +{} more lines", total - RESULT_PREVIEW_LINES));
                }
                write_indented(out, depth + 1, text.trim_end())
            }
            None => write_indented(out, depth + 1, "… (no result)"),
        }
    }
}
