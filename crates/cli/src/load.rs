//! Session transcript discovery and loading.
//!
//! Claude Code writes the main thread to `<slug>/<session-id>.jsonl` and each
//! subagent to `<slug>/<session-id>/subagents/agent-<id>.jsonl` (older builds
//! used a shared `<slug>/subagents/` folder). Both are merged into one record
//! list sorted by timestamp.

use crate::session_ref::{SessionRef, session_id_of};
use anyhow::{Context, Result};
use sessionlens_core::LogRecord;
use sessionlens_core::jsonl::read_records;
use sessionlens_core::sort_by_timestamp;
use std::io::BufReader;
use std::path::{Path, PathBuf};

const SUBAGENT_PREFIXES: &[&str] = &["agent-", "agent_", "subagent-", "subagent_"];

/// The files that make up one session.
#[derive(Debug, Clone)]
pub struct SessionFiles {
    pub main: PathBuf,
    pub subagents: Vec<PathBuf>,
}

impl SessionFiles {
    /// Resolve a session reference and collect its subagent transcripts.
    pub fn resolve(reference: &str, projects_dir: &str) -> Result<Self> {
        let main = SessionRef::parse(reference).resolve(projects_dir)?;
        Ok(Self::for_main(main))
    }

    pub fn for_main(main: PathBuf) -> Self {
        let subagents = discover_subagents(&main);
        Self { main, subagents }
    }

    /// Main transcript first, then subagents.
    pub fn all(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.main.as_path()).chain(self.subagents.iter().map(PathBuf::as_path))
    }

    /// Pick up subagent transcripts created since the last scan.
    pub fn refresh(&mut self) -> Vec<PathBuf> {
        let fresh: Vec<PathBuf> = discover_subagents(&self.main)
            .into_iter()
            .filter(|path| !self.subagents.contains(path))
            .collect();
        self.subagents.extend(fresh.iter().cloned());
        fresh
    }

    /// Read and merge every file, sorted by timestamp.
    pub fn load_records(&self) -> Result<Vec<LogRecord>> {
        let mut records = read_file(&self.main)?;
        for path in &self.subagents {
            match read_file(path) {
                Ok(sub) => records.extend(adopt_subagent_records(path, sub)),
                Err(e) => tracing::warn!("Skipping subagent transcript: {:#}", e),
            }
        }
        sort_by_timestamp(&mut records);
        Ok(records)
    }
}

fn read_file(path: &Path) -> Result<Vec<LogRecord>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Cannot open {}", path.display()))?;
    read_records(BufReader::new(file), &path.to_string_lossy())
        .with_context(|| format!("Cannot read {}", path.display()))
}

fn is_subagent_file_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SUBAGENT_PREFIXES.iter().any(|prefix| lower.starts_with(prefix))
}

/// Agent id implied by a subagent file name (`agent-abc.jsonl` -> `abc`).
pub fn agent_id_from_path(path: &Path) -> String {
    let stem = session_id_of(path);
    SUBAGENT_PREFIXES
        .iter()
        .find_map(|prefix| {
            stem.get(..prefix.len())
                .filter(|head| head.eq_ignore_ascii_case(prefix))
                .map(|_| stem[prefix.len()..].to_string())
        })
        .unwrap_or(stem)
}

/// Records from a subagent file always belong to a sidechain, even when the
/// writer omitted `isSidechain` / `agentId`.
pub fn adopt_subagent_records(path: &Path, records: Vec<LogRecord>) -> Vec<LogRecord> {
    let fallback_agent = agent_id_from_path(path);
    records
        .into_iter()
        .map(|mut record| {
            record.is_sidechain = true;
            if record.agent_id.is_empty() {
                record.agent_id = fallback_agent.clone();
            }
            record
        })
        .collect()
}

fn subagent_dirs(main: &Path) -> Vec<PathBuf> {
    let mut dirs = vec![main.with_extension("").join("subagents")];
    if let Some(parent) = main.parent() {
        dirs.push(parent.join("subagents"));
    }
    dirs
}

fn discover_subagents(main: &Path) -> Vec<PathBuf> {
    let parent_session = session_id_of(main);
    let mut files: Vec<PathBuf> = Vec::new();
    for (i, dir) in subagent_dirs(main).into_iter().enumerate() {
        if !dir.is_dir() {
            continue;
        }
        let pattern = format!("{}/*.jsonl", glob::Pattern::escape(&dir.to_string_lossy()));
        let Ok(paths) = glob::glob(&pattern) else {
            continue;
        };
        for path in paths.filter_map(Result::ok) {
            let name = session_id_of(&path);
            // The shared legacy folder also holds other sessions' agents.
            let belongs = i == 0
                || (is_subagent_file_name(&name) && first_session_id(&path) == parent_session);
            if belongs && !files.contains(&path) {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}

fn first_session_id(path: &Path) -> String {
    read_file(path)
        .ok()
        .and_then(|records| {
            records
                .into_iter()
                .map(|r| r.session_id)
                .find(|id| !id.is_empty())
        })
        .unwrap_or_default()
}
