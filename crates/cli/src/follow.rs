//! `view --follow`: poll a live session and print turns once they are complete.
//!
//! Each poll tails every transcript for newly completed lines, appends them
//! to a [`RecordLog`], and reruns reconstruction over the whole log. A turn
//! is printed once nothing later in the session can still change it.

use crate::load::{SessionFiles, adopt_subagent_records};
use crate::render::TextRenderer;
use crate::tail::FileTailer;
use anyhow::Result;
use sessionlens_core::jsonl::record_from_line;
use sessionlens_core::{LogRecord, RecordLog, Turn, sort_by_timestamp};
use sessionlens_reconstruct::{Conversation, ReconstructOptions, reconstruct};
use sessionlens_runtime_config::LiveSettings;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub async fn run_follow(
    files: &SessionFiles,
    options: &ReconstructOptions,
    live: &LiveSettings,
) -> Result<()> {
    let mut follower = Follower::new(files.clone());
    let interval = Duration::from_millis(live.poll_interval_ms.max(1));

    follower.poll();
    follower.emit(&mut io::stdout().lock(), options, false)?;
    tracing::info!(
        "Following {} ({} records), Ctrl-C to stop",
        files.main.display(),
        follower.log.len()
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        if follower.poll() > 0 {
            follower.emit(&mut io::stdout().lock(), options, false)?;
        }
    }

    follower.emit(&mut io::stdout().lock(), options, true)?;
    Ok(())
}

/// Incremental reader for one session and its subagents.
struct Follower {
    files: SessionFiles,
    tailer: FileTailer,
    log: RecordLog,
    /// Last timestamp seen per file, inherited by lines that lack one
    last_ts: HashMap<PathBuf, String>,
    /// Main-thread turns already written
    printed: usize,
}

impl Follower {
    fn new(files: SessionFiles) -> Self {
        Self {
            files,
            tailer: FileTailer::new(),
            log: RecordLog::new(),
            last_ts: HashMap::new(),
            printed: 0,
        }
    }

    /// Read whatever was appended since the last poll. Returns the number of new records.
    fn poll(&mut self) -> usize {
        for path in self.files.refresh() {
            tracing::debug!("New subagent transcript: {}", path.display());
        }
        let paths: Vec<PathBuf> = self.files.all().map(Path::to_path_buf).collect();
        let mut batch = Vec::new();
        for path in paths {
            match self.ingest(&path) {
                Ok(records) => batch.extend(records),
                Err(e) => tracing::warn!("Skipping {}: {:#}", path.display(), e),
            }
        }
        self.log.append(batch)
    }

    fn ingest(&mut self, path: &Path) -> Result<Vec<LogRecord>> {
        let lines = self.tailer.read_new_lines(path)?;
        let file = path.to_string_lossy();
        let last_ts = self.last_ts.entry(path.to_path_buf()).or_default();
        let records: Vec<LogRecord> = lines
            .iter()
            .map(|line| {
                let record = record_from_line(line, &file, last_ts.as_str());
                last_ts.clone_from(&record.timestamp);
                record
            })
            .collect();
        if path == self.files.main {
            Ok(records)
        } else {
            Ok(adopt_subagent_records(path, records))
        }
    }

    fn conversation(&self, options: &ReconstructOptions) -> Conversation {
        let mut records = self.log.records().to_vec();
        sort_by_timestamp(&mut records);
        reconstruct(&records, options)
    }

    /// Write turns that became final since the last call. With `flush_all`
    /// the still-open trailing turn is written too.
    fn emit<W: Write>(
        &mut self,
        out: &mut W,
        options: &ReconstructOptions,
        flush_all: bool,
    ) -> io::Result<usize> {
        let conversation = self.conversation(options);
        let ready = if flush_all {
            conversation.turns.len()
        } else {
            settled_len(&conversation.turns)
        };
        if ready <= self.printed {
            return Ok(0);
        }
        let renderer = TextRenderer::new(&conversation, options);
        renderer.write_turns(out, &conversation.turns[self.printed..ready], 0)?;
        out.flush()?;
        let written = ready - self.printed;
        self.printed = ready;
        Ok(written)
    }
}

/// Number of leading turns that later records can no longer change.
///
/// A trailing assistant turn is still open: more fragments or tool results
/// may attach to it. Injected skill text is logged just before the tool
/// result it belongs after, so a trailing skill banner also holds back the
/// assistant turn in front of it until that result can be reordered in.
fn settled_len(turns: &[Turn]) -> usize {
    let mut end = turns.len();
    while end > 0 && matches!(turns[end - 1], Turn::SkillLoaded { .. }) {
        end -= 1;
    }
    if end > 0 && matches!(turns[end - 1], Turn::AssistantTurn(_)) {
        end -= 1;
    }
    end
}
