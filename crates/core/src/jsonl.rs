//! Session transcript JSONL <-> [`LogRecord`] conversion.
//!
//! A Claude Code transcript is one JSON object per line:
//! ```jsonl
//! {"type":"user","sessionId":"...","timestamp":"...","message":{...}}
//! {"type":"assistant","sessionId":"...","timestamp":"...","message":{...}}
//! {"type":"progress","sessionId":"...","timestamp":"...","data":{...}}
//! ```
//!
//! Reading lifts the store-level columns (`sessionId`, `type`, `timestamp`,
//! `isSidechain`, `agentId`) out of each body and keeps the body verbatim in
//! [`LogRecord::raw`]. Lines that are not JSON are kept too; classifying
//! them is the reconstruction engine's job.

use crate::record::{LogRecord, MsgType};
use serde::Deserialize;
use serde_json::Value;
use std::io::{self, BufRead, Write};

/// Error types for JSONL operations
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum JsonlError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("IO error at line {line}: {source}")]
    Line { line: usize, source: io::Error },
}

/// Store-level columns carried by every transcript line.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LineColumns {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    is_sidechain: Option<bool>,
    #[serde(default)]
    agent_id: Option<String>,
}

/// Project one transcript line into a [`LogRecord`].
///
/// Lines without their own timestamp inherit `fallback_ts` so they stay
/// next to their neighbours when records are later sorted.
pub fn record_from_line(line: &str, file: &str, fallback_ts: &str) -> LogRecord {
    let columns = match serde_json::from_str::<Value>(line) {
        Ok(value @ Value::Object(_)) => LineColumns::deserialize(&value).unwrap_or_default(),
        _ => LineColumns::default(),
    };
    LogRecord {
        session_id: columns.session_id.unwrap_or_default(),
        msg_type: MsgType::from(columns.kind.unwrap_or_default()),
        timestamp: columns
            .timestamp
            .unwrap_or_else(|| fallback_ts.to_string()),
        raw: line.to_string(),
        file: file.to_string(),
        is_sidechain: columns.is_sidechain.unwrap_or(false),
        agent_id: columns.agent_id.unwrap_or_default(),
    }
}

/// Read every non-empty line of a transcript into records.
pub fn read_records<R: BufRead>(reader: R, file: &str) -> Result<Vec<LogRecord>, JsonlError> {
    let mut records: Vec<LogRecord> = Vec::new();
    for (idx, line_result) in reader.lines().enumerate() {
        let line = line_result.map_err(|source| JsonlError::Line {
            line: idx + 1,
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let fallback = records
            .last()
            .map(|r| r.timestamp.clone())
            .unwrap_or_default();
        records.push(record_from_line(&line, file, &fallback));
    }
    Ok(records)
}

/// Read records from an in-memory transcript.
pub fn records_from_str(s: &str, file: &str) -> Vec<LogRecord> {
    // Reading from a byte slice cannot fail with an IO error.
    read_records(io::BufReader::new(s.as_bytes()), file).unwrap_or_default()
}

/// Write the raw bodies back out as JSONL, one record per line.
pub fn write_records<W: Write>(records: &[LogRecord], mut writer: W) -> Result<(), JsonlError> {
    for record in records {
        writer.write_all(record.raw.trim_end_matches('\n').as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}
