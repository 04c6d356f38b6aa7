use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Record kind as stored in the log store's `type` column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MsgType {
    User,
    Assistant,
    System,
    Progress,
    QueueOperation,
    FileHistorySnapshot,
    /// Any other discriminator, preserved verbatim.
    Unknown(String),
}

impl MsgType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Progress => "progress",
            Self::QueueOperation => "queue-operation",
            Self::FileHistorySnapshot => "file-history-snapshot",
            Self::Unknown(other) => other,
        }
    }

    /// Bookkeeping records that never take part in turn grouping.
    pub fn is_noise(&self) -> bool {
        matches!(
            self,
            Self::Progress | Self::QueueOperation | Self::FileHistorySnapshot
        )
    }
}

impl From<&str> for MsgType {
    fn from(value: &str) -> Self {
        match value {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            "system" => Self::System,
            "progress" => Self::Progress,
            "queue-operation" => Self::QueueOperation,
            "file-history-snapshot" => Self::FileHistorySnapshot,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl From<String> for MsgType {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<MsgType> for String {
    fn from(value: MsgType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One raw log line for a session, as handed over by the log store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub session_id: String,
    pub msg_type: MsgType,
    /// ISO 8601 timestamp, e.g. "2026-02-06T04:46:17.839Z"
    pub timestamp: String,
    /// Original JSON body of the line
    pub raw: String,
    /// Source file the line was read from
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file: String,
    #[serde(default)]
    pub is_sidechain: bool,
    /// Subagent identifier; empty for main-thread records
    #[serde(default)]
    pub agent_id: String,
}

impl LogRecord {
    /// Epoch milliseconds of [`LogRecord::timestamp`], `None` when unparseable.
    pub fn timestamp_millis(&self) -> Option<i64> {
        parse_timestamp(&self.timestamp).map(|ts| ts.timestamp_millis())
    }
}

/// Parse a record timestamp. Accepts RFC 3339 and zone-less ISO 8601 (read as UTC).
pub fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(ts.trim(), "%Y-%m-%dT%H:%M:%S%.f")
                .map(|ndt| ndt.and_utc())
        })
        .or_else(|_| {
            NaiveDateTime::parse_from_str(ts.trim(), "%Y-%m-%d %H:%M:%S%.f")
                .map(|ndt| ndt.and_utc())
        })
        .ok()
}

/// Stable ascending sort by parsed timestamp.
///
/// Records with unparseable timestamps sort after every parseable one and
/// keep their relative order.
pub fn sort_by_timestamp(records: &mut [LogRecord]) {
    records.sort_by_key(|record| match record.timestamp_millis() {
        Some(ms) => (0u8, ms),
        None => (1u8, 0),
    });
}

/// Append-only record buffer for a live session.
///
/// New batches land on the tail; consumers re-run reconstruction over
/// [`RecordLog::records`] after each append. Callers sharing one log across
/// threads must synchronize `append` themselves.
#[derive(Debug, Clone, Default)]
pub struct RecordLog {
    records: Vec<LogRecord>,
}

impl RecordLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<LogRecord>) -> Self {
        Self { records }
    }

    /// Append a batch to the tail. Returns how many records were added.
    pub fn append(&mut self, batch: impl IntoIterator<Item = LogRecord>) -> usize {
        let before = self.records.len();
        self.records.extend(batch);
        self.records.len() - before
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Timestamp of the last record, the resume point for "records after T".
    pub fn cursor(&self) -> Option<&str> {
        self.records.last().map(|r| r.timestamp.as_str())
    }

    /// Records strictly after `cursor`. Unparseable cursors return everything.
    pub fn after(&self, cursor: &str) -> &[LogRecord] {
        let Some(cursor_ms) = parse_timestamp(cursor).map(|ts| ts.timestamp_millis()) else {
            return &self.records;
        };
        let start = self
            .records
            .iter()
            .position(|r| r.timestamp_millis().is_some_and(|ms| ms > cursor_ms))
            .unwrap_or(self.records.len());
        &self.records[start..]
    }
}
