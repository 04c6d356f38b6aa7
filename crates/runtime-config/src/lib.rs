//! Shared sessionlens configuration types.
//!
//! The CLI reads `sessionlens.toml` into [`SessionlensConfig`]; every section
//! and field has a serde default so a missing or partial file still loads.

use serde::{Deserialize, Serialize};

/// Canonical config file name.
pub const CONFIG_FILE_NAME: &str = "sessionlens.toml";

/// Top-level configuration (persisted as `sessionlens.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SessionlensConfig {
    #[serde(default)]
    pub reconstruct: ReconstructSettings,
    #[serde(default)]
    pub view: ViewSettings,
    #[serde(default)]
    pub live: LiveSettings,
    #[serde(default)]
    pub sources: SourceSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconstructSettings {
    /// Show progress / bookkeeping records as noise turns.
    #[serde(default = "default_false")]
    pub include_noise: bool,
    /// Max gap between injected user text and the tool result it preceded.
    #[serde(default = "default_reorder_window_ms")]
    pub reorder_window_ms: u64,
}

impl Default for ReconstructSettings {
    fn default() -> Self {
        Self {
            include_noise: false,
            reorder_window_ms: default_reorder_window_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ViewSettings {
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    #[serde(alias = "plain", alias = "txt")]
    Text,
    Json,
    /// Unknown/invalid values are normalized by compatibility fallbacks.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiveSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceSettings {
    /// Root holding `<project-slug>/<session-id>.jsonl` transcripts.
    #[serde(default = "default_projects_dir")]
    pub projects_dir: String,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            projects_dir: default_projects_dir(),
        }
    }
}

// ── Serde default functions ─────────────────────────────────────────────

fn default_false() -> bool {
    false
}
fn default_reorder_window_ms() -> u64 {
    100
}
fn default_poll_interval_ms() -> u64 {
    2_000
}

pub const DEFAULT_PROJECTS_DIR: &str = "~/.claude/projects";

pub fn default_projects_dir() -> String {
    DEFAULT_PROJECTS_DIR.to_string()
}

/// Apply compatibility fallbacks after loading raw TOML.
/// Returns true when any field was updated.
pub fn apply_compat_fallbacks(config: &mut SessionlensConfig, root: Option<&toml::Value>) -> bool {
    let mut changed = false;

    if config.view.format == OutputFormat::Unknown {
        config.view.format = OutputFormat::Text;
        changed = true;
    }

    // Older files spelled the poll interval in seconds.
    let live = root.and_then(|root| root.get("live"));
    let has_ms = live.and_then(|l| l.get("poll_interval_ms")).is_some();
    if !has_ms
        && let Some(secs) = live
            .and_then(|l| l.get("poll_interval_secs"))
            .and_then(toml::Value::as_integer)
            .filter(|secs| *secs > 0)
    {
        config.live.poll_interval_ms = secs as u64 * 1_000;
        changed = true;
    }

    if config.live.poll_interval_ms == 0 {
        config.live.poll_interval_ms = default_poll_interval_ms();
        changed = true;
    }

    if config.sources.projects_dir.trim().is_empty() {
        config.sources.projects_dir = default_projects_dir();
        changed = true;
    }

    changed
}
