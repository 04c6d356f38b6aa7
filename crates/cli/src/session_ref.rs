use anyhow::{Result, bail};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// A parsed session reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRef {
    /// HEAD^N: the Nth most recently modified session (HEAD = HEAD^0)
    Latest { offset: usize },
    /// A session id (file stem of `<projects>/<slug>/<id>.jsonl`), or a prefix of one
    Id(String),
    /// A file path
    File(PathBuf),
}

impl SessionRef {
    /// Parse a session reference string.
    ///
    /// Formats:
    ///   - "HEAD" → Latest { offset: 0 }
    ///   - "HEAD^3" → Latest { offset: 3 }
    ///   - A path to an existing file → File(path)
    ///   - Anything else → Id(string)
    pub fn parse(s: &str) -> Self {
        let s = s.trim();

        if s.eq_ignore_ascii_case("HEAD") {
            return SessionRef::Latest { offset: 0 };
        }

        if let Some(rest) = s.strip_prefix("HEAD^").or_else(|| s.strip_prefix("head^"))
            && let Ok(n) = rest.parse::<usize>()
        {
            return SessionRef::Latest { offset: n };
        }

        let path = PathBuf::from(shellexpand::tilde(s).as_ref());
        if path.is_file() {
            return SessionRef::File(path);
        }

        SessionRef::Id(s.to_string())
    }

    /// Resolve to one main transcript under `projects_dir` (tilde-expanded).
    pub fn resolve(&self, projects_dir: &str) -> Result<PathBuf> {
        match self {
            SessionRef::File(path) => Ok(path.clone()),
            SessionRef::Latest { offset } => {
                let sessions = sorted_sessions(projects_dir, "*")?;
                match sessions.into_iter().nth(*offset) {
                    Some(path) => Ok(path),
                    None if *offset == 0 => bail!("No sessions found under {projects_dir}"),
                    None => bail!("No session found at HEAD^{offset} under {projects_dir}"),
                }
            }
            SessionRef::Id(id) => {
                let escaped = glob::Pattern::escape(id);
                let exact = sorted_sessions(projects_dir, &escaped)?;
                if let Some(path) = exact.into_iter().next() {
                    return Ok(path);
                }
                let prefixed = sorted_sessions(projects_dir, &format!("{escaped}*"))?;
                match prefixed.as_slice() {
                    [] => bail!("No session found with ID matching '{id}'"),
                    [only] => Ok(only.clone()),
                    [first, ..] => {
                        tracing::warn!(
                            "{} sessions match '{}', using the most recent",
                            prefixed.len(),
                            id
                        );
                        Ok(first.clone())
                    }
                }
            }
        }
    }
}

/// Main transcripts `<projects_dir>/*/<stem>.jsonl`, newest first.
fn sorted_sessions(projects_dir: &str, stem_pattern: &str) -> Result<Vec<PathBuf>> {
    let root = shellexpand::tilde(projects_dir).to_string();
    let pattern = format!(
        "{}/*/{}.jsonl",
        glob::Pattern::escape(root.trim_end_matches('/')),
        stem_pattern
    );
    let mut candidates: Vec<(PathBuf, SystemTime)> = glob::glob(&pattern)?
        .filter_map(Result::ok)
        .filter_map(|path| {
            let modified = std::fs::metadata(&path).ok()?.modified().ok()?;
            Some((path, modified))
        })
        .collect();
    candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Ok(candidates.into_iter().map(|(path, _)| path).collect())
}

/// Session id of a transcript path (its file stem).
pub fn session_id_of(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}
