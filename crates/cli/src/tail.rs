use anyhow::{Context, Result};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Tracks byte offsets per file so each poll only reads appended lines.
///
/// A trailing line without its newline is left unread until the writer
/// finishes it.
#[derive(Debug, Default)]
pub struct FileTailer {
    offsets: HashMap<PathBuf, u64>,
}

impl FileTailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read complete new lines from a file since the last read.
    pub fn read_new_lines(&mut self, path: &Path) -> Result<Vec<String>> {
        let file_size = std::fs::metadata(path)
            .with_context(|| format!("Cannot stat {}", path.display()))?
            .len();

        let current_offset = self.offset(path);

        // Detect file truncation (e.g., file was replaced)
        if file_size < current_offset {
            tracing::info!(
                "File truncated ({}B < {}B offset), resetting: {}",
                file_size,
                current_offset,
                path.display()
            );
            self.offsets.insert(path.to_path_buf(), 0);
            return self.read_new_lines(path);
        }

        if file_size == current_offset {
            return Ok(Vec::new());
        }

        let mut file =
            std::fs::File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
        file.seek(SeekFrom::Start(current_offset))
            .with_context(|| format!("Cannot seek in {}", path.display()))?;

        let mut reader = BufReader::new(file);
        let mut lines = Vec::new();
        let mut consumed = 0u64;
        let mut buf = String::new();
        loop {
            buf.clear();
            let n = match reader.read_line(&mut buf) {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!("Error reading line from {}: {}", path.display(), e);
                    break;
                }
            };
            if n == 0 || !buf.ends_with('\n') {
                break;
            }
            consumed += n as u64;
            let line = buf.trim_end_matches(['\n', '\r']);
            if !line.trim().is_empty() {
                lines.push(line.to_string());
            }
        }

        self.offsets
            .insert(path.to_path_buf(), current_offset + consumed);
        Ok(lines)
    }

    pub fn offset(&self, path: &Path) -> u64 {
        self.offsets.get(path).copied().unwrap_or(0)
    }
}
