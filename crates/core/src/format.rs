//! Display helpers shared by renderers.

use regex::Regex;
use std::sync::LazyLock;

static PROJECT_SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"projects/([^/]+)").unwrap());
static HOME_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-(?:Users|home)-[^-]+-?").unwrap());

/// Collapse a full model id to its family name (`opus`, `sonnet`, `haiku`).
pub fn shorten_model(model: &str) -> &str {
    let lower = model.to_ascii_lowercase();
    if lower.contains("opus") {
        "opus"
    } else if lower.contains("sonnet") {
        "sonnet"
    } else if lower.contains("haiku") {
        "haiku"
    } else {
        model
    }
}

/// Number of lines; an empty string counts as one.
pub fn count_lines(text: &str) -> usize {
    text.split('\n').count()
}

pub fn format_tokens(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}k", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

pub fn format_duration(ms: u64) -> String {
    if ms < 1_000 {
        return format!("{ms}ms");
    }
    let total_secs = (ms + 500) / 1_000;
    if total_secs < 60 {
        return format!("{total_secs}s");
    }
    let minutes = total_secs / 60;
    let secs = total_secs % 60;
    if minutes < 60 {
        return if secs > 0 {
            format!("{minutes}m {secs}s")
        } else {
            format!("{minutes}m")
        };
    }
    let hours = minutes / 60;
    let rem = minutes % 60;
    if rem > 0 {
        format!("{hours}h {rem}m")
    } else {
        format!("{hours}h")
    }
}

/// Project label from a transcript path (`.claude/projects/<slug>/<id>.jsonl`).
///
/// The home-directory prefix of the slug is dropped; `~` means the home dir itself.
pub fn extract_project(file_path: &str) -> String {
    let Some(caps) = PROJECT_SLUG_RE.captures(file_path) else {
        return file_path.to_string();
    };
    let slug = &caps[1];
    let cleaned = HOME_PREFIX_RE.replace(slug, "");
    let cleaned = cleaned.strip_prefix('-').unwrap_or(&cleaned);
    if cleaned.is_empty() {
        "~".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Strip `cwd` from `full_path` when the path lives under it.
pub fn to_relative_path(full_path: &str, cwd: &str) -> String {
    if cwd.is_empty() {
        return full_path.to_string();
    }
    match full_path.strip_prefix(cwd) {
        Some("") => String::new(),
        Some(rest) if rest.starts_with('/') => rest[1..].to_string(),
        _ => full_path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorten_model_recognises_families() {
        assert_eq!(shorten_model("claude-opus-4-20250514"), "opus");
        assert_eq!(shorten_model("claude-sonnet-4-20250514"), "sonnet");
        assert_eq!(shorten_model("claude-haiku-3-5-20241022"), "haiku");
        assert_eq!(shorten_model("gpt-4"), "gpt-4");
    }

    #[test]
    fn count_lines_treats_empty_as_one() {
        assert_eq!(count_lines(""), 1);
        assert_eq!(count_lines("hello"), 1);
        assert_eq!(count_lines("a\nb\nc"), 3);
    }

    #[test]
    fn format_tokens_scales() {
        assert_eq!(format_tokens(999), "999");
        assert_eq!(format_tokens(1_200), "1.2k");
        assert_eq!(format_tokens(3_400_000), "3.4M");
    }

    #[test]
    fn format_duration_buckets() {
        assert_eq!(format_duration(450), "450ms");
        assert_eq!(format_duration(12_000), "12s");
        assert_eq!(format_duration(185_000), "3m 5s");
        assert_eq!(format_duration(120_000), "2m");
        assert_eq!(format_duration(7_440_000), "2h 4m");
        assert_eq!(format_duration(3_600_000), "1h");
    }

    #[test]
    fn extract_project_strips_home_prefix() {
        assert_eq!(
            extract_project("/home/me/.claude/projects/-Users-alice-code-app/abc.jsonl"),
            "code-app"
        );
        assert_eq!(extract_project("/x/.claude/projects/-home-bob/abc.jsonl"), "~");
        assert_eq!(extract_project("/no/match.jsonl"), "/no/match.jsonl");
    }

    #[test]
    fn to_relative_path_requires_separator() {
        assert_eq!(
            to_relative_path("/home/user/project/src/foo.rs", "/home/user/project"),
            "src/foo.rs"
        );
        assert_eq!(to_relative_path("/other/file.rs", "/home/user"), "/other/file.rs");
        assert_eq!(to_relative_path("/some/file.rs", ""), "/some/file.rs");
        assert_eq!(to_relative_path("/home/user", "/home/user"), "");
        assert_eq!(
            to_relative_path("/home/username/x", "/home/user"),
            "/home/username/x"
        );
    }
}
