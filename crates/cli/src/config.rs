use anyhow::{Context, Result};
use sessionlens_reconstruct::ReconstructOptions;
use sessionlens_runtime_config::{CONFIG_FILE_NAME, SessionlensConfig, apply_compat_fallbacks};
use std::path::{Path, PathBuf};

/// Get the config directory path (~/.config/sessionlens/)
pub fn config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .context("Could not determine home directory")?;
    Ok(PathBuf::from(home).join(".config").join("sessionlens"))
}

/// Canonical config file path.
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

fn read_config_doc(path: &Path) -> Result<toml::Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config at {}", path.display()))?;
    let doc = toml::from_str::<toml::Value>(&content)
        .with_context(|| format!("Failed to parse config at {}", path.display()))?;
    Ok(doc)
}

fn config_from_doc(doc: &toml::Value) -> Result<SessionlensConfig> {
    let mut config = doc
        .clone()
        .try_into::<SessionlensConfig>()
        .context("Invalid sessionlens configuration")?;
    if apply_compat_fallbacks(&mut config, Some(doc)) {
        tracing::debug!("Applied config compatibility fallbacks");
    }
    Ok(config)
}

/// Load the config at `path`; a missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<SessionlensConfig> {
    if !path.exists() {
        return Ok(SessionlensConfig::default());
    }
    let doc = read_config_doc(path)?;
    config_from_doc(&doc).with_context(|| format!("In {}", path.display()))
}

pub fn load_config() -> Result<SessionlensConfig> {
    load_config_from(&config_path()?)
}

/// Engine options from the config, with `--include-noise` forcing noise on.
pub fn reconstruct_options(config: &SessionlensConfig, include_noise: bool) -> ReconstructOptions {
    ReconstructOptions {
        include_noise: include_noise || config.reconstruct.include_noise,
        reorder_window_ms: config.reconstruct.reorder_window_ms,
    }
}

pub fn show_config() -> Result<()> {
    let path = config_path()?;
    let config = load_config_from(&path)?;
    let state = if path.exists() { "" } else { " (not found, using defaults)" };
    println!("# {}{}", path.display(), state);
    print!(
        "{}",
        toml::to_string_pretty(&config).context("Failed to serialize config")?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(cfg, SessionlensConfig::default());
    }

    #[test]
    fn file_values_and_fallbacks_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            r#"
[reconstruct]
reorder_window_ms = 250

[live]
poll_interval_secs = 3

[sources]
projects_dir = ""
"#,
        )
        .unwrap();
        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg.reconstruct.reorder_window_ms, 250);
        assert_eq!(cfg.live.poll_interval_ms, 3_000);
        assert_eq!(cfg.sources.projects_dir, "~/.claude/projects");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[reconstruct\n").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config"));
    }

    #[test]
    fn include_noise_flag_overrides_config() {
        let cfg = SessionlensConfig::default();
        assert!(!reconstruct_options(&cfg, false).include_noise);
        assert!(reconstruct_options(&cfg, true).include_noise);
        assert_eq!(reconstruct_options(&cfg, false).reorder_window_ms, 100);
    }
}
