use std::path::{Path, PathBuf};

use anyhow::Context;

use super::types::AppConfig;

pub const ENV_LOG_LEVEL: &str = "LIFELINE_LOG_LEVEL";
pub const ENV_CLEANUP_TIMEOUT_MS: &str = "LIFELINE_CLEANUP_TIMEOUT_MS";

/// Get the default lifeline data directory: ~/.lifeline
pub fn get_lifeline_data_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".lifeline"))
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.lifeline/config.toml (highest)
    let data_dir = get_lifeline_data_dir()?;
    let user_config = data_dir.join("config.toml");

    // Priority 2: ./config.toml (current directory)
    let local_config = Path::new("config.toml");

    let mut cfg = if user_config.exists() {
        read_config(&user_config)?
    } else if local_config.exists() {
        read_config(local_config)?
    } else {
        AppConfig::default()
    };

    if cfg.logging.file && blank(cfg.logging.directory.as_deref()) {
        let logs_dir = data_dir.join("logs");
        std::fs::create_dir_all(&logs_dir)
            .with_context(|| format!("creating log directory {}", logs_dir.display()))?;
        cfg.logging.directory = Some(logs_dir.to_string_lossy().to_string());
    }

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    Ok(cfg)
}

/// Load an explicit file (`--config`); a missing file is an error here.
pub fn load_from_path(path: impl AsRef<Path>) -> anyhow::Result<AppConfig> {
    let mut cfg = read_config(path.as_ref())?;
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    Ok(cfg)
}

fn read_config(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let cfg = toml::from_str::<AppConfig>(&s)
        .with_context(|| format!("parsing config {}", path.display()))?;
    tracing::debug!(path = %path.display(), "config loaded");
    Ok(cfg)
}

/// Environment variables win over files. Blank values are ignored.
pub fn apply_env_overrides(
    cfg: &mut AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    if let Some(v) = lookup(ENV_LOG_LEVEL) {
        if !v.trim().is_empty() {
            cfg.logging.level = v.trim().to_string();
        }
    }

    if let Some(v) = lookup(ENV_CLEANUP_TIMEOUT_MS) {
        if !v.trim().is_empty() {
            cfg.tasks.cleanup_timeout_ms = v
                .trim()
                .parse()
                .with_context(|| format!("{ENV_CLEANUP_TIMEOUT_MS} must be milliseconds, got {v:?}"))?;
        }
    }

    Ok(())
}

fn blank(s: Option<&str>) -> bool {
    s.map(|s| s.trim().is_empty()).unwrap_or(true)
}
