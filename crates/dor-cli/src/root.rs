use anyhow::Context;
use dor_core::config::Config;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = ".dor.yaml";

/// Resolve the configuration file.
///
/// Priority:
/// 1. `--config` flag / `DOR_CONFIG` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.dor.yaml`
/// 3. None: built-in defaults
pub fn resolve_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_config_from(&cwd)
}

pub fn find_config_from(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        match dir.parent() {
            Some(p) => dir = p.to_path_buf(),
            None => return None,
        }
    }
}

/// The effective configuration and the file it came from, if any.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<(Config, Option<PathBuf>)> {
    match resolve_config(explicit) {
        Some(path) => {
            let config = Config::load(&path)
                .with_context(|| format!("failed to load config from {}", path.display()))?;
            tracing::debug!(path = %path.display(), "config loaded");
            Ok((config, Some(path)))
        }
        None => Ok((Config::default(), None)),
    }
}
