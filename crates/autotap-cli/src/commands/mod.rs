mod find;
mod run;

pub use find::FindCommand;
pub use run::RunCommand;

use anyhow::{Context, Result};
use autotap::{AutoTapConfig, SnapshotEngine};
use std::fs;
use std::path::Path;

/// Load a JSON UI tree into a snapshot engine.
pub(crate) fn load_tree(path: &Path) -> Result<SnapshotEngine> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read tree file {}", path.display()))?;
    SnapshotEngine::from_json(&json)
        .with_context(|| format!("Failed to parse tree file {}", path.display()))
}

/// Defaults, then the optional JSON file, then `AUTOTAP_*` environment variables.
pub(crate) fn load_config(path: Option<&Path>) -> Result<AutoTapConfig> {
    let mut config = match path {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            AutoTapConfig::from_json(&json)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        }
        None => AutoTapConfig::default(),
    };
    config
        .apply_env()
        .context("Invalid AUTOTAP_* environment variable")?;
    Ok(config)
}
