use super::{load_config, load_tree};
use anyhow::{Context, Result};
use autotap::{SearchTarget, TreeWalker};
use clap::Args;
use colored::*;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct FindCommand {
    /// JSON snapshot of the UI tree
    #[arg(long)]
    tree: PathBuf,

    /// Text to look for in node text, description or element id
    #[arg(long)]
    target: String,

    /// Optional JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum tree depth to search
    #[arg(long)]
    max_depth: Option<usize>,
}

impl FindCommand {
    pub async fn execute(&self) -> Result<()> {
        let engine = load_tree(&self.tree)?;
        let mut config = load_config(self.config.as_deref())?;
        if let Some(max_depth) = self.max_depth {
            config.max_depth = max_depth;
        }
        config.validate()?;

        let target = SearchTarget::new(self.target.as_str());
        if target.is_empty() {
            anyhow::bail!("Target text must not be empty");
        }

        let walker = TreeWalker::new(config.max_depth);
        let hit = tokio::task::spawn_blocking(move || walker.scan(&engine, &target))
            .await
            .context("Tree walk task failed")??;

        match hit {
            Some(hit) => {
                eprintln!(
                    "  {} '{}' -> {} at ({}, {})",
                    "✓".green(),
                    self.target,
                    hit.label.bold(),
                    hit.point.x,
                    hit.point.y
                );
                println!("{}", serde_json::to_string_pretty(&hit)?);
                Ok(())
            }
            None => {
                eprintln!("  {} '{}' not found", "✗".red(), self.target);
                std::process::exit(1);
            }
        }
    }
}
