use crate::commands::{FindCommand, RunCommand};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "autotap")]
#[command(about = "Find a piece of text in an accessibility tree and tap it")]
#[command(
    long_about = "autotap scans a UI tree for a node whose text, description or identifier contains the target, then taps the node or its nearest interactable ancestor. Trees are loaded from JSON snapshots."
)]
pub struct Cli {
    /// Log filter (e.g. info, debug, autotap=trace). Falls back to RUST_LOG, then AUTOTAP_LOG_LEVEL.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Walk a tree once and print the node that would be tapped
    Find(FindCommand),
    /// Run a search session against a tree until the duration elapses or Ctrl-C
    Run(RunCommand),
}
