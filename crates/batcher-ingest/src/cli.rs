//! CLI argument parsing for the ingest tool.
//!
//! CLI flags override every other configuration source.

use std::path::PathBuf;

use batcher_types::ActionKind;
use clap::{Parser, ValueEnum};

/// Index Batcher Ingest
///
/// Reads one JSON document per line and submits them to a search index in
/// batches, retrying and splitting as needed.
#[derive(Parser, Debug)]
#[command(name = "batcher-ingest")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/index-batcher/config.toml)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// JSON-lines input file (default: stdin)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Document field holding the document key
    #[arg(short, long, default_value = "id")]
    pub key_field: String,

    /// Index action applied to every document
    #[arg(short, long, value_enum, default_value_t = ActionArg::Upload)]
    pub action: ActionArg,

    /// Override the configured batch size
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Accept every action locally instead of calling the service
    #[arg(long)]
    pub dry_run: bool,
}

/// Action kinds accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ActionArg {
    Upload,
    Merge,
    MergeOrUpload,
    Delete,
}

impl From<ActionArg> for ActionKind {
    fn from(arg: ActionArg) -> Self {
        match arg {
            ActionArg::Upload => ActionKind::Upload,
            ActionArg::Merge => ActionKind::Merge,
            ActionArg::MergeOrUpload => ActionKind::MergeOrUpload,
            ActionArg::Delete => ActionKind::Delete,
        }
    }
}
