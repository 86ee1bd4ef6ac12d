//! Index Batcher Ingest
//!
//! Bulk-loads JSON-lines documents into a search index through the
//! batching pipeline and prints a JSON report of the outcome.
//!
//! # Usage
//!
//! ```bash
//! batcher-ingest --input hotels.jsonl --key-field hotelId
//! cat hotels.jsonl | batcher-ingest --action merge-or-upload --dry-run
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/index-batcher/config.toml)
//! 3. Environment variables (BATCHER__SENDER__BATCH_SIZE, BATCHER__SERVICE__API_KEY, ...)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use batcher_ingest::{run_ingest, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    run_ingest(cli).await
}
