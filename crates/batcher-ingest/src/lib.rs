//! Ingest tool library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: The ingest command: read, enqueue, close, report

pub mod cli;
pub mod commands;

pub use cli::{ActionArg, Cli};
pub use commands::{enqueue_lines, parse_line, run_ingest, IngestReport, LoggingHooks};
