//! Ingest command implementation.
//!
//! 1. Load settings and apply CLI overrides
//! 2. Initialize logging
//! 3. Build the network client (HTTP, or the accepting mock on `--dry-run`)
//! 4. Enqueue every document from the input
//! 5. Close the sender and report what happened

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::sync::Arc;

use anyhow::{Context, Result};
use batcher_client::{HttpClientConfig, HttpIndexClient};
use batcher_pipeline::mock::MockIndexClient;
use batcher_pipeline::{
    ActionFailure, ActionHooks, BufferedSender, FailureReason, FlushSummary, IndexAction,
    IndexClient, TrackedAction,
};
use batcher_types::{ActionKind, Settings};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cli::Cli;

/// Hooks that log terminal outcomes.
pub struct LoggingHooks;

impl ActionHooks<Value> for LoggingHooks {
    fn on_succeeded(&self, action: &TrackedAction<Value>) {
        debug!(key = %action.key(), try_count = action.try_count(), "Indexed");
    }

    fn on_error(&self, action: &TrackedAction<Value>, reason: &FailureReason) {
        warn!(key = %action.key(), try_count = action.try_count(), reason = %reason, "Failed to index");
    }
}

/// A line of input that could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedLine {
    pub line: usize,
    pub error: String,
}

/// Report printed once the sender is closed.
#[derive(Debug, Default, Serialize)]
pub struct IngestReport {
    pub documents: usize,
    pub malformed: Vec<MalformedLine>,
    pub requests: usize,
    pub splits: usize,
    pub succeeded: usize,
    pub retried: usize,
    pub failed: Vec<FailedAction>,
}

#[derive(Debug, Serialize)]
pub struct FailedAction {
    pub key: String,
    pub try_count: u32,
    pub reason: String,
}

impl From<ActionFailure> for FailedAction {
    fn from(failure: ActionFailure) -> Self {
        Self {
            key: failure.key,
            try_count: failure.try_count,
            reason: failure.reason.to_string(),
        }
    }
}

impl IngestReport {
    fn record_summary(&mut self, summary: FlushSummary) {
        self.requests += summary.requests;
        self.splits += summary.splits;
        self.succeeded += summary.succeeded;
        self.retried += summary.retried;
        self.failed.extend(summary.failed.into_iter().map(FailedAction::from));
    }
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<Value>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value @ Value::Object(_)) => Ok(Some(value)),
        Ok(_) => Err("expected a JSON object".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Enqueue every document read from `reader`.
///
/// Malformed lines are recorded and skipped; enqueue errors abort.
pub fn enqueue_lines<R: BufRead>(
    reader: R,
    sender: &BufferedSender<Value>,
    kind: ActionKind,
    report: &mut IngestReport,
) -> Result<()> {
    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.with_context(|| format!("Failed to read input line {line_no}"))?;
        match parse_line(&line) {
            Ok(Some(document)) => {
                sender
                    .add_actions([IndexAction::new(kind, document)])
                    .context("Failed to enqueue document")?;
                report.documents += 1;
            }
            Ok(None) => {}
            Err(error) => {
                warn!(line = line_no, error = %error, "Skipping malformed line");
                report.malformed.push(MalformedLine {
                    line: line_no,
                    error,
                });
            }
        }
    }
    Ok(())
}

/// Run the ingest command.
pub async fn run_ingest(cli: Cli) -> Result<()> {
    let mut settings =
        Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;

    if let Some(batch_size) = cli.batch_size {
        settings.sender.batch_size = batch_size;
    }
    if let Some(log_level) = &cli.log_level {
        settings.log_level = log_level.clone();
    }

    let subscriber = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let client: Arc<dyn IndexClient> = if cli.dry_run {
        info!("Dry run: actions are accepted locally");
        Arc::new(MockIndexClient::accepting())
    } else {
        let config = HttpClientConfig::from_settings(&settings.service)
            .context("Invalid service settings")?;
        info!(
            endpoint = %config.endpoint,
            index = %config.index_name,
            "Submitting to search service"
        );
        Arc::new(HttpIndexClient::new(config).context("Failed to create HTTP client")?)
    };

    let sender = BufferedSender::<Value>::builder(client)
        .config(settings.sender.clone())
        .key_field(cli.key_field.clone())
        .hooks(Arc::new(LoggingHooks))
        .build()
        .context("Failed to create sender")?;

    let kind = ActionKind::from(cli.action);
    let mut report = IngestReport::default();
    let read_result = match &cli.input {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open input {}", path.display()))?;
            enqueue_lines(BufReader::new(file), &sender, kind, &mut report)
        }
        None => enqueue_lines(io::stdin().lock(), &sender, kind, &mut report),
    };

    // Flush what was accepted even if reading stopped early
    let close_result = sender.close().await;
    read_result?;
    match close_result {
        Ok(summary) => report.record_summary(summary),
        Err(batcher_pipeline::PipelineError::FlushFailed { failures }) => {
            report.failed.extend(failures.into_iter().map(FailedAction::from));
        }
        Err(e) => return Err(e).context("Failed to close sender"),
    }

    info!(
        documents = report.documents,
        succeeded = report.succeeded,
        failed = report.failed.len(),
        "Ingest complete"
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to render report")?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use batcher_pipeline::mock::RecordingHooks;
    use batcher_types::SenderConfig;
    use std::io::Cursor;
    use std::io::Write;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("   "), Ok(None));
        assert_eq!(
            parse_line(r#"{"id": "1"}"#),
            Ok(Some(serde_json::json!({"id": "1"})))
        );
        assert_eq!(parse_line("[1, 2]"), Err("expected a JSON object".to_string()));
        assert!(parse_line("{not json").is_err());
    }

    #[tokio::test]
    async fn test_enqueue_lines_skips_bad_input() {
        let client = Arc::new(MockIndexClient::accepting());
        let hooks = Arc::new(RecordingHooks::new());
        let sender = BufferedSender::<Value>::builder(client.clone())
            .config(SenderConfig::default().with_auto_flush(false))
            .key_field("id")
            .hooks(hooks.clone())
            .build()
            .unwrap();

        let input = "{\"id\":\"a\"}\n\n{broken\n{\"id\":\"b\"}\n42\n";
        let mut report = IngestReport::default();
        enqueue_lines(Cursor::new(input), &sender, ActionKind::Merge, &mut report).unwrap();

        assert_eq!(report.documents, 2);
        assert_eq!(
            report.malformed.iter().map(|m| m.line).collect::<Vec<_>>(),
            vec![3, 5]
        );
        assert_eq!(sender.pending_count(), 2);

        let summary = sender.close().await.unwrap();
        report.record_summary(summary);
        assert_eq!(report.succeeded, 2);
        assert_eq!(client.calls(), vec![vec!["a", "b"]]);
        assert_eq!(hooks.added_keys(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_enqueue_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id": "h1", "name": "Fancy Stay"}}"#).unwrap();
        writeln!(file, r#"{{"id": "h2", "name": "Roach Motel"}}"#).unwrap();

        let client = Arc::new(MockIndexClient::accepting());
        let sender = BufferedSender::<Value>::builder(client.clone())
            .config(SenderConfig::default().with_auto_flush(false))
            .key_field("id")
            .build()
            .unwrap();

        let mut report = IngestReport::default();
        let reader = BufReader::new(File::open(file.path()).unwrap());
        enqueue_lines(reader, &sender, ActionKind::Upload, &mut report).unwrap();
        report.record_summary(sender.close().await.unwrap());

        assert_eq!(report.documents, 2);
        assert_eq!(report.requests, 1);
        assert!(report.failed.is_empty());
    }
}
