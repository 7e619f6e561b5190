//! Replays recorded spans through the span metrics connector.

use std::{path::Path, sync::Arc, time::Duration};

use clap::Parser as _;
use spanmetrics::{data_model::Traces, SpanMetricsConfiguration, SpanMetricsConnector};
use spanmetrics_common::error::{ErrorContext as _, GenericError};
use spanmetrics_config::ConfigurationLoader;
use tracing::{debug, error, info};

mod cli;
use self::cli::Cli;

mod logging;
use self::logging::initialize_logging;

mod output;
use self::output::JsonLinesConsumer;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = initialize_logging(cli.log_level()) {
        eprintln!("FATAL: {}", e);
        std::process::exit(1);
    }

    match run(cli).await {
        Ok(()) => info!("spanmetrics-replay stopped."),
        Err(e) => {
            error!("{:?}", e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<(), GenericError> {
    let mut loader = ConfigurationLoader::default();
    if let Some(config_path) = &cli.config_path {
        loader = loader
            .from_yaml(config_path)
            .with_error_context(|| format!("Failed to load configuration from '{}'.", config_path.display()))?;
    }
    let configuration = loader.from_environment("SPANMETRICS")?.into_generic();

    let settings = SpanMetricsConfiguration::from_configuration(&configuration)?
        .validate()
        .error_context("Invalid span metrics configuration.")?;
    let flush_interval = settings.flush_interval();
    let temporality = settings.temporality();

    let connector = SpanMetricsConnector::new(settings, Arc::new(JsonLinesConsumer::stdout()))?;
    connector.start()?;

    info!(
        files = cli.trace_files.len(),
        flush_interval = ?flush_interval,
        ?temporality,
        "Replaying trace files."
    );

    let delay = Duration::from_millis(cli.delay_ms);
    let mut total_spans = 0;
    for (i, path) in cli.trace_files.iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        for traces in read_trace_file(path).await? {
            total_spans += traces.span_count();
            connector.consume_traces(&traces)?;
        }
    }

    connector.shutdown().await;
    connector.export_metrics().await;

    info!(spans = total_spans, "Replay complete.");

    Ok(())
}

/// Reads every trace batch from the given file.
///
/// Batches are JSON documents, and a file may hold several of them separated by whitespace.
async fn read_trace_file(path: &Path) -> Result<Vec<Traces>, GenericError> {
    let contents = tokio::fs::read(path)
        .await
        .with_error_context(|| format!("Failed to read trace file '{}'.", path.display()))?;

    let batches = serde_json::Deserializer::from_slice(&contents)
        .into_iter::<Traces>()
        .collect::<Result<Vec<_>, _>>()
        .with_error_context(|| format!("Failed to decode trace file '{}'.", path.display()))?;

    debug!(path = %path.display(), batches = batches.len(), "Read trace file.");

    Ok(batches)
}
