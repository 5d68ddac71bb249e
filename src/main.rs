//! Room scoring binary entry point.
//!
//! Reads one JSON batch request from stdin and writes the ranking and
//! explanations as JSON to stdout. All logs go to stderr.
//!
//! Coverage is excluded because `main` only wires stdin/stdout to
//! [`StagedFlow::run_batch`], which is tested in the library.

// Enable the coverage attribute when running with nightly for llvm-cov exclusions
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use std::sync::Arc;

use room_dss::config::Config;
use room_dss::error::AppError;
use room_dss::flow::{BatchRequest, StagedFlow};
use room_dss::metrics::MetricsCollector;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[cfg_attr(coverage_nightly, coverage(off))]
#[tokio::main]
async fn main() {
    // Initialize logging to stderr only (stdout is for the JSON response)
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("LOG_LEVEL")
                .unwrap_or_else(|_| "info".to_string())
                .parse()
                .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    if let Err(e) = run().await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
async fn run() -> Result<(), AppError> {
    let mut config = Config::from_env()?;

    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .map_err(|e| io_error("read stdin", &e))?;
    let request: BatchRequest =
        serde_json::from_str(&input).map_err(|e| io_error("parse request", &e))?;

    if let Some(criteria) = &request.criteria {
        config.criteria = Some(criteria.clone());
    }
    tracing::info!(
        rooms = request.rooms.len(),
        remote = config.scorer_url.is_some(),
        cache = config.session_cache_path.as_deref().unwrap_or("memory"),
        "room-dss scoring batch"
    );

    let metrics = Arc::new(MetricsCollector::new());
    let mut flow = StagedFlow::from_config(&config, Arc::clone(&metrics)).await?;
    let response = flow.run_batch(request).await?;
    flow.teardown();

    let body = serde_json::to_vec_pretty(&response).map_err(|e| io_error("encode response", &e))?;
    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(&body)
        .await
        .map_err(|e| io_error("write stdout", &e))?;
    stdout.flush().await.map_err(|e| io_error("flush stdout", &e))?;

    let summary = metrics.summary();
    tracing::info!(
        batch_id = %response.batch_id,
        estimated = response.estimated,
        events = summary.total_events,
        fallbacks = summary.fallback_count,
        "room-dss done"
    );
    Ok(())
}

fn io_error(action: &str, error: &dyn std::fmt::Display) -> AppError {
    AppError::Io {
        message: format!("Failed to {action}: {error}"),
    }
}
