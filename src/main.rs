use std::fs;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use table_purger::metrics;
use table_purger::DynamoDbStore;
use table_purger::PurgeConfig;
use table_purger::PurgeOrchestrator;
use table_purger::PurgeOutcome;
use table_purger::Result;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

/// Usage: `table-purger [CONFIG_FILE]`
///
/// Settings come from defaults, `CONFIG_PATH`, the optional file argument and `PURGE__*`
/// environment variables, in that order.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<ExitCode> {
    let mut settings = PurgeConfig::new()?;
    if let Some(path) = std::env::args().nth(1) {
        settings = settings.with_override_config(&path)?;
    }
    let settings = settings.validate()?;

    // Initializing Logs
    let _guard = init_observability(settings.monitoring.log_dir.as_deref())?;
    metrics::register_custom_metrics();

    let store = Arc::new(DynamoDbStore::connect(&settings.store).await);

    // Initializing Shutdown Signal
    let cancel = CancellationToken::new();
    tokio::spawn(graceful_shutdown(cancel.clone()));

    let table = settings.table.name.clone();
    info!(table = %table, dry_run = settings.table.dry_run, "starting purge");
    let mut orchestrator = PurgeOrchestrator::new(store, settings, cancel);
    let summary = match orchestrator.run().await {
        Ok(summary) => summary,
        Err(e) => {
            error!(table = %table, "purge failed: {}", e);
            return Err(e);
        }
    };

    println!("{summary}");
    debug!("final metrics:\n{}", metrics::render());

    let exit = match summary.outcome {
        PurgeOutcome::Aborted => ExitCode::from(130),
        _ if summary.is_clean() => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    };
    Ok(exit)
}

/// Cancels the run on the first SIGINT/SIGTERM; workers stop at their next boundary.
async fn graceful_shutdown(cancel: CancellationToken) {
    let (mut sigint, mut sigterm) = match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
        (Err(e), _) | (_, Err(e)) => {
            error!("Failed to install signal handlers: {:?}", e);
            return;
        }
    };

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = cancel.cancelled() => {
            return;
        },
    }

    info!("Cancelling purge, waiting for workers to stop..");
    cancel.cancel();
}

/// Logs to stderr, plus `purge.log` under `log_dir` when one is configured.
///
/// `RUST_LOG` controls verbosity; the default is `info`.
pub fn init_observability(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let env_filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(env_filter());

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, "purge.log"));
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking)
                .with_filter(env_filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry().with(stderr_layer).with(file_layer).init();

    Ok(guard)
}
