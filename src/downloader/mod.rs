mod collector;
mod executor;
mod fetcher;
mod planer;
mod task;
#[cfg(test)]
mod test_helpers;

use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::RunError;
use collector::Collector;
pub use collector::Tally;
use fetcher::Fetcher;
pub use fetcher::{HttpTransport, Transport};
use planer::Planer;

/// What a finished (or interrupted) run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub tally: Tally,
    /// Failure rows already in the failure log when the run started
    pub carried_over_failures: usize,
    pub interrupted: bool,
}

/// Counts the rows of an existing failure log, header excluded. Rows are
/// read as raw bytes; an unreadable log only loses the count.
fn count_prior_failures(path: &Path) -> usize {
    match path.try_exists() {
        Ok(true) => {}
        _ => return 0,
    }
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path);
    let mut reader = match reader {
        Ok(reader) => reader,
        Err(err) => {
            warn!("cannot read {}: {}", path.display(), err);
            return 0;
        }
    };

    let mut rows = 0;
    for record in reader.byte_records() {
        if let Err(err) = record {
            warn!("stopped counting rows of {}: {}", path.display(), err);
            break;
        }
        rows += 1;
    }
    rows
}

pub async fn download(config: &Config, cancel: CancellationToken) -> Result<RunSummary, RunError> {
    let transport = HttpTransport::new(config.request_timeout(), &config.user_agent)?;
    run(config, transport, cancel).await
}

/// Runs the whole pipeline over `transport`.
///
/// Shutdown is ordered: the task queue closes once dispatch ends, workers
/// exit after draining it, and the outcome channel closes with the last
/// worker so the collector sees every outcome before it returns.
pub async fn run<T: Transport + 'static>(
    config: &Config,
    transport: T,
    cancel: CancellationToken,
) -> Result<RunSummary, RunError> {
    config.validate()?;

    let plan = Planer::new(config).plan()?;
    let carried_over_failures = count_prior_failures(&config.failure_log);
    if carried_over_failures > 0 {
        info!(
            "{} failures from earlier runs kept in {}",
            carried_over_failures,
            config.failure_log.display()
        );
    }
    let collector = Collector::open(config)?;
    plan.prepare_directories()?;

    let total = plan.tasks.len();
    info!("Downloading {} images:", total);

    let (task_tx, task_rx) = mpsc::channel(config.worker_count * 2);
    let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
    let fetcher = Arc::new(Fetcher::new(transport, config.per_host_cap));
    let workers = executor::spawn_workers(
        config.worker_count,
        fetcher,
        config.output_dir.clone(),
        task_rx,
        outcome_tx,
        cancel.clone(),
    );
    let collector = tokio::spawn(collector.run(outcome_rx));

    for task in plan.tasks {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = task_tx.send(task) => if sent.is_err() {
                break;
            },
        }
    }
    drop(task_tx);

    for worker in workers {
        if let Err(err) = worker.await {
            error!("worker task failed: {}", err);
        }
    }

    let tally = collector.await??;
    info!(
        "Finished: {} downloaded, {} failed, {} already present",
        tally.succeeded, tally.failed, tally.skipped
    );

    Ok(RunSummary {
        total,
        tally,
        carried_over_failures,
        interrupted: cancel.is_cancelled(),
    })
}
