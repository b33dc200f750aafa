use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::downloader::fetcher::{Fetcher, Transport};
use crate::downloader::task::{Delivery, DownloadTask, Outcome};
use crate::error::FetchError;

type TaskQueue = Arc<Mutex<mpsc::Receiver<DownloadTask>>>;

/// Starts `worker_count` workers sharing one task queue.
///
/// Workers stop once the queue is closed and empty, or when `cancel` fires.
/// Each dequeued task yields exactly one outcome unless the run is
/// cancelled while its fetch is in flight.
pub fn spawn_workers<T: Transport + 'static>(
    worker_count: usize,
    fetcher: Arc<Fetcher<T>>,
    output_dir: PathBuf,
    tasks: mpsc::Receiver<DownloadTask>,
    outcomes: mpsc::UnboundedSender<Outcome>,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let queue: TaskQueue = Arc::new(Mutex::new(tasks));
    let output_dir = Arc::new(output_dir);

    (0..worker_count)
        .map(|id| {
            tokio::spawn(work(
                id,
                Arc::clone(&fetcher),
                Arc::clone(&output_dir),
                Arc::clone(&queue),
                outcomes.clone(),
                cancel.clone(),
            ))
        })
        .collect()
}

async fn next_task(queue: &TaskQueue) -> Option<DownloadTask> {
    queue.lock().await.recv().await
}

async fn work<T: Transport>(
    id: usize,
    fetcher: Arc<Fetcher<T>>,
    output_dir: Arc<PathBuf>,
    queue: TaskQueue,
    outcomes: mpsc::UnboundedSender<Outcome>,
    cancel: CancellationToken,
) {
    loop {
        let task = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            task = next_task(&queue) => match task {
                Some(task) => task,
                None => break,
            },
        };

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(worker = id, url = %task.url, "fetch abandoned");
                break;
            }
            result = execute_task(&fetcher, &output_dir, &task) => result.into(),
        };

        if outcomes.send(Outcome { task, status }).is_err() {
            break;
        }
    }
    debug!(worker = id, "worker stopped");
}

async fn execute_task<T: Transport>(
    fetcher: &Fetcher<T>,
    output_dir: &Path,
    task: &DownloadTask,
) -> Result<Delivery, FetchError> {
    let url = task.parsed_url()?;
    let destination = task.destination(output_dir)?;
    fetcher.fetch(&url, &destination).await
}
