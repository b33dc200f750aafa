use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

mod config;
use config::Config;

mod downloader;
use downloader::download;

mod error;
use error::RunError;

mod utils;

#[derive(Parser)]
#[command(name = "dataset-fetch")]
#[command(about = "Download the labeled images listed in a CSV manifest")]
#[command(version)]
struct Cli {
    #[arg(short, long, help = "JSON config file")]
    config: Option<PathBuf>,
    #[arg(short, long, help = "manifest with url,class,type columns")]
    manifest: Option<PathBuf>,
    #[arg(long, help = "log of completed downloads")]
    success_log: Option<PathBuf>,
    #[arg(long, help = "log of failed downloads")]
    failure_log: Option<PathBuf>,
    #[arg(short, long, help = "root of the {type}/{class} directories")]
    output_dir: Option<PathBuf>,
    #[arg(short, long, help = "concurrent workers")]
    workers: Option<usize>,
    #[arg(long, help = "simultaneous requests per host")]
    per_host: Option<usize>,
    #[arg(long, help = "request timeout in seconds")]
    timeout: Option<u64>,
    #[arg(long, value_delimiter = ',', help = "class labels, comma separated")]
    classes: Vec<String>,
    #[arg(long, value_delimiter = ',', help = "set types, comma separated")]
    set_types: Vec<String>,
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn into_config(self) -> Result<Config, RunError> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        if let Some(manifest) = self.manifest {
            config.manifest = manifest;
        }
        if let Some(success_log) = self.success_log {
            config.success_log = success_log;
        }
        if let Some(failure_log) = self.failure_log {
            config.failure_log = failure_log;
        }
        if let Some(output_dir) = self.output_dir {
            config.output_dir = output_dir;
        }
        if let Some(workers) = self.workers {
            config.worker_count = workers;
        }
        if let Some(per_host) = self.per_host {
            config.per_host_cap = per_host;
        }
        if let Some(timeout) = self.timeout {
            config.request_timeout_secs = timeout;
        }
        if !self.classes.is_empty() {
            config.classes = self.classes;
        }
        if !self.set_types.is_empty() {
            config.set_types = self.set_types;
        }
        Ok(config)
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(err) => {
            error!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing up");
                cancel.cancel();
            }
        })
    };

    let result = download(&config, cancel).await;
    interrupt.abort();

    match result {
        Ok(summary) if summary.interrupted => {
            println!("Download interrupted by user.");
            println!(
                "Processed {} of {} images: downloaded {} files, error downloading {} files.",
                summary.tally.succeeded + summary.tally.failed + summary.tally.skipped,
                summary.total,
                summary.tally.succeeded,
                summary.tally.failed
            );
            ExitCode::FAILURE
        }
        Ok(summary) => {
            println!();
            println!(
                "DONE. Downloaded {} files. Error downloading {} files. {} already present.",
                summary.tally.succeeded, summary.tally.failed, summary.tally.skipped
            );
            if summary.carried_over_failures > 0 {
                println!(
                    "{} failures from earlier runs remain in {}.",
                    summary.carried_over_failures,
                    config.failure_log.display()
                );
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
