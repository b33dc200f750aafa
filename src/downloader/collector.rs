use csv::{Terminator, WriterBuilder};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{Config, ProgressThresholds};
use crate::downloader::task::{Delivery, FailureRecord, Outcome, Status, SuccessRecord};
use crate::error::RunError;

const SUCCESS_HEADER: &str = "url,class,type\n";
const FAILURE_HEADER: &str = "url,class,type,error\n";

/// Running totals for one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub progress_reports: usize,
}

/// Opens `path` for appending, writing `header` first if the file is new or
/// empty. A last line cut short (by a kill, or a hand-made header) is
/// terminated first so the next row starts on a line of its own.
fn open_log(path: &Path, header: &str) -> Result<File, RunError> {
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;
    if file.metadata()?.len() == 0 {
        file.write_all(header.as_bytes())?;
    } else if ends_mid_line(&mut file)? {
        file.write_all(b"\n")?;
    }
    file.flush()?;
    Ok(file)
}

fn ends_mid_line(file: &mut File) -> io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// `url,class,type` quoted only where needed, then the error detail, always
/// quoted.
fn failure_row(record: &FailureRecord<'_>) -> Result<Vec<u8>, RunError> {
    let mut fields = WriterBuilder::new()
        .has_headers(false)
        .terminator(Terminator::Any(b','))
        .from_writer(Vec::new());
    fields.write_record([record.url, record.class, record.set_type])?;
    let mut row = fields
        .into_inner()
        .map_err(|err| RunError::Io(err.into_error()))?;
    row.push(b'"');
    row.extend_from_slice(record.error.replace('"', "\"\"").as_bytes());
    row.extend_from_slice(b"\"\n");
    Ok(row)
}

/// Sole consumer of outcomes and sole writer of both logs.
pub struct Collector {
    success_log: csv::Writer<File>,
    failure_log: File,
    output_dir: PathBuf,
    thresholds: ProgressThresholds,
    tally: Tally,
}

impl Collector {
    pub fn open(config: &Config) -> Result<Self, RunError> {
        Ok(Self {
            success_log: WriterBuilder::new()
                .has_headers(false)
                .from_writer(open_log(&config.success_log, SUCCESS_HEADER)?),
            failure_log: open_log(&config.failure_log, FAILURE_HEADER)?,
            output_dir: config.output_dir.clone(),
            thresholds: config.progress,
            tally: Tally::default(),
        })
    }

    pub fn record(&mut self, outcome: &Outcome) -> Result<(), RunError> {
        let task = &outcome.task;
        match &outcome.status {
            Status::Success(Delivery::AlreadyPresent) => {
                self.tally.skipped += 1;
            }
            Status::Success(Delivery::Fetched) => {
                self.success_log.serialize(SuccessRecord::from(task))?;
                self.success_log.flush()?;
                self.tally.succeeded += 1;
                if self.tally.succeeded % self.thresholds.successes == 0 {
                    self.report_progress();
                }
            }
            Status::Failure(err) => {
                warn!(
                    "Error {} downloading {} to {}",
                    err,
                    task.url,
                    task.directory(&self.output_dir).display()
                );
                let row = failure_row(&FailureRecord::new(task, err))?;
                self.failure_log.write_all(&row)?;
                self.failure_log.flush()?;
                self.tally.failed += 1;
                if self.tally.failed % self.thresholds.failures == 0 {
                    self.report_progress();
                }
            }
        }
        Ok(())
    }

    fn report_progress(&mut self) {
        self.tally.progress_reports += 1;
        info!(
            "... downloaded {}, {} failed ...",
            self.tally.succeeded, self.tally.failed
        );
    }

    /// Consumes outcomes until every sender is gone, then closes the logs.
    pub async fn run(
        mut self,
        mut outcomes: mpsc::UnboundedReceiver<Outcome>,
    ) -> Result<Tally, RunError> {
        while let Some(outcome) = outcomes.recv().await {
            self.record(&outcome)?;
        }
        self.finish()
    }

    pub fn finish(mut self) -> Result<Tally, RunError> {
        self.success_log.flush()?;
        self.failure_log.flush()?;
        debug!("logs closed after {} progress reports", self.tally.progress_reports);
        Ok(self.tally)
    }
}
