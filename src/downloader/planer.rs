use csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::Config;
use crate::downloader::task::DownloadTask;
use crate::error::RunError;

#[derive(Debug, Deserialize)]
struct ManifestRow {
    url: String,
    class: String,
    #[serde(rename = "type")]
    set_type: String,
}

/// Everything a run needs before dispatch starts.
#[derive(Debug)]
pub struct Plan {
    pub directories: Vec<PathBuf>,
    pub tasks: Vec<DownloadTask>,
}

impl Plan {
    /// Creates every missing `{type}/{class}` directory, returning the ones it made.
    pub fn prepare_directories(&self) -> Result<Vec<PathBuf>, RunError> {
        let mut created = Vec::new();
        for path in self.directories.iter() {
            if !path.try_exists()? {
                fs::create_dir_all(path)?;
                info!("Created directory {}", path.display());
                created.push(path.clone());
            }
        }
        Ok(created)
    }
}

pub struct Planer<'a> {
    config: &'a Config,
}

impl<'a> Planer<'a> {
    pub fn new(config: &'a Config) -> Self {
        Planer { config }
    }

    pub fn plan(&self) -> Result<Plan, RunError> {
        let tasks = read_manifest(&self.config.manifest)?;

        let classes: HashSet<&str> = self.config.classes.iter().map(String::as_str).collect();
        let set_types: HashSet<&str> = self.config.set_types.iter().map(String::as_str).collect();
        let unknown = tasks
            .iter()
            .filter(|t| {
                !classes.contains(t.class_label.as_str())
                    || !set_types.contains(t.set_type.as_str())
            })
            .count();
        if unknown > 0 {
            warn!(
                "{} manifest rows use a class or type outside the configured labels",
                unknown
            );
        }

        let mut directories = Vec::new();
        for set_type in self.config.set_types.iter() {
            for class in self.config.classes.iter() {
                directories.push(self.config.output_dir.join(set_type).join(class));
            }
        }

        Ok(Plan { directories, tasks })
    }
}

/// Reads `url,class,type` rows in manifest order.
pub fn read_manifest(path: &Path) -> Result<Vec<DownloadTask>, RunError> {
    if !path.try_exists()? {
        return Err(RunError::MissingManifest(path.to_path_buf()));
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_path(path)?;
    let mut tasks = Vec::new();
    for result in reader.deserialize() {
        let row: ManifestRow = result?;
        tasks.push(DownloadTask::new(row.url, row.class, row.set_type));
    }
    Ok(tasks)
}
