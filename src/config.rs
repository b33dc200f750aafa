use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::RunError;

/// How often the collector reports running totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressThresholds {
    /// Report every time the success count reaches a multiple of this
    #[serde(default = "default_success_step")]
    pub successes: usize,
    /// Report every time the failure count reaches a multiple of this
    #[serde(default = "default_failure_step")]
    pub failures: usize,
}

impl Default for ProgressThresholds {
    fn default() -> Self {
        Self {
            successes: default_success_step(),
            failures: default_failure_step(),
        }
    }
}

/// Settings for one download run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// CSV manifest with `url,class,type` columns (default: "images.csv")
    #[serde(default = "default_manifest")]
    pub manifest: PathBuf,

    /// Append-only log of completed downloads (default: "images.good.csv")
    #[serde(default = "default_success_log")]
    pub success_log: PathBuf,

    /// Append-only log of failed downloads (default: "images.bad.csv")
    #[serde(default = "default_failure_log")]
    pub failure_log: PathBuf,

    /// Root under which `{type}/{class}/` directories live (default: ".")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Number of concurrent workers (default: 10)
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Simultaneous requests allowed against one host (default: 3)
    #[serde(default = "default_per_host_cap")]
    pub per_host_cap: usize,

    /// Whole-request timeout in seconds (default: 30)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub progress: ProgressThresholds,

    /// Class labels a directory is prepared for (default: cat, fish)
    #[serde(default = "default_classes")]
    pub classes: Vec<String>,

    /// Set types a directory is prepared for (default: train, test, val)
    #[serde(default = "default_set_types")]
    pub set_types: Vec<String>,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            manifest: default_manifest(),
            success_log: default_success_log(),
            failure_log: default_failure_log(),
            output_dir: default_output_dir(),
            worker_count: default_worker_count(),
            per_host_cap: default_per_host_cap(),
            request_timeout_secs: default_request_timeout_secs(),
            progress: ProgressThresholds::default(),
            classes: default_classes(),
            set_types: default_set_types(),
            user_agent: default_user_agent(),
        }
    }
}

impl Config {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, RunError> {
        let data = std::fs::read(path)?;
        let config = serde_json::from_slice(&data)?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), RunError> {
        if self.worker_count == 0 {
            return Err(RunError::Config("worker_count must be at least 1".into()));
        }
        if self.per_host_cap == 0 {
            return Err(RunError::Config("per_host_cap must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(RunError::Config(
                "request_timeout_secs must be at least 1".into(),
            ));
        }
        if self.progress.successes == 0 || self.progress.failures == 0 {
            return Err(RunError::Config(
                "progress thresholds must be at least 1".into(),
            ));
        }
        if self.classes.is_empty() || self.set_types.is_empty() {
            return Err(RunError::Config(
                "classes and set_types must not be empty".into(),
            ));
        }
        Ok(())
    }
}

fn default_manifest() -> PathBuf {
    PathBuf::from("images.csv")
}

fn default_success_log() -> PathBuf {
    PathBuf::from("images.good.csv")
}

fn default_failure_log() -> PathBuf {
    PathBuf::from("images.bad.csv")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_worker_count() -> usize {
    10
}

fn default_per_host_cap() -> usize {
    3
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_success_step() -> usize {
    50
}

fn default_failure_step() -> usize {
    20
}

fn default_classes() -> Vec<String> {
    vec!["cat".to_string(), "fish".to_string()]
}

fn default_set_types() -> Vec<String> {
    vec!["train".to_string(), "test".to_string(), "val".to_string()]
}

fn default_user_agent() -> String {
    format!("dataset-fetch/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.worker_count, 10);
        assert_eq!(config.per_host_cap, 3);
        assert_eq!(config.progress.successes, 50);
        assert_eq!(config.progress.failures, 20);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.classes, vec!["cat", "fish"]);
        assert_eq!(config.set_types, vec!["train", "test", "val"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"worker_count": 4, "classes": ["dog"], "progress": {{"failures": 5}}}}"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.per_host_cap, 3);
        assert_eq!(config.classes, vec!["dog"]);
        assert_eq!(config.set_types, vec!["train", "test", "val"]);
        assert_eq!(config.progress.successes, 50);
        assert_eq!(config.progress.failures, 5);
    }

    #[test]
    fn test_bad_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(RunError::Json(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = Config::default();
        config.worker_count = 0;
        assert!(matches!(config.validate(), Err(RunError::Config(_))));

        let mut config = Config::default();
        config.per_host_cap = 0;
        assert!(matches!(config.validate(), Err(RunError::Config(_))));

        let mut config = Config::default();
        config.progress.failures = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.set_types.clear();
        assert!(config.validate().is_err());
    }
}
