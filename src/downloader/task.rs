use serde::Serialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::FetchError;

/// One manifest row turned into a unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub url: String,
    pub class_label: String,
    pub set_type: String,
}

impl DownloadTask {
    pub fn new(
        url: impl Into<String>,
        class_label: impl Into<String>,
        set_type: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            class_label: class_label.into(),
            set_type: set_type.into(),
        }
    }

    pub fn parsed_url(&self) -> Result<Url, FetchError> {
        Url::parse(&self.url).map_err(|err| FetchError::Other(format!("invalid url: {}", err)))
    }

    /// `{root}/{set_type}/{class_label}`
    pub fn directory(&self, root: &Path) -> PathBuf {
        root.join(&self.set_type).join(&self.class_label)
    }

    /// `{root}/{set_type}/{class_label}/{basename of the url path}`
    pub fn destination(&self, root: &Path) -> Result<PathBuf, FetchError> {
        let url = self.parsed_url()?;
        let basename = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty() && *name != "." && *name != "..")
            .ok_or_else(|| FetchError::Other(format!("no file name in url {}", self.url)))?;
        Ok(self.directory(root).join(basename))
    }
}

/// How a successful task was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Fetched,
    AlreadyPresent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Success(Delivery),
    Failure(FetchError),
}

impl From<Result<Delivery, FetchError>> for Status {
    fn from(result: Result<Delivery, FetchError>) -> Self {
        match result {
            Ok(delivery) => Status::Success(delivery),
            Err(err) => Status::Failure(err),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub task: DownloadTask,
    pub status: Status,
}

/// Row of the success log.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SuccessRecord<'a> {
    pub url: &'a str,
    pub class: &'a str,
    #[serde(rename = "type")]
    pub set_type: &'a str,
}

/// Row of the failure log.
#[derive(Debug, PartialEq, Eq)]
pub struct FailureRecord<'a> {
    pub url: &'a str,
    pub class: &'a str,
    pub set_type: &'a str,
    pub error: String,
}

impl<'a> From<&'a DownloadTask> for SuccessRecord<'a> {
    fn from(task: &'a DownloadTask) -> Self {
        Self {
            url: &task.url,
            class: &task.class_label,
            set_type: &task.set_type,
        }
    }
}

impl<'a> FailureRecord<'a> {
    pub fn new(task: &'a DownloadTask, err: &FetchError) -> Self {
        Self {
            url: &task.url,
            class: &task.class_label,
            set_type: &task.set_type,
            error: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_uses_url_basename() {
        let task = DownloadTask::new(
            "https://img.example.com/photos/2020/kitten.jpg?size=large#top",
            "cat",
            "train",
        );
        assert_eq!(
            task.destination(Path::new("data")).unwrap(),
            PathBuf::from("data/train/cat/kitten.jpg")
        );
        assert_eq!(
            task.directory(Path::new(".")),
            PathBuf::from("./train/cat")
        );
    }

    #[test]
    fn test_destination_without_file_name() {
        let task = DownloadTask::new("https://img.example.com/photos/", "cat", "train");
        assert!(matches!(
            task.destination(Path::new(".")),
            Err(FetchError::Other(_))
        ));
    }

    #[test]
    fn test_destination_invalid_url() {
        let task = DownloadTask::new("not a url", "fish", "val");
        let err = task.destination(Path::new(".")).unwrap_err();
        assert!(err.to_string().starts_with("invalid url"));
    }

    #[test]
    fn test_status_from_result() {
        assert_eq!(
            Status::from(Ok(Delivery::Fetched)),
            Status::Success(Delivery::Fetched)
        );
        assert_eq!(
            Status::from(Err(FetchError::HttpStatus(500))),
            Status::Failure(FetchError::HttpStatus(500))
        );
    }
}
