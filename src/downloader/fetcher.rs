use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream::BoxStream};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;
use url::Url;

use crate::downloader::task::Delivery;
use crate::error::FetchError;
use crate::utils::connection_gate::ConnectionGate;

const PART_SUFFIX: &str = ".part";

pub type BodyStream = BoxStream<'static, Result<Bytes, FetchError>>;

pub struct TransportResponse {
    pub status: u16,
    pub body: BodyStream,
}

/// The network primitive the pipeline runs on: one GET, status plus body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url) -> Result<TransportResponse, FetchError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn get(&self, url: &Url) -> Result<TransportResponse, FetchError> {
        (**self).get(url).await
    }
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url) -> Result<TransportResponse, FetchError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes_stream().map_err(FetchError::from).boxed();
        Ok(TransportResponse { status, body })
    }
}

/// Retrieves one url into one destination file.
pub struct Fetcher<T> {
    transport: T,
    gate: ConnectionGate,
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T, per_host_cap: usize) -> Self {
        Self {
            transport,
            gate: ConnectionGate::new(per_host_cap),
        }
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn fetch(&self, url: &Url, destination: &Path) -> Result<Delivery, FetchError> {
        if fs::try_exists(destination).await? {
            debug!(path = %destination.display(), "already present, skipping");
            return Ok(Delivery::AlreadyPresent);
        }

        let host = url
            .host_str()
            .ok_or_else(|| FetchError::Other(format!("url {} has no host", url)))?;
        if self.gate.available(host) == 0 {
            debug!(host, "waiting for a free connection slot");
        }
        let _permit = self
            .gate
            .acquire(host)
            .await
            .map_err(|err| FetchError::Other(err.to_string()))?;

        let response = self.transport.get(url).await?;
        if response.status != 200 {
            return Err(FetchError::HttpStatus(response.status));
        }

        write_atomically(destination, response.body).await
    }
}

/// Streams `body` into a temp file beside `destination`, then links it into
/// place without replacing anything already there. Each attempt gets its own
/// temp file, so tasks racing for one destination never share bytes; the
/// loser finds the file present.
async fn write_atomically(
    destination: &Path,
    mut body: BodyStream,
) -> Result<Delivery, FetchError> {
    let directory = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let name = destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    // removed on drop, so errors and cancellation leave nothing behind
    let (file, part) = tempfile::Builder::new()
        .prefix(&format!(".{}.", name))
        .suffix(PART_SUFFIX)
        .tempfile_in(directory)?
        .into_parts();

    let mut file = fs::File::from_std(file);
    while let Some(chunk) = body.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    match part.persist_noclobber(destination) {
        Ok(()) => Ok(Delivery::Fetched),
        Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
            debug!(path = %destination.display(), "written by another task meanwhile");
            Ok(Delivery::AlreadyPresent)
        }
        Err(err) => Err(err.error.into()),
    }
}
