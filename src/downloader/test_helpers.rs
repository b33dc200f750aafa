//! In-memory transport for pipeline tests.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;

use crate::downloader::fetcher::{Transport, TransportResponse};
use crate::error::FetchError;

#[derive(Debug, Clone)]
pub enum MockReply {
    Body(Vec<u8>),
    Status(u16),
    Network,
    /// 200 with a body that errors after the first chunk
    BrokenBody,
    /// 200 with a body that never finishes
    Stall,
}

/// Replies per url and records how many calls were in flight at once,
/// in total and per host.
pub struct MockTransport {
    replies: HashMap<String, MockReply>,
    fallback: MockReply,
    latency: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    hosts: Mutex<HashMap<String, (usize, usize)>>,
}

impl MockTransport {
    pub fn new(fallback: MockReply) -> Self {
        Self {
            replies: HashMap::new(),
            fallback,
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            hosts: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_reply(mut self, url: &str, reply: MockReply) -> Self {
        self.replies.insert(url.to_string(), reply);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight_for(&self, host: &str) -> usize {
        self.hosts
            .lock()
            .unwrap()
            .get(host)
            .map_or(0, |(_, max)| *max)
    }

    fn enter(&self, host: &str) -> InFlight<'_> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let mut hosts = self.hosts.lock().unwrap();
        let entry = hosts.entry(host.to_string()).or_insert((0, 0));
        entry.0 += 1;
        entry.1 = entry.1.max(entry.0);

        InFlight {
            transport: self,
            host: host.to_string(),
        }
    }
}

struct InFlight<'a> {
    transport: &'a MockTransport,
    host: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.transport.in_flight.fetch_sub(1, Ordering::SeqCst);
        if let Some(entry) = self.transport.hosts.lock().unwrap().get_mut(&self.host) {
            entry.0 -= 1;
        }
    }
}

fn ok(body: Vec<Result<Bytes, FetchError>>) -> TransportResponse {
    TransportResponse {
        status: 200,
        body: stream::iter(body).boxed(),
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &Url) -> Result<TransportResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        {
            let _in_flight = self.enter(url.host_str().unwrap_or_default());
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
        }

        let reply = self.replies.get(url.as_str()).unwrap_or(&self.fallback);
        match reply.clone() {
            MockReply::Body(bytes) => Ok(ok(vec![Ok(Bytes::from(bytes))])),
            MockReply::Status(status) => Ok(TransportResponse {
                status,
                body: stream::empty().boxed(),
            }),
            MockReply::Network => Err(FetchError::Network),
            MockReply::BrokenBody => Ok(ok(vec![
                Ok(Bytes::from_static(b"partial")),
                Err(FetchError::Network),
            ])),
            MockReply::Stall => Ok(TransportResponse {
                status: 200,
                body: stream::iter(vec![Ok(Bytes::from_static(b"partial"))])
                    .chain(stream::pending())
                    .boxed(),
            }),
        }
    }
}
