use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Caps the number of simultaneous requests against each host.
///
/// Every host gets its own fair semaphore the first time it is seen, so
/// waiters are released in arrival order.
pub struct ConnectionGate {
    per_host: usize,
    hosts: Mutex<HashMap<String, Arc<Semaphore>>>,
}

/// Held while a request is in flight; dropping it frees the slot.
#[derive(Debug)]
pub struct HostPermit {
    _permit: OwnedSemaphorePermit,
}

impl ConnectionGate {
    pub fn new(per_host: usize) -> Self {
        Self {
            per_host,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    fn semaphore(&self, host: &str) -> Arc<Semaphore> {
        let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            hosts
                .entry(host.to_ascii_lowercase())
                .or_insert_with(|| Arc::new(Semaphore::new(self.per_host))),
        )
    }

    pub async fn acquire(&self, host: &str) -> Result<HostPermit, AcquireError> {
        let semaphore = self.semaphore(host);
        let permit = semaphore.acquire_owned().await?;
        Ok(HostPermit { _permit: permit })
    }

    /// Slots currently free for `host`.
    pub fn available(&self, host: &str) -> usize {
        self.semaphore(host).available_permits()
    }
}
