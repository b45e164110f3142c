use std::{future::Future, time::Duration};

use async_trait::async_trait;
use tracing::warn;

use super::{DnsRecord, RecordStore, StoreError};

pub(super) async fn with_deadline<T>(
    timeout: Duration,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(timeout)),
    }
}

/// Bounds every call of the wrapped store. A stalled backend surfaces as
/// [`StoreError::Timeout`] instead of parking the caller.
pub struct TimeoutStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S> TimeoutStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<S: RecordStore> RecordStore for TimeoutStore<S> {
    async fn set(&self, hostname: &str, record: &DnsRecord) -> Result<(), StoreError> {
        with_deadline(self.timeout, self.inner.set(hostname, record))
            .await
            .inspect_err(|e| warn!("store write for {} failed: {}", hostname, e))
    }

    async fn get(&self, hostname: &str) -> Result<Option<DnsRecord>, StoreError> {
        with_deadline(self.timeout, self.inner.get(hostname)).await
    }

    async fn delete(&self, hostname: &str) -> Result<(), StoreError> {
        with_deadline(self.timeout, self.inner.delete(hostname)).await
    }
}
