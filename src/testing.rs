use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::machinery::store::{DnsRecord, RecordStore, StoreError};

fn unavailable() -> StoreError {
    StoreError::Transport(redis::RedisError::from((
        redis::ErrorKind::IoError,
        "connection refused",
    )))
}

/// A store whose every call fails with a transport error.
pub struct FailingStore;

#[async_trait]
impl RecordStore for FailingStore {
    async fn set(&self, _hostname: &str, _record: &DnsRecord) -> Result<(), StoreError> {
        Err(unavailable())
    }

    async fn get(&self, _hostname: &str) -> Result<Option<DnsRecord>, StoreError> {
        Err(unavailable())
    }

    async fn delete(&self, _hostname: &str) -> Result<(), StoreError> {
        Err(unavailable())
    }
}

/// Counts writes and deletes passed through to the wrapped store.
pub struct CountingStore<S> {
    inner: S,
    writes: AtomicUsize,
    deletes: AtomicUsize,
}

impl<S> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            writes: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: RecordStore> RecordStore for CountingStore<S> {
    async fn set(&self, hostname: &str, record: &DnsRecord) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set(hostname, record).await
    }

    async fn get(&self, hostname: &str) -> Result<Option<DnsRecord>, StoreError> {
        self.inner.get(hostname).await
    }

    async fn delete(&self, hostname: &str) -> Result<(), StoreError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(hostname).await
    }
}

/// A store whose backend accepts calls and never answers.
pub struct StallingStore;

#[async_trait]
impl RecordStore for StallingStore {
    async fn set(&self, _hostname: &str, _record: &DnsRecord) -> Result<(), StoreError> {
        std::future::pending().await
    }

    async fn get(&self, _hostname: &str) -> Result<Option<DnsRecord>, StoreError> {
        std::future::pending().await
    }

    async fn delete(&self, _hostname: &str) -> Result<(), StoreError> {
        std::future::pending().await
    }
}
