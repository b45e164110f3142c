use std::time::Duration;

use async_trait::async_trait;
use papaya::HashMap;
use tokio::time::Instant;

use super::{DnsRecord, RecordKeys, RecordStore, StoreError};

#[derive(Debug, Clone)]
struct Entry {
    payload: String,
    expires_at: Instant,
}

/// In-process store with the same key layout and expiry rules as the Redis store.
///
/// Expiry follows the tokio clock, so paused-time tests can step over a TTL.
#[derive(Default)]
pub struct MemoryStore {
    entries: HashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw payload under a single key, bypassing encoding.
    pub fn put_raw(&self, key: impl Into<String>, payload: impl Into<String>, ttl: Duration) {
        self.entries.pin().insert(
            key.into(),
            Entry {
                payload: payload.into(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Live payload under a raw key, if any.
    pub fn raw(&self, key: &str) -> Option<String> {
        let entries = self.entries.pin();

        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.payload.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.raw(key).is_some()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn set(&self, hostname: &str, record: &DnsRecord) -> Result<(), StoreError> {
        let keys = RecordKeys::for_hostname(hostname);
        let payload = record.encode()?;
        let ttl = Duration::from_secs(record.expiry_secs());

        for key in keys.both() {
            self.put_raw(key, payload.clone(), ttl);
        }

        Ok(())
    }

    async fn get(&self, hostname: &str) -> Result<Option<DnsRecord>, StoreError> {
        let keys = RecordKeys::for_hostname(hostname);

        self.raw(&keys.canonical)
            .map(|payload| DnsRecord::decode(&keys.canonical, &payload))
            .transpose()
    }

    async fn delete(&self, hostname: &str) -> Result<(), StoreError> {
        let keys = RecordKeys::for_hostname(hostname);
        let entries = self.entries.pin();

        for key in keys.both() {
            entries.remove(key);
        }

        Ok(())
    }
}
