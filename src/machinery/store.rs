// Redis backed record store. Records expire on their own; the reconciler refreshes them.

mod config;
mod memory;
mod record;
mod redis;
mod timeout;

pub use config::StoreConfig;
pub use memory::MemoryStore;
pub use record::{DnsRecord, RecordMetadata};
pub use self::redis::RedisStore;
pub use timeout::TimeoutStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::constants::RECORD_KEY_PREFIX;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store is not configured: missing {0}")]
    NotConfigured(&'static str),

    #[error("invalid store address: {0}")]
    InvalidAddress(String),

    #[error("store call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("store transport error: {0}")]
    Transport(#[from] ::redis::RedisError),

    #[error("failed to encode record: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("malformed record under {key}: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Typed access to the record store.
///
/// Every record lives under two keys, the bare hostname and its trailing-dot form, so that
/// writers holding administrative hostnames and readers holding query names meet without
/// agreeing on a normalization.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Write both keys, each expiring after the record TTL. Both must succeed.
    async fn set(&self, hostname: &str, record: &DnsRecord) -> Result<(), StoreError>;

    /// Read the canonical key. `Ok(None)` when absent or expired.
    async fn get(&self, hostname: &str) -> Result<Option<DnsRecord>, StoreError>;

    /// Remove both keys. Missing keys are not an error.
    async fn delete(&self, hostname: &str) -> Result<(), StoreError>;
}

pub fn normalize_hostname(hostname: &str) -> String {
    let hostname = hostname.trim().to_ascii_lowercase();

    match hostname.strip_suffix('.') {
        Some(stripped) => stripped.to_string(),
        None => hostname,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordKeys {
    pub canonical: String,
    pub fqdn: String,
}

impl RecordKeys {
    pub fn for_hostname(hostname: &str) -> Self {
        let canonical = format!("{}{}", RECORD_KEY_PREFIX, normalize_hostname(hostname));
        let fqdn = format!("{}.", canonical);

        Self { canonical, fqdn }
    }

    pub fn both(&self) -> [&str; 2] {
        [&self.canonical, &self.fqdn]
    }
}
