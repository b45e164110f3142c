use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::StoreError;

/// Provenance of a record. Written by the reconciler, never read back by the resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub service: String,
}

/// The address set published for one hostname.
///
/// The hostname itself is the store key and is not part of the payload. An empty `ips`
/// list is a valid record meaning "known service, no backends right now".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub ips: Vec<String>,
    /// Seconds. Zero means "not set" and is answered with the resolver default.
    #[serde(default)]
    pub ttl: u32,
    #[serde(default)]
    pub metadata: RecordMetadata,
    pub updated_at: DateTime<Utc>,
}

impl DnsRecord {
    pub fn new(ips: Vec<String>, ttl: u32, metadata: RecordMetadata) -> Self {
        Self {
            ips,
            ttl,
            metadata,
            updated_at: Utc::now(),
        }
    }

    pub fn has_addresses(&self) -> bool {
        !self.ips.is_empty()
    }

    /// Expiry applied to the store entry. Redis rejects a zero expiry.
    pub fn expiry_secs(&self) -> u64 {
        u64::from(self.ttl.max(1))
    }

    pub fn encode(&self) -> Result<String, StoreError> {
        serde_json::to_string(self).map_err(StoreError::Encode)
    }

    pub fn decode(key: &str, payload: &str) -> Result<Self, StoreError> {
        serde_json::from_str(payload).map_err(|source| StoreError::Malformed {
            key: key.to_string(),
            source,
        })
    }
}
