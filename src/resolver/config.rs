use std::{net::SocketAddr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_ANSWER_TTL_SECS, DEFAULT_DNS_BIND_ADDRESS, DEFAULT_DNS_TCP_TIMEOUT};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DnsServerConfig {
    /// Address the DNS server binds to, UDP and TCP (e.g. "0.0.0.0:53")
    #[serde(rename = "bind-address")]
    pub bind_address: String,
    /// TTL answered for stored records that carry none
    #[serde(rename = "default-ttl")]
    pub default_ttl: u32,
    /// Nameservers queried when no plugin before them answers. Empty disables forwarding.
    #[serde(rename = "upstreams")]
    pub upstreams: Vec<SocketAddr>,
    #[serde(rename = "upstream-timeout", with = "crate::utils::time")]
    pub upstream_timeout: Duration,
    #[serde(rename = "tcp-timeout", with = "crate::utils::time")]
    pub tcp_timeout: Duration,
}

impl Default for DnsServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_DNS_BIND_ADDRESS.to_string(),
            default_ttl: DEFAULT_ANSWER_TTL_SECS,
            upstreams: vec![],
            upstream_timeout: Duration::from_secs(2),
            tcp_timeout: DEFAULT_DNS_TCP_TIMEOUT,
        }
    }
}
