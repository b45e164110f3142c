use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::StoreError;
use crate::constants::DEFAULT_STORE_TIMEOUT;

fn default_timeout() -> Duration {
    DEFAULT_STORE_TIMEOUT
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// `host:port`, or a full `redis://` / `rediss://` URL.
    #[serde(rename = "address")]
    pub address: Option<String>,
    #[serde(rename = "password")]
    pub password: Option<String>,
    #[serde(rename = "tls", default)]
    pub tls: bool,
    /// Deadline for each store call, the startup PING included.
    #[serde(rename = "timeout", with = "crate::utils::time", default = "default_timeout")]
    pub timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            address: None,
            password: None,
            tls: false,
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

impl StoreConfig {
    pub fn connection_url(&self) -> Result<Url, StoreError> {
        let address = self
            .address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .ok_or(StoreError::NotConfigured("store address"))?;

        let password = self
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or(StoreError::NotConfigured("store password"))?;

        let raw = if address.contains("://") {
            address.to_string()
        } else {
            let scheme = if self.tls { "rediss" } else { "redis" };
            format!("{}://{}/", scheme, address)
        };

        let mut url = Url::parse(&raw).map_err(|e| StoreError::InvalidAddress(e.to_string()))?;
        if !matches!(url.scheme(), "redis" | "rediss") {
            return Err(StoreError::InvalidAddress(format!(
                "unsupported scheme {}",
                url.scheme()
            )));
        }

        if self.tls && url.scheme() == "redis" {
            url.set_scheme("rediss")
                .map_err(|_| StoreError::InvalidAddress(address.to_string()))?;
        }

        url.set_password(Some(password))
            .map_err(|_| StoreError::InvalidAddress(address.to_string()))?;

        Ok(url)
    }
}
