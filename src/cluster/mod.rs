mod kubernetes;
mod memory;

pub use kubernetes::{KubeCluster, WatchCache};
pub use memory::MemoryCluster;

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

use crate::constants::{ANNOTATION_ENABLED, ANNOTATION_HOSTNAME};

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("cluster api error: {0}")]
    Api(#[from] kube::Error),

    #[error("cluster unavailable: {0}")]
    Unavailable(String),
}

/// What a service asks of DNS, read from its annotations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsTarget {
    Disabled,
    /// Enabled, but no usable hostname annotation.
    MissingHostname,
    Enabled(String),
}

/// Read-only view of a cluster service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub namespace: String,
    pub name: String,
    pub annotations: BTreeMap<String, String>,
}

impl ServiceDescriptor {
    pub fn new(namespace: impl AsRef<str>, name: impl AsRef<str>) -> Self {
        Self {
            namespace: namespace.as_ref().to_string(),
            name: name.as_ref().to_string(),
            annotations: BTreeMap::new(),
        }
    }

    pub fn with_annotation(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.annotations
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    /// Shorthand for a service carrying both DNS annotations.
    pub fn with_hostname(self, hostname: impl AsRef<str>) -> Self {
        self.with_annotation(ANNOTATION_ENABLED, "true")
            .with_annotation(ANNOTATION_HOSTNAME, hostname)
    }

    pub fn dns_target(&self) -> DnsTarget {
        if self.annotations.get(ANNOTATION_ENABLED).map(String::as_str) != Some("true") {
            return DnsTarget::Disabled;
        }

        match self.annotations.get(ANNOTATION_HOSTNAME).map(|h| h.trim()) {
            Some(hostname) if !hostname.is_empty() => DnsTarget::Enabled(hostname.to_string()),
            _ => DnsTarget::MissingHostname,
        }
    }

    pub fn hostname(&self) -> Option<String> {
        match self.dns_target() {
            DnsTarget::Enabled(hostname) => Some(hostname),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletedService {
    Known(ServiceDescriptor),
    /// The delete was inferred (e.g. after a relist) rather than observed.
    FinalStateUnknown {
        namespace: String,
        name: String,
        last_known: Option<ServiceDescriptor>,
    },
}

impl DeletedService {
    pub fn last_known(&self) -> Option<&ServiceDescriptor> {
        match self {
            DeletedService::Known(service) => Some(service),
            DeletedService::FinalStateUnknown { last_known, .. } => last_known.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceEvent {
    Added(ServiceDescriptor),
    Updated(ServiceDescriptor),
    Deleted(DeletedService),
}

/// The operations the reconciler needs from the cluster.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ServiceDescriptor>, ClusterError>;

    /// Ready backend addresses of the service. No endpoints object means no backends.
    async fn backend_addresses(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Vec<String>, ClusterError>;

    async fn list_services(&self) -> Result<Vec<ServiceDescriptor>, ClusterError>;

    /// Cluster-wide stream of service changes. Reconnects are handled by the client.
    fn watch(&self) -> BoxStream<'static, ServiceEvent>;
}
