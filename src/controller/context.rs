use std::{fmt, sync::Arc};

use crate::{
    cluster::{ClusterClient, DeletedService, ServiceDescriptor, ServiceEvent},
    machinery::store::RecordStore,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ControllerKey {
    pub namespace: String,
    pub name: String,
}

impl ControllerKey {
    pub fn new(namespace: impl AsRef<str>, name: impl AsRef<str>) -> Self {
        Self {
            namespace: namespace.as_ref().to_string(),
            name: name.as_ref().to_string(),
        }
    }
}

impl From<&ServiceDescriptor> for ControllerKey {
    fn from(service: &ServiceDescriptor) -> Self {
        Self::new(&service.namespace, &service.name)
    }
}

impl fmt::Display for ControllerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Clone)]
pub struct ControllerContext {
    pub store: Arc<dyn RecordStore>,
    pub cluster: Arc<dyn ClusterClient>,
}

impl ControllerContext {
    pub fn new(store: Arc<dyn RecordStore>, cluster: Arc<dyn ClusterClient>) -> Self {
        Self { store, cluster }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// A service was added or updated. Both are handled the same way.
    ServiceChange(ServiceDescriptor),
    ServiceDeleted(DeletedService),
}

impl From<ServiceEvent> for ControllerEvent {
    fn from(event: ServiceEvent) -> Self {
        match event {
            ServiceEvent::Added(service) | ServiceEvent::Updated(service) => {
                Self::ServiceChange(service)
            }
            ServiceEvent::Deleted(deleted) => Self::ServiceDeleted(deleted),
        }
    }
}
