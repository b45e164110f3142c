use std::sync::atomic::{AtomicBool, Ordering};

use async_channel::{Receiver, Sender};
use async_trait::async_trait;
use futures_util::{StreamExt, stream::BoxStream};
use papaya::HashMap;

use super::{ClusterClient, ClusterError, DeletedService, ServiceDescriptor, ServiceEvent};

fn key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

/// In-process cluster: services, their backend addresses and a watch channel.
pub struct MemoryCluster {
    services: HashMap<String, ServiceDescriptor>,
    endpoints: HashMap<String, Vec<String>>,
    unavailable: AtomicBool,
    tx: Sender<ServiceEvent>,
    rx: Receiver<ServiceEvent>,
}

impl Default for MemoryCluster {
    fn default() -> Self {
        let (tx, rx) = async_channel::unbounded();

        Self {
            services: HashMap::new(),
            endpoints: HashMap::new(),
            unavailable: AtomicBool::new(false),
            tx,
            rx,
        }
    }
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a service and emit the matching watch event.
    pub fn apply_service(&self, service: ServiceDescriptor) {
        let previous = self
            .services
            .pin()
            .insert(key(&service.namespace, &service.name), service.clone())
            .is_some();

        let event = if previous {
            ServiceEvent::Updated(service)
        } else {
            ServiceEvent::Added(service)
        };
        self.emit(event);
    }

    /// Create or replace a service without telling watchers, like a missed watch event.
    pub fn insert_service(&self, service: ServiceDescriptor) {
        self.services
            .pin()
            .insert(key(&service.namespace, &service.name), service);
    }

    pub fn delete_service(&self, namespace: &str, name: &str) {
        let removed = self.services.pin().remove(&key(namespace, name)).cloned();
        self.endpoints.pin().remove(&key(namespace, name));

        if let Some(service) = removed {
            self.emit(ServiceEvent::Deleted(DeletedService::Known(service)));
        }
    }

    pub fn set_backends(&self, namespace: &str, name: &str, ips: &[&str]) {
        self.endpoints.pin().insert(
            key(namespace, name),
            ips.iter().map(|ip| ip.to_string()).collect(),
        );
    }

    /// Make every read fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn emit(&self, event: ServiceEvent) {
        // unbounded, only fails once every receiver is gone
        self.tx.try_send(event).ok();
    }

    fn check_available(&self) -> Result<(), ClusterError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ClusterError::Unavailable("memory cluster offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterClient for MemoryCluster {
    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ServiceDescriptor>, ClusterError> {
        self.check_available()?;
        Ok(self.services.pin().get(&key(namespace, name)).cloned())
    }

    async fn backend_addresses(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Vec<String>, ClusterError> {
        self.check_available()?;
        Ok(self
            .endpoints
            .pin()
            .get(&key(namespace, name))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_services(&self) -> Result<Vec<ServiceDescriptor>, ClusterError> {
        self.check_available()?;
        Ok(self.services.pin().values().cloned().collect())
    }

    fn watch(&self) -> BoxStream<'static, ServiceEvent> {
        self.rx.clone().boxed()
    }
}
