use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use futures_util::{StreamExt, stream::BoxStream};
use k8s_openapi::api::core::v1::{Endpoints, Service};
use kube::{
    Api, Client, ResourceExt,
    api::ListParams,
    runtime::{WatchStreamExt, watcher},
};
use tracing::{debug, info, warn};

use super::{ClusterClient, ClusterError, DeletedService, ServiceDescriptor, ServiceEvent};

fn descriptor_from_service(service: &Service) -> ServiceDescriptor {
    ServiceDescriptor {
        namespace: service.namespace().unwrap_or_default(),
        name: service.name_any(),
        annotations: service.annotations().clone(),
    }
}

fn cache_key(service: &ServiceDescriptor) -> String {
    format!("{}/{}", service.namespace, service.name)
}

/// Last-known state of every watched service.
///
/// Turns raw watcher events into add/update/delete events. Services that vanish while the
/// watcher relists never get a delete event of their own, so they are reported as
/// [`DeletedService::FinalStateUnknown`] carrying the cached state once the relist is done.
#[derive(Default)]
pub struct WatchCache {
    services: HashMap<String, ServiceDescriptor>,
    relist_seen: Option<HashSet<String>>,
}

impl WatchCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn apply(&mut self, event: watcher::Event<Service>) -> Vec<ServiceEvent> {
        match event {
            watcher::Event::Init => {
                debug!("service watch relist started");
                self.relist_seen = Some(HashSet::new());
                vec![]
            }
            watcher::Event::InitApply(service) => {
                let service = descriptor_from_service(&service);
                if let Some(seen) = self.relist_seen.as_mut() {
                    seen.insert(cache_key(&service));
                }
                vec![self.upsert(service)]
            }
            watcher::Event::InitDone => {
                let Some(seen) = self.relist_seen.take() else {
                    return vec![];
                };

                let gone = self
                    .services
                    .keys()
                    .filter(|key| !seen.contains(*key))
                    .cloned()
                    .collect::<Vec<_>>();

                gone.into_iter()
                    .filter_map(|key| self.services.remove(&key))
                    .map(|service| {
                        info!(
                            namespace = %service.namespace,
                            name = %service.name,
                            "service disappeared during relist"
                        );
                        ServiceEvent::Deleted(DeletedService::FinalStateUnknown {
                            namespace: service.namespace.clone(),
                            name: service.name.clone(),
                            last_known: Some(service),
                        })
                    })
                    .collect()
            }
            watcher::Event::Apply(service) => vec![self.upsert(descriptor_from_service(&service))],
            watcher::Event::Delete(service) => {
                let service = descriptor_from_service(&service);
                self.services.remove(&cache_key(&service));
                vec![ServiceEvent::Deleted(DeletedService::Known(service))]
            }
        }
    }

    fn upsert(&mut self, service: ServiceDescriptor) -> ServiceEvent {
        match self.services.insert(cache_key(&service), service.clone()) {
            Some(_) => ServiceEvent::Updated(service),
            None => ServiceEvent::Added(service),
        }
    }
}

pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// In-cluster config, falling back to the local kubeconfig.
    pub async fn try_default() -> Result<Self, ClusterError> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ServiceDescriptor>, ClusterError> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let service = api.get_opt(name).await?;

        Ok(service.as_ref().map(descriptor_from_service))
    }

    async fn backend_addresses(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Vec<String>, ClusterError> {
        let api: Api<Endpoints> = Api::namespaced(self.client.clone(), namespace);
        let Some(endpoints) = api.get_opt(name).await? else {
            return Ok(vec![]);
        };

        let ips = endpoints
            .subsets
            .unwrap_or_default()
            .into_iter()
            .flat_map(|subset| subset.addresses.unwrap_or_default())
            .map(|address| address.ip)
            .collect();

        Ok(ips)
    }

    async fn list_services(&self) -> Result<Vec<ServiceDescriptor>, ClusterError> {
        let api: Api<Service> = Api::all(self.client.clone());
        let services = api.list(&ListParams::default()).await?;

        Ok(services.items.iter().map(descriptor_from_service).collect())
    }

    fn watch(&self) -> BoxStream<'static, ServiceEvent> {
        let api: Api<Service> = Api::all(self.client.clone());
        let (tx, rx) = async_channel::unbounded();

        tokio::spawn(async move {
            let mut cache = WatchCache::new();
            let mut events = watcher(api, watcher::Config::default())
                .default_backoff()
                .boxed();

            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("service watch error: {}", e);
                        continue;
                    }
                };

                for event in cache.apply(event) {
                    if tx.send(event).await.is_err() {
                        debug!("service watch receiver dropped");
                        return;
                    }
                }
            }
        });

        rx.boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use super::*;
    use crate::constants::{ANNOTATION_ENABLED, ANNOTATION_HOSTNAME};

    fn service(name: &str, hostname: Option<&str>) -> Service {
        let annotations = hostname.map(|hostname| {
            BTreeMap::from([
                (ANNOTATION_ENABLED.to_string(), "true".to_string()),
                (ANNOTATION_HOSTNAME.to_string(), hostname.to_string()),
            ])
        });

        Service {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                annotations,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_apply_distinguishes_add_and_update() {
        let mut cache = WatchCache::new();

        let events = cache.apply(watcher::Event::Apply(service("svc-a", None)));
        assert!(matches!(events.as_slice(), [ServiceEvent::Added(_)]));

        let events = cache.apply(watcher::Event::Apply(service(
            "svc-a",
            Some("a.example.com"),
        )));
        match events.as_slice() {
            [ServiceEvent::Updated(service)] => {
                assert_eq!(service.hostname().as_deref(), Some("a.example.com"))
            }
            other => panic!("unexpected events: {other:?}"),
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_delete_carries_object() {
        let mut cache = WatchCache::new();
        cache.apply(watcher::Event::Apply(service("svc-a", Some("a.example.com"))));

        let events = cache.apply(watcher::Event::Delete(service(
            "svc-a",
            Some("a.example.com"),
        )));
        match events.as_slice() {
            [ServiceEvent::Deleted(DeletedService::Known(service))] => {
                assert_eq!(service.name, "svc-a")
            }
            other => panic!("unexpected events: {other:?}"),
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn test_relist_reports_vanished_services_with_last_known_state() {
        let mut cache = WatchCache::new();
        cache.apply(watcher::Event::Apply(service("svc-a", Some("a.example.com"))));
        cache.apply(watcher::Event::Apply(service("svc-b", Some("b.example.com"))));

        assert!(cache.apply(watcher::Event::Init).is_empty());
        let events = cache.apply(watcher::Event::InitApply(service(
            "svc-b",
            Some("b.example.com"),
        )));
        assert!(matches!(events.as_slice(), [ServiceEvent::Updated(_)]));

        let events = cache.apply(watcher::Event::InitDone);
        match events.as_slice() {
            [ServiceEvent::Deleted(deleted @ DeletedService::FinalStateUnknown { name, .. })] => {
                assert_eq!(name, "svc-a");
                assert_eq!(
                    deleted.last_known().and_then(|s| s.hostname()).as_deref(),
                    Some("a.example.com")
                );
            }
            other => panic!("unexpected events: {other:?}"),
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_init_done_without_init_is_ignored() {
        let mut cache = WatchCache::new();
        cache.apply(watcher::Event::Apply(service("svc-a", None)));

        assert!(cache.apply(watcher::Event::InitDone).is_empty());
        assert_eq!(cache.len(), 1);
    }
}
