use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::{
    cluster::{DeletedService, DnsTarget},
    constants::DEFAULT_RECORD_TTL_SECS,
    controller::{
        Controller, ReconcileNext,
        context::{ControllerContext, ControllerEvent, ControllerKey},
    },
    machinery::store::{DnsRecord, RecordMetadata},
};

/// Publishes the backend addresses of annotated services as DNS records.
pub struct ServiceDnsController {
    record_ttl: u32,
}

impl Default for ServiceDnsController {
    fn default() -> Self {
        Self {
            record_ttl: DEFAULT_RECORD_TTL_SECS,
        }
    }
}

impl ServiceDnsController {
    /// Records live at least one second; a zero TTL would be answered with the resolver default.
    pub fn new(record_ttl: u32) -> Self {
        Self {
            record_ttl: record_ttl.max(1),
        }
    }

    pub fn new_boxed(record_ttl: u32) -> Box<Self> {
        Box::new(Self::new(record_ttl))
    }

    /// Explicit delete on teardown. Without a last-known state the record is left to expire.
    async fn handle_delete(&self, ctx: &ControllerContext, deleted: &DeletedService) {
        let Some(service) = deleted.last_known() else {
            info!(
                "deleted service has no last known state, leaving its record to expire: {:?}",
                deleted
            );
            return;
        };

        let DnsTarget::Enabled(hostname) = service.dns_target() else {
            return;
        };

        match ctx.store.delete(&hostname).await {
            Ok(()) => info!(
                "deleted DNS record for {} after deletion of {}/{}",
                hostname, service.namespace, service.name
            ),
            Err(e) => error!("failed to delete DNS record for {}: {}", hostname, e),
        }
    }
}

#[async_trait]
impl Controller for ServiceDnsController {
    async fn schedule(
        &self,
        ctx: ControllerContext,
        event: ControllerEvent,
    ) -> Result<Option<ControllerKey>> {
        match event {
            ControllerEvent::ServiceChange(service) => Ok(Some(ControllerKey::from(&service))),
            ControllerEvent::ServiceDeleted(deleted) => {
                self.handle_delete(&ctx, &deleted).await;
                Ok(None)
            }
        }
    }

    async fn resync(&self, ctx: ControllerContext) -> Result<Vec<ControllerKey>> {
        let services = ctx
            .cluster
            .list_services()
            .await
            .context("failed to list services")?;

        Ok(services
            .iter()
            .filter(|service| matches!(service.dns_target(), DnsTarget::Enabled(_)))
            .map(ControllerKey::from)
            .collect())
    }

    async fn reconcile(&self, ctx: ControllerContext, key: ControllerKey) -> Result<ReconcileNext> {
        let Some(service) = ctx
            .cluster
            .get_service(&key.namespace, &key.name)
            .await
            .with_context(|| format!("failed to fetch service {}", key))?
        else {
            // gone; the delete event owns cleanup
            debug!("service {} no longer exists", key);
            return Ok(ReconcileNext::done());
        };

        let hostname = match service.dns_target() {
            DnsTarget::Disabled => return Ok(ReconcileNext::done()),
            DnsTarget::MissingHostname => {
                warn!("service {} is enabled but has no hostname, skipping", key);
                return Ok(ReconcileNext::done());
            }
            DnsTarget::Enabled(hostname) => hostname,
        };

        let ips = ctx
            .cluster
            .backend_addresses(&key.namespace, &key.name)
            .await
            .with_context(|| format!("failed to fetch endpoints for {}", key))?;

        let record = DnsRecord::new(
            ips,
            self.record_ttl,
            RecordMetadata {
                namespace: key.namespace.clone(),
                service: key.name.clone(),
            },
        );

        ctx.store
            .set(&hostname, &record)
            .await
            .with_context(|| format!("failed to write DNS record for {}", hostname))?;

        info!("updated DNS record for {} with IPs: {:?}", hostname, record.ips);
        Ok(ReconcileNext::done())
    }

    async fn handle_error(
        &self,
        _ctx: ControllerContext,
        key: ControllerKey,
        error: anyhow::Error,
    ) -> ReconcileNext {
        error!("error syncing service {}: {:#}", key, error);
        ReconcileNext::backoff()
    }
}
