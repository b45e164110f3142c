use std::{net::SocketAddr, time::Duration};

use async_trait::async_trait;
use hickory_resolver::{
    TokioAsyncResolver,
    config::{NameServerConfig, NameServerConfigGroup, Protocol, ResolverConfig, ResolverOpts},
    error::ResolveErrorKind,
};
use tracing::{debug, warn};

use super::{Answer, DnsQuery, Plugin, Resolution};

/// Hands queries to upstream nameservers. Meant as the last link of the chain.
pub struct ForwardPlugin {
    resolver: TokioAsyncResolver,
}

impl ForwardPlugin {
    pub fn new(upstreams: &[SocketAddr], timeout: Duration) -> Self {
        let name_servers = upstreams
            .iter()
            .flat_map(|addr| {
                [
                    NameServerConfig::new(*addr, Protocol::Udp),
                    NameServerConfig::new(*addr, Protocol::Tcp),
                ]
            })
            .collect::<Vec<_>>();

        let config = ResolverConfig::from_parts(None, vec![], NameServerConfigGroup::from(name_servers));

        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.attempts = 1;
        // the upstream owns caching
        opts.cache_size = 0;

        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
        }
    }
}

#[async_trait]
impl Plugin for ForwardPlugin {
    fn name(&self) -> &'static str {
        "forward"
    }

    async fn resolve(&self, query: &DnsQuery) -> Resolution {
        match self
            .resolver
            .lookup(query.name.clone(), query.query_type)
            .await
        {
            Ok(lookup) => {
                debug!("upstream answered {} with {} records", query.name, lookup.records().len());
                Resolution::Answered(Answer::forwarded(lookup.records().to_vec()))
            }
            Err(e) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { response_code, .. } => {
                    debug!("upstream has no records for {}: {}", query.name, response_code);
                    Resolution::Answered(Answer::empty(*response_code))
                }
                _ => {
                    warn!("upstream lookup failed for {}: {}", query.name, e);
                    Resolution::Declined
                }
            },
        }
    }
}
