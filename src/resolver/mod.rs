//! Read path: answers DNS queries from an ordered chain of plugins.
//!
//! Each plugin either answers a query or declines it. The chain offers the query to every
//! plugin in order and sends the first answer. When all decline the client gets REFUSED, so
//! a stub resolver moves on to its next server instead of caching a negative answer.

pub mod config;
mod forward;
mod handler;
mod store;

pub use forward::ForwardPlugin;
pub use store::StorePlugin;

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Result, bail};
use async_trait::async_trait;
use hickory_proto::{
    op::ResponseCode,
    rr::{Name, Record, RecordType},
};
use hickory_server::ServerFuture;
use tokio::{
    net::{TcpListener, UdpSocket},
    spawn,
    sync::Mutex,
    task::JoinHandle,
};
use tracing::{debug, error, info};

use crate::resolver::config::DnsServerConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuery {
    pub name: Name,
    pub query_type: RecordType,
}

impl DnsQuery {
    pub fn new(name: Name, query_type: RecordType) -> Self {
        Self { name, query_type }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub response_code: ResponseCode,
    pub authoritative: bool,
    pub answers: Vec<Record>,
}

impl Answer {
    pub fn authoritative(answers: Vec<Record>) -> Self {
        Self {
            response_code: ResponseCode::NoError,
            authoritative: true,
            answers,
        }
    }

    pub fn forwarded(answers: Vec<Record>) -> Self {
        Self {
            response_code: ResponseCode::NoError,
            authoritative: false,
            answers,
        }
    }

    pub fn empty(response_code: ResponseCode) -> Self {
        Self {
            response_code,
            authoritative: false,
            answers: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Answered(Answer),
    /// Not this plugin's call; the next plugin gets the query.
    Declined,
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve(&self, query: &DnsQuery) -> Resolution;
}

#[derive(Clone, Default)]
pub struct PluginChain {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub async fn resolve(&self, query: &DnsQuery) -> Answer {
        for plugin in &self.plugins {
            if let Resolution::Answered(answer) = plugin.resolve(query).await {
                debug!(
                    plugin = plugin.name(),
                    answers = answer.answers.len(),
                    "answered {} {:?}",
                    query.name,
                    query.query_type
                );
                return answer;
            }
        }

        debug!("no plugin answered {} {:?}", query.name, query.query_type);
        Answer::empty(ResponseCode::Refused)
    }
}

pub struct DnsServer {
    config: DnsServerConfig,
    chain: PluginChain,
    server_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl DnsServer {
    pub fn new(config: DnsServerConfig, chain: PluginChain) -> Arc<Self> {
        Arc::new(Self {
            config,
            chain,
            server_task: Arc::new(Mutex::new(None)),
        })
    }

    /// Binds UDP and TCP and starts serving. Returns the bound address.
    pub async fn start(&self) -> Result<SocketAddr> {
        let mut server_task = self.server_task.lock().await;
        if server_task.is_some() {
            bail!("DNS server already running");
        }

        let bind_addr = self.config.bind_address.parse::<SocketAddr>()?;
        info!("Starting DNS server on {}", bind_addr);

        let udp = UdpSocket::bind(bind_addr).await?;
        // same port for TCP, also when the configured port was 0
        let local_addr = udp.local_addr()?;
        let tcp = TcpListener::bind(local_addr).await?;

        let mut server = ServerFuture::new(self.chain.clone());
        server.register_socket(udp);
        server.register_listener(tcp, self.config.tcp_timeout);

        let task = spawn(async move {
            match server.block_until_done().await {
                Ok(_) => info!("DNS server stopped"),
                Err(e) => error!("DNS server error: {}", e),
            }
        });

        *server_task = Some(task);
        info!(
            "DNS server started on {} with {} plugins",
            local_addr,
            self.chain.len()
        );

        Ok(local_addr)
    }

    pub async fn stop(&self) -> Result<()> {
        let mut server_task = self.server_task.lock().await;
        if let Some(task) = server_task.take() {
            info!("Stopping DNS server");
            task.abort();
        }
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.server_task.lock().await.is_some()
    }
}
