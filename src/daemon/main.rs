mod cmd;
mod config;

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use svcdns::{
    cluster::KubeCluster,
    controller::{context::ControllerContext, scheduler::Scheduler, service::ServiceDnsController},
    machinery::store::{RecordStore, RedisStore},
    resolver::{DnsServer, ForwardPlugin, PluginChain, StorePlugin},
    utils::tracing::init_tracing,
};
use tokio::{signal, sync::watch, task::JoinHandle};
use tracing::{error, info};

use crate::{cmd::Cli, config::Config};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::load(cli.config_path).await?;
    init_tracing(config.log_level.as_deref());

    if let Some(path) = &config.config_path {
        info!("Loaded config from {}", path.display());
    }

    let store: Arc<dyn RecordStore> = Arc::new(
        RedisStore::connect(&config.store_config)
            .await
            .context("Failed to connect to the record store")?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut reconciler: Option<JoinHandle<Result<()>>> = None;
    let mut dns_server = None;

    if cli.command.runs_controller() {
        let cluster = KubeCluster::try_default()
            .await
            .context("Failed to create the cluster client")?;

        let scheduler = Arc::new(Scheduler::new(
            ControllerContext::new(store.clone(), Arc::new(cluster)),
            config.controller_config.scheduler_config(),
            vec![ServiceDnsController::new_boxed(
                config.controller_config.record_ttl,
            )],
        ));

        reconciler = Some(tokio::spawn(scheduler.run(shutdown_rx.clone())));
    }

    if cli.command.runs_resolver() {
        let dns_config = config.dns_config.clone();

        let mut chain =
            PluginChain::new().with(StorePlugin::new(store.clone(), dns_config.default_ttl));
        if !dns_config.upstreams.is_empty() {
            info!("Forwarding unanswered queries to {:?}", dns_config.upstreams);
            chain = chain.with(ForwardPlugin::new(
                &dns_config.upstreams,
                dns_config.upstream_timeout,
            ));
        }

        let server = DnsServer::new(dns_config, chain);
        server.start().await?;
        dns_server = Some(server);
    }

    signal::ctrl_c()
        .await
        .map_err(|e| anyhow!("Failed to listen for shutdown signal: {}", e))?;
    info!("Shutdown requested");

    shutdown_tx.send(true).ok();

    if let Some(server) = dns_server {
        server.stop().await?;
    }

    if let Some(reconciler) = reconciler {
        match reconciler.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Reconciler failed: {}", e),
            Err(e) => error!("Reconciler task panicked: {}", e),
        }
    }

    info!("Shutdown complete");
    Ok(())
}
