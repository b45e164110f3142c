use ::redis::{AsyncCommands, Client, aio::ConnectionManager};
use async_trait::async_trait;
use tracing::{debug, info};

use super::{
    DnsRecord, RecordKeys, RecordStore, StoreConfig, StoreError, TimeoutStore,
    timeout::with_deadline,
};

pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    /// Connects and pings the server. Failing here is a startup failure.
    ///
    /// The store comes back wrapped in the configured per-call deadline, since the
    /// connection manager never gives up on a peer that stops answering.
    pub async fn connect(config: &StoreConfig) -> Result<TimeoutStore<Self>, StoreError> {
        let url = config.connection_url()?;
        let client = Client::open(url.as_str())?;

        let (connection, pong) = with_deadline(config.timeout, async {
            let mut connection = ConnectionManager::new(client).await?;
            let pong: String = ::redis::cmd("PING").query_async(&mut connection).await?;
            Ok::<_, StoreError>((connection, pong))
        })
        .await?;

        info!(
            host = url.host_str().unwrap_or_default(),
            tls = url.scheme() == "rediss",
            "connected to record store ({})",
            pong
        );

        Ok(TimeoutStore::new(Self { connection }, config.timeout))
    }
}

#[async_trait]
impl RecordStore for RedisStore {
    async fn set(&self, hostname: &str, record: &DnsRecord) -> Result<(), StoreError> {
        let keys = RecordKeys::for_hostname(hostname);
        let payload = record.encode()?;
        let expiry = record.expiry_secs();

        let mut pipe = ::redis::pipe();
        pipe.atomic()
            .set_ex(&keys.canonical, &payload, expiry)
            .ignore()
            .set_ex(&keys.fqdn, &payload, expiry)
            .ignore();

        let mut connection = self.connection.clone();
        pipe.query_async::<_, ()>(&mut connection).await?;

        debug!(key = %keys.canonical, expiry, "wrote record");
        Ok(())
    }

    async fn get(&self, hostname: &str) -> Result<Option<DnsRecord>, StoreError> {
        let keys = RecordKeys::for_hostname(hostname);

        let mut connection = self.connection.clone();
        let payload: Option<String> = connection.get(&keys.canonical).await?;

        payload
            .map(|payload| DnsRecord::decode(&keys.canonical, &payload))
            .transpose()
    }

    async fn delete(&self, hostname: &str) -> Result<(), StoreError> {
        let keys = RecordKeys::for_hostname(hostname);

        let mut connection = self.connection.clone();
        let removed: usize = connection.del(keys.both().to_vec()).await?;

        debug!(key = %keys.canonical, removed, "deleted record");
        Ok(())
    }
}
