use std::{net::Ipv4Addr, sync::Arc};

use async_trait::async_trait;
use hickory_proto::rr::{RData, Record, RecordType, rdata::A};
use tracing::{debug, error, warn};

use crate::machinery::store::RecordStore;

use super::{Answer, DnsQuery, Plugin, Resolution};

/// Answers A queries from the record store and declines everything it is unsure about.
pub struct StorePlugin {
    store: Arc<dyn RecordStore>,
    default_ttl: u32,
}

impl StorePlugin {
    pub fn new(store: Arc<dyn RecordStore>, default_ttl: u32) -> Self {
        Self { store, default_ttl }
    }
}

#[async_trait]
impl Plugin for StorePlugin {
    fn name(&self) -> &'static str {
        "store"
    }

    async fn resolve(&self, query: &DnsQuery) -> Resolution {
        if query.query_type != RecordType::A {
            debug!("skipping non-A query for {}", query.name);
            return Resolution::Declined;
        }

        let qname = query.name.to_string();
        let record = match self.store.get(&qname).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("no DNS record found for {}", qname);
                return Resolution::Declined;
            }
            Err(e) => {
                error!("record store lookup failed for {}: {}", qname, e);
                return Resolution::Declined;
            }
        };

        if !record.has_addresses() {
            debug!("record for {} has no addresses", qname);
            return Resolution::Declined;
        }

        let ttl = if record.ttl == 0 {
            self.default_ttl
        } else {
            record.ttl
        };

        let answers = record
            .ips
            .iter()
            .filter_map(|ip| match ip.trim().parse::<Ipv4Addr>() {
                Ok(ip) => Some(Record::from_rdata(query.name.clone(), ttl, RData::A(A(ip)))),
                Err(e) => {
                    warn!("skipping invalid address {:?} for {}: {}", ip, qname, e);
                    None
                }
            })
            .collect::<Vec<_>>();

        if answers.is_empty() {
            warn!("no valid addresses in record for {}", qname);
            return Resolution::Declined;
        }

        debug!("returning {} answers for {}", answers.len(), qname);
        Resolution::Answered(Answer::authoritative(answers))
    }
}

#[cfg(test)]
mod tests {
    use std::{str::FromStr, time::Duration};

    use hickory_proto::{op::ResponseCode, rr::Name};

    use super::*;
    use crate::{
        machinery::store::{DnsRecord, MemoryStore, RecordMetadata, TimeoutStore},
        testing::{FailingStore, StallingStore},
    };

    fn query(name: &str, query_type: RecordType) -> DnsQuery {
        DnsQuery::new(Name::from_str(name).unwrap(), query_type)
    }

    async fn plugin_with(hostname: &str, ips: &[&str], ttl: u32) -> StorePlugin {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                hostname,
                &DnsRecord::new(
                    ips.iter().map(|ip| ip.to_string()).collect(),
                    ttl,
                    RecordMetadata::default(),
                ),
            )
            .await
            .unwrap();

        StorePlugin::new(store, 3600)
    }

    fn addresses(answer: &Answer) -> Vec<Ipv4Addr> {
        let mut ips = answer
            .answers
            .iter()
            .filter_map(|record| match record.data() {
                Some(RData::A(a)) => Some(a.0),
                _ => None,
            })
            .collect::<Vec<_>>();
        ips.sort();
        ips
    }

    #[tokio::test]
    async fn test_answers_every_address_with_record_ttl() {
        let plugin = plugin_with("a.example.com", &["10.0.0.1", "10.0.0.2"], 10).await;

        let Resolution::Answered(answer) =
            plugin.resolve(&query("a.example.com.", RecordType::A)).await
        else {
            panic!("expected an answer");
        };

        assert!(answer.authoritative);
        assert_eq!(answer.response_code, ResponseCode::NoError);
        assert_eq!(
            addresses(&answer),
            vec![Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)]
        );
        assert!(answer.answers.iter().all(|record| record.ttl() == 10));
        assert!(
            answer
                .answers
                .iter()
                .all(|record| record.name().to_string() == "a.example.com.")
        );
    }

    #[tokio::test]
    async fn test_missing_ttl_uses_default() {
        let store = Arc::new(MemoryStore::new());
        store.put_raw(
            "dns:a.example.com",
            r#"{"ips":["10.0.0.1"],"updated_at":"2024-05-01T12:00:00Z"}"#,
            Duration::from_secs(60),
        );
        let plugin = StorePlugin::new(store, 3600);

        let Resolution::Answered(answer) =
            plugin.resolve(&query("a.example.com.", RecordType::A)).await
        else {
            panic!("expected an answer");
        };
        assert_eq!(answer.answers[0].ttl(), 3600);
    }

    #[tokio::test]
    async fn test_declines_non_a_queries() {
        let plugin = plugin_with("a.example.com", &["10.0.0.1"], 10).await;

        for query_type in [RecordType::AAAA, RecordType::MX, RecordType::TXT] {
            assert_eq!(
                plugin.resolve(&query("a.example.com.", query_type)).await,
                Resolution::Declined
            );
        }
    }

    #[tokio::test]
    async fn test_declines_unknown_and_empty_records() {
        let plugin = plugin_with("a.example.com", &[], 10).await;

        assert_eq!(
            plugin.resolve(&query("a.example.com.", RecordType::A)).await,
            Resolution::Declined
        );
        assert_eq!(
            plugin.resolve(&query("b.example.com.", RecordType::A)).await,
            Resolution::Declined
        );
    }

    #[tokio::test]
    async fn test_declines_on_store_errors() {
        let plugin = StorePlugin::new(Arc::new(FailingStore), 3600);

        assert_eq!(
            plugin.resolve(&query("a.example.com.", RecordType::A)).await,
            Resolution::Declined
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_declines_when_store_stalls() {
        let store = TimeoutStore::new(StallingStore, Duration::from_secs(2));
        let plugin = StorePlugin::new(Arc::new(store), 3600);

        let started = tokio::time::Instant::now();
        let resolution = plugin.resolve(&query("a.example.com.", RecordType::A)).await;

        assert_eq!(resolution, Resolution::Declined);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_declines_malformed_records() {
        let store = Arc::new(MemoryStore::new());
        store.put_raw("dns:a.example.com", "{\"ips\": 42", Duration::from_secs(60));
        let plugin = StorePlugin::new(store, 3600);

        assert_eq!(
            plugin.resolve(&query("a.example.com.", RecordType::A)).await,
            Resolution::Declined
        );
    }

    #[tokio::test]
    async fn test_skips_invalid_addresses() {
        let plugin = plugin_with("a.example.com", &["10.0.0.1", "not-an-ip", "fd00::1"], 10).await;

        let Resolution::Answered(answer) =
            plugin.resolve(&query("a.example.com.", RecordType::A)).await
        else {
            panic!("expected an answer");
        };
        assert_eq!(addresses(&answer), vec![Ipv4Addr::new(10, 0, 0, 1)]);
    }

    #[tokio::test]
    async fn test_declines_when_no_address_is_valid() {
        let plugin = plugin_with("a.example.com", &["not-an-ip", "fd00::1"], 10).await;

        assert_eq!(
            plugin.resolve(&query("a.example.com.", RecordType::A)).await,
            Resolution::Declined
        );
    }
}
