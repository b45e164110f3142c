//! Shared helpers for driving the plugin chain the way hickory's server does.
#![allow(dead_code)]

use std::{
    io,
    net::{Ipv4Addr, SocketAddr},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use hickory_proto::{
    op::{Message, MessageType, OpCode, Query},
    rr::{DNSClass, Name, RData, Record, RecordType},
    serialize::binary::{BinDecodable, BinDecoder, BinEncoder},
};
use hickory_server::{
    authority::{MessageRequest, MessageResponse},
    server::{Protocol, Request, RequestHandler, ResponseHandler, ResponseInfo},
};
use svcdns::{
    machinery::store::{DnsRecord, RecordStore, StoreError},
    resolver::{Answer, DnsQuery, Plugin, PluginChain, Resolution},
};

/// Captures the wire bytes of the response so tests can parse them back.
#[derive(Clone)]
pub struct TestResponseHandler {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl TestResponseHandler {
    pub fn new() -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::with_capacity(512))),
        }
    }

    pub fn into_message(self) -> Message {
        let buf = self.buf.lock().unwrap();
        assert!(!buf.is_empty(), "no response was captured");
        Message::from_vec(&buf).expect("failed to parse captured DNS response")
    }
}

#[async_trait]
impl ResponseHandler for TestResponseHandler {
    async fn send_response<'a>(
        &mut self,
        response: MessageResponse<
            '_,
            'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
        >,
    ) -> io::Result<ResponseInfo> {
        let mut buf = self.buf.lock().unwrap();
        buf.clear();
        let mut encoder = BinEncoder::new(&mut *buf);
        encoder.set_max_size(u16::MAX);
        response
            .destructive_emit(&mut encoder)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

/// Answers every query with the same canned answer, standing in for the next handler.
pub struct StaticPlugin(pub Answer);

#[async_trait]
impl Plugin for StaticPlugin {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn resolve(&self, _query: &DnsQuery) -> Resolution {
        Resolution::Answered(self.0.clone())
    }
}

/// A store whose backend is always down.
pub struct UnreachableStore;

#[async_trait]
impl RecordStore for UnreachableStore {
    async fn set(&self, _hostname: &str, _record: &DnsRecord) -> Result<(), StoreError> {
        Err(unreachable_error())
    }

    async fn get(&self, _hostname: &str) -> Result<Option<DnsRecord>, StoreError> {
        Err(unreachable_error())
    }

    async fn delete(&self, _hostname: &str) -> Result<(), StoreError> {
        Err(unreachable_error())
    }
}

fn unreachable_error() -> StoreError {
    StoreError::Transport(redis::RedisError::from((
        redis::ErrorKind::IoError,
        "connection refused",
    )))
}

pub fn build_query_message(name: &str, record_type: RecordType, id: u16) -> Message {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    let mut query = Query::new();
    query.set_name(Name::from_ascii(name).unwrap());
    query.set_query_type(record_type);
    query.set_query_class(DNSClass::IN);
    msg.add_query(query);
    msg
}

pub fn build_request_from(msg: &Message) -> Request {
    let bytes = msg.to_vec().unwrap();
    let mut decoder = BinDecoder::new(&bytes);
    let msg = MessageRequest::read(&mut decoder).expect("failed to parse MessageRequest");
    let src: SocketAddr = "10.1.0.1:12345".parse().unwrap();
    Request::new(msg, src, Protocol::Udp)
}

pub fn build_request(name: &str, record_type: RecordType, id: u16) -> Request {
    build_request_from(&build_query_message(name, record_type, id))
}

pub async fn execute(chain: &PluginChain, request: &Request) -> Message {
    let handler = TestResponseHandler::new();
    chain.handle_request(request, handler.clone()).await;
    handler.into_message()
}

pub async fn execute_query(
    chain: &PluginChain,
    name: &str,
    record_type: RecordType,
    id: u16,
) -> Message {
    execute(chain, &build_request(name, record_type, id)).await
}

pub fn extract_a_ips(msg: &Message) -> Vec<Ipv4Addr> {
    let mut ips = msg
        .answers()
        .iter()
        .filter_map(|r| match r.data() {
            Some(RData::A(a)) => Some(a.0),
            _ => None,
        })
        .collect::<Vec<_>>();
    ips.sort();
    ips
}

pub fn a_record(name: &str, ttl: u32, ip: Ipv4Addr) -> Record {
    Record::from_rdata(
        Name::from_ascii(name).unwrap(),
        ttl,
        RData::A(hickory_proto::rr::rdata::A(ip)),
    )
}
