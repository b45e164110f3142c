use hickory_proto::{
    op::{Header, MessageType, OpCode, ResponseCode},
    rr::Name,
};
use hickory_server::{
    authority::MessageResponseBuilder,
    server::{Request, RequestHandler, ResponseHandler, ResponseInfo},
};
use tracing::{debug, warn};

use super::{DnsQuery, PluginChain};

#[async_trait::async_trait]
impl RequestHandler for PluginChain {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> ResponseInfo {
        let response = MessageResponseBuilder::from_message_request(request);

        let sent = if request.message_type() == MessageType::Query
            && request.op_code() == OpCode::Query
        {
            let info = request.request_info();
            let query = DnsQuery::new(Name::from(info.query.name().clone()), info.query.query_type());
            debug!("DNS query from {}: {} {:?}", request.src(), query.name, query.query_type);

            let answer = self.resolve(&query).await;

            let mut header = Header::response_from_request(request.header());
            header.set_authoritative(answer.authoritative);
            header.set_response_code(answer.response_code);

            let response_message = response.build(header, answer.answers.iter(), &[], &[], &[]);
            response_handle.send_response(response_message).await
        } else {
            let response_message = response.error_msg(request.header(), ResponseCode::NotImp);
            response_handle.send_response(response_message).await
        };

        match sent {
            Ok(info) => info,
            Err(e) => {
                warn!("Error sending DNS response: {}", e);
                let mut header = Header::new();
                header.set_response_code(ResponseCode::ServFail);
                header.into()
            }
        }
    }
}
