use crate::dns::client::DEFAULT_DNS_TIMEOUT;
use hickory_proto::op::{Message, MessageType, ResponseCode};
use meta_dns_application::dns::{msg_to_domain, msg_to_log_string, reply_to};
use meta_dns_application::use_cases::DnsService;
use meta_dns_application::DnsContext;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Payload limit for UDP clients that did not advertise one via EDNS0.
pub const DEFAULT_UDP_PAYLOAD: usize = 512;

const HEADER_LEN: usize = 12;

/// Turns raw request bytes into raw response bytes through a [`DnsService`].
pub struct DnsServerHandler {
    service: Arc<DnsService>,
}

impl DnsServerHandler {
    pub fn new(service: Arc<DnsService>) -> Self {
        Self { service }
    }

    /// Answers one wire-format request.
    ///
    /// `udp` is true for datagram transports; those responses are cut down to
    /// the payload size the client advertised, with `TC` set. `None` means the
    /// request is dropped without an answer.
    pub async fn handle_raw(&self, bytes: &[u8], udp: bool) -> Option<Vec<u8>> {
        let request = match Message::from_vec(bytes) {
            Ok(msg) => msg,
            Err(e) => {
                if bytes.len() < HEADER_LEN {
                    debug!(len = bytes.len(), "Dropping request without a header");
                    return None;
                }
                warn!(error = %e, "Failed to parse request");
                let id = u16::from_be_bytes([bytes[0], bytes[1]]);
                return encode(&format_error(id));
            }
        };

        if request.message_type() != MessageType::Query {
            debug!(id = request.id(), "Ignoring non-query message");
            return None;
        }

        let mut response = self.handle_message(&request).await;

        if udp {
            let limit = client_payload_limit(&request);
            let bytes = encode(&response)?;
            if bytes.len() <= limit {
                return Some(bytes);
            }
            debug!(
                domain = %msg_to_domain(&request),
                size = bytes.len(),
                limit,
                "Truncating UDP response"
            );
            truncate(&mut response);
            return encode(&response);
        }

        encode(&response)
    }

    /// Decoded form of [`Self::handle_raw`]: service errors become SERVFAIL.
    pub async fn handle_message(&self, request: &Message) -> Message {
        let ctx = DnsContext::new().with_timeout(DEFAULT_DNS_TIMEOUT);
        self.handle_message_in(&ctx, request).await
    }

    /// Like [`Self::handle_message`], under a caller-supplied context. The
    /// middleware that produced the answer is left tagged on `ctx`.
    pub async fn handle_message_in(&self, ctx: &DnsContext, request: &Message) -> Message {
        match self.service.serve_msg(ctx, request).await {
            Ok(mut response) => {
                response.set_id(request.id());
                debug!(
                    domain = %msg_to_domain(request),
                    msg_type = ctx.msg_type().as_str(),
                    answer = %msg_to_log_string(&response),
                    "Query answered"
                );
                response
            }
            Err(e) => {
                error!(
                    error = %e,
                    domain = %msg_to_domain(request),
                    "Query resolution failed"
                );
                error_response(request, ResponseCode::ServFail)
            }
        }
    }
}

fn client_payload_limit(request: &Message) -> usize {
    request
        .extensions()
        .as_ref()
        .map(|edns| usize::from(edns.max_payload()))
        .unwrap_or(DEFAULT_UDP_PAYLOAD)
        .max(DEFAULT_UDP_PAYLOAD)
}

fn error_response(request: &Message, code: ResponseCode) -> Message {
    debug!(code = ?code, "Sending error response");
    let mut msg = reply_to(request);
    msg.set_response_code(code).set_recursion_available(true);
    msg
}

fn format_error(id: u16) -> Message {
    let mut msg = Message::new();
    msg.set_id(id)
        .set_message_type(MessageType::Response)
        .set_response_code(ResponseCode::FormErr);
    msg
}

fn truncate(msg: &mut Message) {
    msg.take_answers();
    msg.take_name_servers();
    msg.take_additionals();
    msg.set_truncated(true);
}

fn encode(msg: &Message) -> Option<Vec<u8>> {
    match msg.to_vec() {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            error!(error = %e, id = msg.id(), "Failed to encode response");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hickory_proto::op::{Edns, Query};
    use hickory_proto::rr::rdata::A;
    use hickory_proto::rr::{Name, RData, Record, RecordType};
    use meta_dns_application::use_cases::DnsHandler;
    use meta_dns_application::DnsMsgType;
    use meta_dns_domain::DomainError;
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    struct FixedHandler {
        answers: usize,
        fail: bool,
    }

    struct HostsHandler;

    #[async_trait]
    impl DnsHandler for HostsHandler {
        async fn handle(&self, ctx: &DnsContext, msg: &Message) -> Result<Message, DomainError> {
            ctx.set_type(DnsMsgType::Host);
            Ok(reply_to(msg))
        }
    }

    #[async_trait]
    impl DnsHandler for FixedHandler {
        async fn handle(&self, _ctx: &DnsContext, msg: &Message) -> Result<Message, DomainError> {
            if self.fail {
                return Err(DomainError::ServerFailure("upstream down".to_string()));
            }
            let mut reply = reply_to(msg);
            let name = msg.queries()[0].name().clone();
            for i in 0..self.answers {
                reply.add_answer(Record::from_rdata(
                    name.clone(),
                    60,
                    RData::A(A(Ipv4Addr::new(10, 0, (i / 256) as u8, (i % 256) as u8))),
                ));
            }
            Ok(reply)
        }
    }

    fn handler(answers: usize, fail: bool) -> DnsServerHandler {
        let service = DnsService::from_handler(Arc::new(FixedHandler { answers, fail }));
        DnsServerHandler::new(Arc::new(service))
    }

    fn request(id: u16) -> Message {
        let mut msg = Message::new();
        msg.set_id(id).set_recursion_desired(true);
        msg.add_query(Query::query(
            Name::from_str("example.com.").unwrap(),
            RecordType::A,
        ));
        msg
    }

    #[tokio::test]
    async fn test_answer_keeps_request_id() {
        let raw = request(4242).to_vec().unwrap();
        let out = handler(1, false).handle_raw(&raw, true).await.unwrap();
        let response = Message::from_vec(&out).unwrap();
        assert_eq!(response.id(), 4242);
        assert_eq!(response.answers().len(), 1);
    }

    #[tokio::test]
    async fn test_answer_keeps_producer_tag() {
        let service = DnsService::from_handler(Arc::new(HostsHandler));
        let handler = DnsServerHandler::new(Arc::new(service));
        let ctx = DnsContext::new();

        let response = handler.handle_message_in(&ctx, &request(9)).await;

        assert_eq!(response.id(), 9);
        assert_eq!(ctx.msg_type(), DnsMsgType::Host);
        assert_eq!(ctx.msg_type().as_str(), "host");
    }

    #[tokio::test]
    async fn test_service_error_becomes_servfail() {
        let raw = request(7).to_vec().unwrap();
        let out = handler(0, true).handle_raw(&raw, false).await.unwrap();
        let response = Message::from_vec(&out).unwrap();
        assert_eq!(response.id(), 7);
        assert_eq!(response.response_code(), ResponseCode::ServFail);
        assert_eq!(response.queries().len(), 1);
        assert!(response.recursion_available());
    }

    #[tokio::test]
    async fn test_garbage_after_header_gets_formerr() {
        let mut raw = vec![0x12, 0x34, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        raw.extend_from_slice(&[0x3f, 0xff]);
        let out = handler(0, false).handle_raw(&raw, true).await.unwrap();
        let response = Message::from_vec(&out).unwrap();
        assert_eq!(response.id(), 0x1234);
        assert_eq!(response.response_code(), ResponseCode::FormErr);
    }

    #[tokio::test]
    async fn test_short_packet_is_dropped() {
        assert!(handler(0, false).handle_raw(&[0x00, 0x01, 0x02], true).await.is_none());
    }

    #[tokio::test]
    async fn test_oversized_udp_response_is_truncated() {
        let raw = request(9).to_vec().unwrap();
        let h = handler(60, false);

        let udp = Message::from_vec(&h.handle_raw(&raw, true).await.unwrap()).unwrap();
        assert!(udp.truncated());
        assert!(udp.answers().is_empty());

        let tcp = Message::from_vec(&h.handle_raw(&raw, false).await.unwrap()).unwrap();
        assert!(!tcp.truncated());
        assert_eq!(tcp.answers().len(), 60);
    }

    #[tokio::test]
    async fn test_edns_payload_raises_udp_limit() {
        let mut req = request(11);
        let mut edns = Edns::new();
        edns.set_max_payload(4096);
        req.set_edns(edns);
        let raw = req.to_vec().unwrap();

        let out = handler(60, false).handle_raw(&raw, true).await.unwrap();
        let response = Message::from_vec(&out).unwrap();
        assert!(!response.truncated());
        assert_eq!(response.answers().len(), 60);
    }
}
