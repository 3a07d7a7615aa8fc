use async_trait::async_trait;
use hickory_proto::op::{Message, ResponseCode};
use meta_dns_application::dns::reply_to;
use meta_dns_application::ports::{ClientKind, DnsClient};
use meta_dns_domain::DomainError;

/// `rcode://<name>`: answers every query locally with a fixed response code.
#[derive(Debug, Clone)]
pub struct RCodeClient {
    name: String,
    rcode: ResponseCode,
}

impl RCodeClient {
    pub fn new(name: &str) -> Result<Self, DomainError> {
        let rcode = match name {
            "success" => ResponseCode::NoError,
            "format_error" => ResponseCode::FormErr,
            "server_failure" => ResponseCode::ServFail,
            "name_error" => ResponseCode::NXDomain,
            "not_implemented" => ResponseCode::NotImp,
            "refused" => ResponseCode::Refused,
            other => {
                return Err(DomainError::InvalidNameServer(format!(
                    "unknown rcode '{}'",
                    other
                )))
            }
        };
        Ok(Self {
            name: name.to_string(),
            rcode,
        })
    }

    pub fn rcode(&self) -> ResponseCode {
        self.rcode
    }
}

#[async_trait]
impl DnsClient for RCodeClient {
    async fn exchange(&self, msg: &Message) -> Result<Message, DomainError> {
        let mut reply = reply_to(msg);
        reply.set_response_code(self.rcode);
        Ok(reply)
    }

    fn address(&self) -> String {
        format!("rcode://{}", self.name)
    }

    fn kind(&self) -> ClientKind {
        ClientKind::RCode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::Query;
    use hickory_proto::rr::{Name, RecordType};

    #[tokio::test]
    async fn test_answers_with_configured_code() {
        let client = RCodeClient::new("name_error").unwrap();
        let mut query = Message::new();
        query.set_id(77);
        query.add_query(Query::query(
            Name::from_ascii("blocked.example.").unwrap(),
            RecordType::A,
        ));

        let reply = client.exchange(&query).await.unwrap();
        assert_eq!(reply.id(), 77);
        assert_eq!(reply.response_code(), ResponseCode::NXDomain);
        assert!(reply.answers().is_empty());
        assert!(client.is_short_circuit());
        assert_eq!(client.address(), "rcode://name_error");
    }

    #[test]
    fn test_rejects_unknown_code() {
        assert!(RCodeClient::new("teapot").is_err());
    }
}
