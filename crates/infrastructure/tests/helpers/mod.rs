mod clients;
mod dns_server_mock;

pub use clients::*;
pub use dns_server_mock::*;

/// hickory-proto 0.24 has no accessor for `ClientSubnet::source_prefix`;
/// read it from the wire encoding (FAMILY u16, SOURCE PREFIX-LENGTH u8, ...).
pub trait ClientSubnetExt {
    fn source_prefix(&self) -> u8;
}

impl ClientSubnetExt for hickory_proto::rr::rdata::opt::ClientSubnet {
    fn source_prefix(&self) -> u8 {
        use hickory_proto::serialize::binary::BinEncodable;
        self.to_bytes().expect("encode ClientSubnet")[2]
    }
}
