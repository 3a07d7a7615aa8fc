pub mod dns_service;

pub use dns_service::{compose, DnsHandler, DnsService, Middleware};
