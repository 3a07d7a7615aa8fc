//! Meta DNS Application Layer
pub mod cache;
pub mod context;
pub mod dns;
pub mod ports;
pub mod services;
pub mod use_cases;

pub use context::{DnsContext, DnsMsgType};
