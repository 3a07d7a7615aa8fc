mod enhancer;
mod fake_ip_skipper;

pub use enhancer::{EnhancerConfig, ResolverEnhancer, MAPPING_CACHE_SIZE};
pub use fake_ip_skipper::FakeIpSkipper;
