pub mod builder;
pub mod core;
pub mod policy;
pub mod singleflight;

pub use builder::{NameServerPolicy, ResolverBuilder, ResolverConfig};
pub use core::{Resolver, DEFAULT_IPV6_TIMEOUT};
pub use policy::{ClientSet, Policy, PolicyListBuilder};
pub use singleflight::{FlightResult, SingleFlight, MAX_FLIGHT_RETRIES};
