//! In-memory fake-ip pool and its on-disk state.

mod pool;
mod store;

pub use pool::MemoryFakeIpPool;
pub use store::FakeIpStateFile;
