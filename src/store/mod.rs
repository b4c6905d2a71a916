// src/store/mod.rs
mod backend;
mod memory;
mod ranked;
mod redis_backend;

pub use backend::{LatencyScore, ProxyAddress, ProxyEntry, StoreBackend, StoreError};
pub use memory::MemoryBackend;
pub use ranked::RankedStore;
pub use redis_backend::RedisBackend;
