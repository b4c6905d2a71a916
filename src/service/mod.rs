// src/service/mod.rs
mod pool_service;

pub use pool_service::{CandidateSource, IngestReport, PoolService, PoolStatus};
