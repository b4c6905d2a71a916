// src/probe/mod.rs
mod prober;
mod worker_pool;

pub use prober::{HttpProber, ProbeError, ProbeOutcome, Prober};
pub use worker_pool::{ProbeSummary, ProbeWorkerPool};

#[cfg(test)]
pub(crate) use worker_pool::testing;
