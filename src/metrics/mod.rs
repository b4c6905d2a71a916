// src/metrics/mod.rs
mod collector;

pub use collector::{MetricsRegistry, PoolMetrics, ProbeLabel};
