#![allow(dead_code)]

use async_trait::async_trait;
use proxy_pool::config::Config;
use proxy_pool::probe::{ProbeError, ProbeOutcome, Prober};
use proxy_pool::service::{CandidateSource, PoolService};
use proxy_pool::store::{MemoryBackend, ProxyAddress};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Feed stand-in returning a fixed candidate list, replaceable between cycles.
#[derive(Default)]
pub struct StaticSource {
    candidates: Mutex<Vec<ProxyAddress>>,
    fetches: AtomicUsize,
}

impl StaticSource {
    pub fn new(candidates: &[&str]) -> Self {
        let source = Self::default();
        source.set(candidates);
        source
    }

    pub fn set(&self, candidates: &[&str]) {
        *self.candidates.lock().unwrap() = candidates.iter().map(|s| s.to_string()).collect();
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CandidateSource for StaticSource {
    async fn fetch(&self) -> Vec<ProxyAddress> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.candidates.lock().unwrap().clone()
    }
}

/// Prober with a scripted latency per address; anything unscripted fails.
#[derive(Default)]
pub struct FakeProber {
    latencies: Mutex<HashMap<String, u64>>,
    delay: Duration,
}

impl FakeProber {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn alive(&self, address: &str, latency_ms: u64) {
        self.latencies
            .lock()
            .unwrap()
            .insert(address.to_string(), latency_ms);
    }

    pub fn kill(&self, address: &str) {
        self.latencies.lock().unwrap().remove(address);
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, candidate: &str) -> ProbeOutcome {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.latencies.lock().unwrap().get(candidate) {
            Some(ms) => ProbeOutcome::Alive {
                latency: Duration::from_millis(*ms),
            },
            None => ProbeOutcome::Failed(ProbeError::Transport("connection refused".into())),
        }
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.probe.max_concurrency = 8;
    config.schedule.drain_timeout_secs = 5;
    config.metrics.enabled = false;
    config
}

pub fn build_service(
    config: Config,
    source: Arc<dyn CandidateSource>,
    prober: Arc<dyn Prober>,
) -> Arc<PoolService> {
    Arc::new(PoolService::new(
        config,
        Arc::new(MemoryBackend::new()),
        source,
        prober,
        None,
    ))
}
