// src/probe/worker_pool.rs
use super::prober::{ProbeOutcome, Prober};
use crate::metrics::{PoolMetrics, ProbeLabel};
use crate::store::{ProxyAddress, RankedStore};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error};

/// Tally of one [`ProbeWorkerPool::run`] invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeSummary {
    pub attempted: usize,
    pub alive: usize,
    pub rejected: usize,
    pub failed: usize,
}

impl ProbeSummary {
    fn record(&mut self, label: ProbeLabel) {
        self.attempted += 1;
        match label {
            ProbeLabel::Alive => self.alive += 1,
            ProbeLabel::Rejected => self.rejected += 1,
            ProbeLabel::Failed => self.failed += 1,
        }
    }
}

/// Probes candidates with at most `max_concurrency` probes in flight and upserts every
/// proxy that answers 200 into the destination store.
pub struct ProbeWorkerPool {
    prober: Arc<dyn Prober>,
    max_concurrency: usize,
    metrics: Option<Arc<PoolMetrics>>,
}

impl ProbeWorkerPool {
    pub fn new(
        prober: Arc<dyn Prober>,
        max_concurrency: usize,
        metrics: Option<Arc<PoolMetrics>>,
    ) -> Self {
        Self {
            prober,
            max_concurrency: max_concurrency.max(1),
            metrics,
        }
    }

    /// Probe every candidate exactly once. Returns after all probes have resolved.
    pub async fn run(
        &self,
        candidates: Vec<ProxyAddress>,
        destination: &RankedStore,
    ) -> ProbeSummary {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("Probe semaphore closed: {}", e);
                    break;
                }
            };

            let prober = self.prober.clone();
            let destination = destination.clone();
            let metrics = self.metrics.clone();

            tasks.push(tokio::spawn(async move {
                let label = probe_candidate(
                    prober.as_ref(),
                    &candidate,
                    &destination,
                    metrics.as_deref(),
                )
                .await;
                drop(permit);
                label
            }));
        }

        let results = futures::future::join_all(tasks).await;

        let mut summary = ProbeSummary::default();
        for result in results {
            match result {
                Ok(label) => summary.record(label),
                Err(e) => {
                    error!("Probe task join error: {}", e);
                    summary.record(ProbeLabel::Failed);
                }
            }
        }

        debug!(
            namespace = destination.namespace(),
            attempted = summary.attempted,
            alive = summary.alive,
            rejected = summary.rejected,
            failed = summary.failed,
            "Probe run finished"
        );
        summary
    }
}

async fn probe_candidate(
    prober: &dyn Prober,
    candidate: &str,
    destination: &RankedStore,
    metrics: Option<&PoolMetrics>,
) -> ProbeLabel {
    if let Some(metrics) = metrics {
        metrics.probe_started();
    }

    let outcome = prober.probe(candidate).await;

    let label = match &outcome {
        ProbeOutcome::Alive { .. } => {
            let latency_ms = outcome.latency_ms().unwrap_or_default();
            debug!(
                "Proxy {} is valid, latency {}ms, adding to {}",
                candidate,
                latency_ms,
                destination.namespace()
            );
            destination.upsert(candidate, latency_ms).await;
            ProbeLabel::Alive
        }
        ProbeOutcome::Rejected { status } => {
            debug!("Proxy {} rejected with HTTP {}", candidate, status);
            ProbeLabel::Rejected
        }
        ProbeOutcome::Failed(e) => {
            debug!("Proxy {} failed: {}", candidate, e);
            ProbeLabel::Failed
        }
    };

    if let Some(metrics) = metrics {
        let latency = match outcome {
            ProbeOutcome::Alive { latency } => Some(latency),
            _ => None,
        };
        metrics.record_probe(label, latency);
        metrics.probe_finished();
    }

    label
}

#[cfg(test)]
pub(crate) mod testing {
    use super::super::prober::{ProbeError, ProbeOutcome, Prober};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Prober with a fixed answer per address; unknown addresses fail.
    #[derive(Default)]
    pub struct ScriptedProber {
        answers: Mutex<HashMap<String, ProbeOutcome>>,
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl ScriptedProber {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::default()
            }
        }

        pub fn alive(&self, address: &str, latency_ms: u64) {
            self.set(
                address,
                ProbeOutcome::Alive {
                    latency: Duration::from_millis(latency_ms),
                },
            );
        }

        pub fn set(&self, address: &str, outcome: ProbeOutcome) {
            self.answers
                .lock()
                .unwrap()
                .insert(address.to_string(), outcome);
        }

        pub fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Prober for ScriptedProber {
        async fn probe(&self, candidate: &str) -> ProbeOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let outcome = self
                .answers
                .lock()
                .unwrap()
                .get(candidate)
                .cloned()
                .unwrap_or(ProbeOutcome::Failed(ProbeError::Transport(
                    "connection refused".to_string(),
                )));

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            outcome
        }
    }
}
