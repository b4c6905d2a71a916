// src/metrics/collector.rs
use anyhow::Result;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<PoolMetrics>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(PoolMetrics::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<PoolMetrics> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

/// Outcome label attached to every probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeLabel {
    Alive,
    Rejected,
    Failed,
}

impl ProbeLabel {
    fn as_str(self) -> &'static str {
        match self {
            ProbeLabel::Alive => "alive",
            ProbeLabel::Rejected => "rejected",
            ProbeLabel::Failed => "failed",
        }
    }
}

pub struct PoolMetrics {
    // Probe metrics
    pub probes_total: IntCounterVec,
    pub probe_latency_seconds: Histogram,
    pub probes_in_flight: IntGauge,

    // Cycle metrics
    pub cycles_total: IntCounterVec,
    pub revalidation_removed_total: IntCounter,
    pub feed_candidates: IntGauge,

    // Pool metrics
    pub pool_size: IntGauge,
}

impl PoolMetrics {
    pub fn new(registry: &Registry) -> Result<Self> {
        let probes_total = IntCounterVec::new(
            Opts::new("proxy_pool_probes_total", "Total number of proxy probes"),
            &["outcome"],
        )?;
        registry.register(Box::new(probes_total.clone()))?;

        let probe_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "proxy_pool_probe_latency_seconds",
                "Latency of successful probes in seconds",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0]),
        )?;
        registry.register(Box::new(probe_latency_seconds.clone()))?;

        let probes_in_flight =
            IntGauge::new("proxy_pool_probes_in_flight", "Probes currently in flight")?;
        registry.register(Box::new(probes_in_flight.clone()))?;

        let cycles_total = IntCounterVec::new(
            Opts::new("proxy_pool_cycles_total", "Completed pool maintenance cycles"),
            &["kind", "outcome"],
        )?;
        registry.register(Box::new(cycles_total.clone()))?;

        let revalidation_removed_total = IntCounter::new(
            "proxy_pool_revalidation_removed_total",
            "Proxies dropped because they failed revalidation",
        )?;
        registry.register(Box::new(revalidation_removed_total.clone()))?;

        let feed_candidates = IntGauge::new(
            "proxy_pool_feed_candidates",
            "Candidates returned by the last feed fetch",
        )?;
        registry.register(Box::new(feed_candidates.clone()))?;

        let pool_size = IntGauge::new("proxy_pool_size", "Proxies currently in the live pool")?;
        registry.register(Box::new(pool_size.clone()))?;

        Ok(Self {
            probes_total,
            probe_latency_seconds,
            probes_in_flight,
            cycles_total,
            revalidation_removed_total,
            feed_candidates,
            pool_size,
        })
    }

    pub fn record_probe(&self, outcome: ProbeLabel, latency: Option<Duration>) {
        self.probes_total
            .with_label_values(&[outcome.as_str()])
            .inc();

        if let Some(latency) = latency {
            self.probe_latency_seconds.observe(latency.as_secs_f64());
        }
    }

    pub fn probe_started(&self) {
        self.probes_in_flight.inc();
    }

    pub fn probe_finished(&self) {
        self.probes_in_flight.dec();
    }

    pub fn record_cycle(&self, kind: &str, outcome: &str) {
        self.cycles_total.with_label_values(&[kind, outcome]).inc();
    }

    pub fn record_removed(&self, removed: usize) {
        self.revalidation_removed_total.inc_by(removed as u64);
    }

    pub fn update_feed_candidates(&self, count: usize) {
        self.feed_candidates.set(count as i64);
    }

    pub fn update_pool_size(&self, count: usize) {
        self.pool_size.set(count as i64);
    }
}
